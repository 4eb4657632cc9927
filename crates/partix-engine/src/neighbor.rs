//! Neighbor lists and the per-particle adjacency table.
//!
//! Lists are rebuilt from scratch every rebuild cycle with an
//! all-pairs scan under the minimum-image convention. Internal pairs
//! are stored `(larger, smaller)`; external pairs `(internal, replica)`.
//! Both are sorted ascending so the force pass walks memory in order
//! and so that runs are reproducible pair for pair.

use glam::DVec3;
use partix_core::PeriodicBox;

/// Collect every internal pair within `sqrt(r_sqr)` into `out`.
///
/// `internal` holds only owned positions.
pub fn build_internal(
    internal: &[DVec3],
    pbox: &PeriodicBox,
    r_sqr: f64,
    out: &mut Vec<(u32, u32)>,
) {
    out.clear();
    for i in (1..internal.len()).rev() {
        let pi = internal[i];
        for j in (0..i).rev() {
            if pbox.distance_squared(pi, internal[j]) <= r_sqr {
                out.push((i as u32, j as u32));
            }
        }
    }
    sort_pairs(out);
}

/// Collect every internal-replica pair within `sqrt(r_sqr)` into `out`.
///
/// `positions[..n_internal]` are owned, the rest are replicas.
pub fn build_external(
    positions: &[DVec3],
    n_internal: usize,
    pbox: &PeriodicBox,
    r_sqr: f64,
    out: &mut Vec<(u32, u32)>,
) {
    out.clear();
    let (internal, external) = positions.split_at(n_internal.min(positions.len()));
    for (k, &pe) in external.iter().enumerate() {
        let e = (n_internal + k) as u32;
        for (j, &pj) in internal.iter().enumerate() {
            if pbox.distance_squared(pj, pe) <= r_sqr {
                out.push((j as u32, e));
            }
        }
    }
    sort_pairs(out);
}

/// Sort pairs ascending by first, then second element.
pub fn sort_pairs(pairs: &mut [(u32, u32)]) {
    pairs.sort_unstable();
}

/// Whether any displacement has grown past the rebuild threshold.
pub fn displaced_beyond(displacements: &[DVec3], threshold_sqr: f64) -> bool {
    displacements
        .iter()
        .any(|d| d.length_squared() > threshold_sqr)
}

// ── Adjacency ──────────────────────────────────────────────────────

/// Compressed per-particle neighbor table.
///
/// Row `i` lists every particle that `i` interacts with: both partners
/// of each internal pair see each other, while replicas appear only in
/// the row of their internal partner. Rows are contiguous in one flat
/// buffer, so per-particle loops can run on separate threads without
/// sharing accumulators.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Adjacency {
    offsets: Vec<u32>,
    neighbors: Vec<u32>,
}

impl Adjacency {
    /// Derive the table for `n_internal` particles from both pair lists.
    pub fn rebuild(&mut self, n_internal: usize, internal: &[(u32, u32)], external: &[(u32, u32)]) {
        // Pass one: row lengths.
        let mut counts = vec![0u32; n_internal + 1];
        for &(i, j) in internal {
            counts[i as usize] += 1;
            counts[j as usize] += 1;
        }
        for &(i, _) in external {
            counts[i as usize] += 1;
        }

        self.offsets.clear();
        self.offsets.reserve(n_internal + 1);
        let mut total = 0u32;
        for &c in &counts[..n_internal] {
            self.offsets.push(total);
            total += c;
        }
        self.offsets.push(total);

        // Pass two: fill, reusing counts as cursors.
        self.neighbors.clear();
        self.neighbors.resize(total as usize, 0);
        counts[..n_internal].copy_from_slice(&self.offsets[..n_internal]);
        let mut put = |row: u32, value: u32| {
            let at = &mut counts[row as usize];
            self.neighbors[*at as usize] = value;
            *at += 1;
        };
        for &(i, j) in internal {
            put(i, j);
            put(j, i);
        }
        for &(i, e) in external {
            put(i, e);
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Partners of particle `i`. Empty for rows out of range.
    pub fn neighbors_of(&self, i: usize) -> &[u32] {
        match (self.offsets.get(i), self.offsets.get(i + 1)) {
            (Some(&a), Some(&b)) => &self.neighbors[a as usize..b as usize],
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line_box() -> PeriodicBox {
        PeriodicBox::new(DVec3::new(100.0, 100.0, 100.0)).unwrap()
    }

    #[test]
    fn four_particles_on_a_line() {
        let pos: Vec<DVec3> = [0.0, 1.0, 2.0, 10.0]
            .iter()
            .map(|&x| DVec3::new(x, 0.0, 0.0))
            .collect();
        let mut out = Vec::new();
        build_internal(&pos, &line_box(), 1.5 * 1.5, &mut out);
        assert_eq!(out, vec![(1, 0), (2, 1)]);
    }

    #[test]
    fn pairs_see_across_the_boundary() {
        let pos = vec![DVec3::new(0.5, 5.0, 5.0), DVec3::new(99.5, 5.0, 5.0)];
        let mut out = Vec::new();
        build_internal(&pos, &line_box(), 1.1, &mut out);
        assert_eq!(out, vec![(1, 0)]);
    }

    #[test]
    fn external_pairs_lead_with_the_internal_index() {
        let pos = vec![
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(50.0, 0.0, 0.0),
            DVec3::new(1.5, 0.0, 0.0),
            DVec3::new(49.0, 0.0, 0.0),
        ];
        let mut out = Vec::new();
        build_external(&pos, 2, &line_box(), 4.0, &mut out);
        assert_eq!(out, vec![(0, 2), (1, 3)]);
    }

    #[test]
    fn adjacency_rows() {
        let mut adj = Adjacency::default();
        adj.rebuild(3, &[(1, 0), (2, 1)], &[(0, 3), (2, 3), (2, 4)]);
        assert_eq!(adj.len(), 3);
        assert_eq!(adj.neighbors_of(0), &[1, 3]);
        assert_eq!(adj.neighbors_of(1), &[0, 2]);
        assert_eq!(adj.neighbors_of(2), &[1, 3, 4]);
        assert!(adj.neighbors_of(3).is_empty());
    }

    #[test]
    fn adjacency_of_nothing() {
        let mut adj = Adjacency::default();
        adj.rebuild(0, &[], &[]);
        assert!(adj.is_empty());
    }

    #[test]
    fn displacement_threshold_is_strict() {
        let d = [DVec3::new(1.0, 0.0, 0.0)];
        assert!(!displaced_beyond(&d, 1.0));
        assert!(displaced_beyond(&d, 0.99));
    }

    fn cloud() -> impl Strategy<Value = Vec<DVec3>> {
        prop::collection::vec(
            (0.0f64..100.0, 0.0f64..100.0, 0.0f64..100.0).prop_map(|(x, y, z)| DVec3::new(x, y, z)),
            0..60,
        )
    }

    proptest! {
        #[test]
        fn internal_pairs_are_unique_and_close(pos in cloud(), r in 1.0f64..40.0) {
            let pbox = line_box();
            let mut out = Vec::new();
            build_internal(&pos, &pbox, r * r, &mut out);
            let mut seen = std::collections::HashSet::new();
            for &(i, j) in &out {
                prop_assert!(i > j);
                prop_assert!(seen.insert((i, j)));
                prop_assert!(pbox.distance_squared(pos[i as usize], pos[j as usize]) <= r * r);
            }
            let expected = (0..pos.len())
                .flat_map(|i| (0..i).map(move |j| (i, j)))
                .filter(|&(i, j)| pbox.distance_squared(pos[i], pos[j]) <= r * r)
                .count();
            prop_assert_eq!(out.len(), expected);
        }

        #[test]
        fn sorting_twice_changes_nothing(pos in cloud()) {
            let mut out = Vec::new();
            build_internal(&pos, &line_box(), 400.0, &mut out);
            let once = out.clone();
            sort_pairs(&mut out);
            prop_assert_eq!(&once, &out);
            sort_pairs(&mut out);
            prop_assert_eq!(once, out);
        }

        #[test]
        fn adjacency_counts_every_pair_end(pos in cloud()) {
            let mut internal = Vec::new();
            build_internal(&pos, &line_box(), 400.0, &mut internal);
            let mut adj = Adjacency::default();
            adj.rebuild(pos.len(), &internal, &[]);
            let total: usize = (0..pos.len()).map(|i| adj.neighbors_of(i).len()).sum();
            prop_assert_eq!(total, 2 * internal.len());
        }
    }
}
