//! Pair force evaluation.
//!
//! The force table stores force over separation, so the force a partner
//! at separation vector `r` exerts is `-r * table(|r|)`. Internal pairs
//! update both partners. External pairs update only the internal
//! partner: the replica's owner sees the mirrored pair on its own side
//! and applies the reciprocal force there.
//!
//! Three strategies are available, chosen by [`ForceMode`]:
//!
//! - **Serial** refreshes replica positions, then walks both pair lists.
//! - **Overlapped** refreshes replica positions on a scoped thread while
//!   internal pairs are evaluated, and joins before external pairs.
//! - **Parallel** evaluates per particle over the [`Adjacency`] table on
//!   a rayon pool. Each worker writes only its own particle's force.

use glam::DVec3;
use partix_comm::{Channel, Fabric};
use partix_core::{PeriodicBox, SimError};
use rayon::prelude::*;

use crate::config::{ForceMode, InterpTable, SystemParams};
use crate::discovery::refresh_replicas;
use crate::neighbor::Adjacency;
use crate::state::PartitionState;

/// Pair force law bound to a box and cutoff.
#[derive(Clone, Copy, Debug)]
pub struct PairForce<'a> {
    pbox: &'a PeriodicBox,
    table: &'a InterpTable,
    cutoff_sqr: f64,
}

impl<'a> PairForce<'a> {
    /// The force law of `params` in `pbox`.
    pub fn new(params: &'a SystemParams, pbox: &'a PeriodicBox) -> Self {
        Self {
            pbox,
            table: &params.pair_force,
            cutoff_sqr: params.r_pair_cutoff_sqr(),
        }
    }

    /// `r * table(|r|)` for `r` pointing from `from` to `to`, or `None`
    /// beyond the cutoff. Subtract it from `from`'s force.
    #[inline]
    pub fn pair(&self, from: DVec3, to: DVec3) -> Option<DVec3> {
        let r = self.pbox.separation(from, to);
        let rsqr = r.length_squared();
        (rsqr <= self.cutoff_sqr).then(|| r * self.table.eval(rsqr.sqrt()))
    }

    /// Total force on a particle at `at` from the listed partners.
    #[inline]
    pub fn on_particle(&self, at: DVec3, partners: &[u32], positions: &[DVec3]) -> DVec3 {
        let mut sum = DVec3::ZERO;
        for &k in partners {
            if let Some(f) = self.pair(at, positions[k as usize]) {
                sum -= f;
            }
        }
        sum
    }
}

/// Reset `forces` and accumulate every internal pair.
pub fn evaluate_internal(
    law: &PairForce<'_>,
    internal: &[DVec3],
    pairs: &[(u32, u32)],
    forces: &mut [DVec3],
) {
    forces.fill(DVec3::ZERO);
    for &(i, j) in pairs {
        let (i, j) = (i as usize, j as usize);
        if let Some(f) = law.pair(internal[i], internal[j]) {
            forces[i] -= f;
            forces[j] += f;
        }
    }
}

/// Accumulate every external pair onto its internal partner.
pub fn evaluate_external(
    law: &PairForce<'_>,
    positions: &[DVec3],
    pairs: &[(u32, u32)],
    forces: &mut [DVec3],
) {
    for &(i, e) in pairs {
        let i = i as usize;
        if let Some(f) = law.pair(positions[i], positions[e as usize]) {
            forces[i] -= f;
        }
    }
}

/// Evaluate every internal particle's force from the adjacency table.
///
/// Runs on `pool` when given, otherwise on the calling thread.
pub fn evaluate_per_particle(
    law: &PairForce<'_>,
    positions: &[DVec3],
    adjacency: &Adjacency,
    forces: &mut [DVec3],
    pool: Option<&rayon::ThreadPool>,
) {
    let row = |(i, f): (usize, &mut DVec3)| {
        *f = law.on_particle(positions[i], adjacency.neighbors_of(i), positions);
    };
    match pool {
        Some(pool) => pool.install(|| forces.par_iter_mut().enumerate().for_each(row)),
        None => forces.iter_mut().enumerate().for_each(row),
    }
}

/// Refresh replica positions and evaluate forces on every internal
/// particle.
pub(crate) fn update_forces<C: Channel>(
    state: &mut PartitionState,
    fabric: &mut Fabric<C>,
    law: &PairForce<'_>,
    mode: ForceMode,
    pool: Option<&rayon::ThreadPool>,
) -> Result<(), SimError> {
    state.gather_send_positions()?;
    let n = state.n_internal;
    let PartitionState {
        positions,
        channels,
        forces,
        internal,
        external,
        adjacency,
        ..
    } = state;

    match mode {
        ForceMode::Overlapped if fabric.channel_count() > 0 => {
            let (own, replicas) = positions.split_at_mut(n);
            let own: &[DVec3] = own;
            std::thread::scope(|s| {
                let exchange = s.spawn(move || refresh_replicas(fabric, channels, replicas, n));
                evaluate_internal(law, own, internal, forces);
                match exchange.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            })?;
            evaluate_external(law, positions, external, forces);
        }
        ForceMode::Parallel { .. } => {
            refresh_replicas(fabric, channels, &mut positions[n..], n)?;
            evaluate_per_particle(law, positions, adjacency, forces, pool);
        }
        ForceMode::Serial | ForceMode::Overlapped => {
            refresh_replicas(fabric, channels, &mut positions[n..], n)?;
            evaluate_internal(law, &positions[..n], internal, forces);
            evaluate_external(law, positions, external, forces);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::{build_external, build_internal};
    use crate::testing::{constant_table, params};
    use partix_core::units::R_PARTICLE;
    use proptest::prelude::*;

    fn repulsive() -> SystemParams {
        let mut p = params();
        p.pair_force = constant_table(1e-6);
        p
    }

    #[test]
    fn pair_forces_are_equal_and_opposite() {
        let p = repulsive();
        let pbox = p.periodic_box().unwrap();
        let law = PairForce::new(&p, &pbox);
        let pos = [DVec3::splat(10.0 * R_PARTICLE), DVec3::splat(11.0 * R_PARTICLE)];
        let mut forces = [DVec3::ZERO; 2];
        evaluate_internal(&law, &pos, &[(1, 0)], &mut forces);
        assert!((forces[0] + forces[1]).length() < 1e-30);
        // repulsion pushes particle 0 towards smaller coordinates
        assert!(forces[0].x < 0.0);
    }

    #[test]
    fn beyond_cutoff_contributes_nothing() {
        let p = repulsive();
        let pbox = p.periodic_box().unwrap();
        let law = PairForce::new(&p, &pbox);
        let a = DVec3::ZERO;
        let b = DVec3::new(3.5 * R_PARTICLE, 0.0, 0.0);
        assert!(law.pair(a, b).is_none());
        assert!(law.pair(a, DVec3::new(2.9 * R_PARTICLE, 0.0, 0.0)).is_some());
    }

    #[test]
    fn external_pairs_push_only_the_internal_partner() {
        let p = repulsive();
        let pbox = p.periodic_box().unwrap();
        let law = PairForce::new(&p, &pbox);
        let pos = [DVec3::splat(5.0 * R_PARTICLE), DVec3::splat(6.0 * R_PARTICLE)];
        let mut forces = [DVec3::ZERO; 1];
        evaluate_external(&law, &pos, &[(0, 1)], &mut forces);
        assert!(forces[0].x < 0.0);
    }

    fn cloud() -> impl Strategy<Value = Vec<DVec3>> {
        let l = 40.0 * R_PARTICLE;
        prop::collection::vec(
            (0.0..l, 0.0..l, 0.0..l).prop_map(|(x, y, z)| DVec3::new(x, y, z)),
            2..50,
        )
    }

    proptest! {
        #[test]
        fn per_particle_matches_pairwise(pos in cloud(), split in 0usize..50) {
            let p = repulsive();
            let pbox = p.periodic_box().unwrap();
            let law = PairForce::new(&p, &pbox);
            let n = split.min(pos.len());
            let (mut internal, mut external) = (Vec::new(), Vec::new());
            build_internal(&pos[..n], &pbox, p.r_neighbor_sqr(), &mut internal);
            build_external(&pos, n, &pbox, p.r_neighbor_sqr(), &mut external);
            let mut adj = Adjacency::default();
            adj.rebuild(n, &internal, &external);

            let mut serial = vec![DVec3::ZERO; n];
            evaluate_internal(&law, &pos[..n], &internal, &mut serial);
            evaluate_external(&law, &pos, &external, &mut serial);
            let mut rows = vec![DVec3::ZERO; n];
            evaluate_per_particle(&law, &pos, &adj, &mut rows, None);
            for (a, b) in serial.iter().zip(&rows) {
                prop_assert!((*a - *b).length() <= 1e-9 * a.length() + 1e-24);
            }
        }
    }
}
