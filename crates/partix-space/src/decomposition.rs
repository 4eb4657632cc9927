//! Uniform decomposition of the periodic box into partitions.
//!
//! The box is cut into `nx × ny × nz` equal cells. Cells are ranked in
//! lexicographic order of their grid index; rank `r` is partition
//! `PartitionId(r)`. For every cell the 6 face, 12 edge and 8 corner
//! neighbors are resolved with modular wraparound, which under small
//! grid sizes maps several junctions onto the same neighbor.

use glam::DVec3;
use indexmap::{IndexMap, IndexSet};
use partix_core::{ChannelIndex, ConfigError, PartitionId, PeriodicBox, Tag, TopologyError};

use crate::extent::Extent;
use crate::junction::{
    Axis, Direction, JunctionCell, JunctionKind, JunctionSet, LineJunction, PointJunction,
    SurfaceJunction,
};

/// Largest number of cuts along a single axis.
pub const MAX_AXIS_DIVISIONS: usize = 10;

/// Most uniform `(x, y, z)` split into exactly `n` cells.
///
/// Among all triples with factors in `1..=10` whose product is `n`, picks
/// the one with the smallest standard deviation, breaking ties
/// lexicographically. Returns `None` when no such triple exists.
pub fn best_divisions(n: usize) -> Option<[usize; 3]> {
    let mut best: Option<(usize, [usize; 3])> = None;
    for x in 1..=MAX_AXIS_DIVISIONS {
        for y in 1..=MAX_AXIS_DIVISIONS {
            for z in 1..=MAX_AXIS_DIVISIONS {
                if x * y * z != n {
                    continue;
                }
                let d = [x, y, z];
                let s = spread(d);
                // Strict comparison keeps the lexicographically first triple.
                if best.is_none_or(|(bs, _)| s < bs) {
                    best = Some((s, d));
                }
            }
        }
    }
    best.map(|(_, d)| d)
}

/// Nine times the variance, which orders triples like their standard
/// deviation but stays exact.
fn spread(d: [usize; 3]) -> usize {
    let sum: usize = d.iter().sum();
    let sum_sq: usize = d.iter().map(|x| x * x).sum();
    3 * sum_sq - sum * sum
}

/// An unordered pair of partitions that exchange data, with the
/// strongest junction that connects them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Link {
    /// Lower-ranked partition.
    pub low: PartitionId,
    /// Higher-ranked partition.
    pub high: PartitionId,
    /// Strongest junction between the two.
    pub kind: JunctionKind,
}

/// Everything one partition needs to know about its place in the grid.
#[derive(Clone, Debug, PartialEq)]
pub struct CellPlan {
    /// Rank of this partition.
    pub id: PartitionId,
    /// Grid index.
    pub index: [usize; 3],
    /// Owned region.
    pub extent: Extent,
    /// Neighbors in first-seen junction order. Position `i` is served by
    /// channel `ChannelIndex(i)`.
    pub neighbors: Vec<PartitionId>,
    /// Junction topology, with cell `i` on channel `i`.
    pub junctions: JunctionSet,
    /// Strongest junction kind per neighbor, parallel to `neighbors`.
    pub kinds: Vec<JunctionKind>,
}

impl CellPlan {
    /// Channel serving `peer`, if it is a neighbor.
    pub fn channel_to(&self, peer: PartitionId) -> Option<ChannelIndex> {
        self.neighbors
            .iter()
            .position(|&p| p == peer)
            .map(|i| ChannelIndex(i as u32))
    }
}

/// Particles bucketed into one cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellLoad {
    /// Positions, in input order.
    pub positions: Vec<DVec3>,
    /// Tags: each particle's index in the input slice.
    pub tags: Vec<Tag>,
}

/// A uniform grid decomposition of a periodic box.
#[derive(Clone, Debug)]
pub struct Decomposition {
    pbox: PeriodicBox,
    divisions: [usize; 3],
    cells: Vec<CellPlan>,
}

impl Decomposition {
    /// Split `pbox` into `divisions[0] × divisions[1] × divisions[2]` cells.
    pub fn uniform(pbox: PeriodicBox, divisions: [usize; 3]) -> Result<Self, ConfigError> {
        if divisions.iter().any(|&d| d == 0 || d > MAX_AXIS_DIVISIONS) {
            return Err(ConfigError::InvalidParameter {
                name: "divisions",
                reason: format!("{divisions:?} must lie in 1..={MAX_AXIS_DIVISIONS} per axis"),
            });
        }
        let size = pbox.size();
        let grid = cell_indices(divisions);
        let extents = grid
            .iter()
            .map(|idx| {
                let lo = DVec3::new(
                    idx[0] as f64 / divisions[0] as f64,
                    idx[1] as f64 / divisions[1] as f64,
                    idx[2] as f64 / divisions[2] as f64,
                ) * size;
                let hi = DVec3::new(
                    (idx[0] + 1) as f64 / divisions[0] as f64,
                    (idx[1] + 1) as f64 / divisions[1] as f64,
                    (idx[2] + 1) as f64 / divisions[2] as f64,
                ) * size;
                Extent::new(lo, hi)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut cells = Vec::with_capacity(grid.len());
        for (rank, idx) in grid.iter().enumerate() {
            cells.push(plan_cell(rank, *idx, divisions, &extents)?);
        }
        Ok(Self {
            pbox,
            divisions,
            cells,
        })
    }

    /// Split `pbox` into `n` cells using [`best_divisions`].
    pub fn for_partitions(pbox: PeriodicBox, n: usize) -> Result<Self, TopologyError> {
        let divisions = best_divisions(n).ok_or_else(|| TopologyError::InvalidDecomposition {
            reason: format!("{n} partitions cannot be split with at most {MAX_AXIS_DIVISIONS} cuts per axis"),
        })?;
        Self::uniform(pbox, divisions).map_err(|e| TopologyError::InvalidDecomposition {
            reason: e.to_string(),
        })
    }

    /// The periodic box.
    pub fn periodic_box(&self) -> &PeriodicBox {
        &self.pbox
    }

    /// Cuts per axis.
    pub fn divisions(&self) -> [usize; 3] {
        self.divisions
    }

    /// All cells in rank order.
    pub fn cells(&self) -> &[CellPlan] {
        &self.cells
    }

    /// Fail if any cell is narrower than `reach` along a split axis.
    /// See [`Extent::check_reach`].
    pub fn check_reach(&self, reach: f64) -> Result<(), ConfigError> {
        self.cells
            .iter()
            .try_for_each(|c| c.extent.check_reach(&self.pbox, reach))
    }

    /// Number of partitions.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the decomposition has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Every pair of neighboring partitions once, sorted by `(low, high)`.
    pub fn links(&self) -> Vec<Link> {
        let mut strongest: IndexMap<(PartitionId, PartitionId), JunctionKind> = IndexMap::new();
        for cell in &self.cells {
            for (&peer, &kind) in cell.neighbors.iter().zip(&cell.kinds) {
                let key = if cell.id < peer {
                    (cell.id, peer)
                } else {
                    (peer, cell.id)
                };
                strongest
                    .entry(key)
                    .and_modify(|k| *k = (*k).min(kind))
                    .or_insert(kind);
            }
        }
        strongest.sort_keys();
        strongest
            .into_iter()
            .map(|((low, high), kind)| Link { low, high, kind })
            .collect()
    }

    /// Bucket particles into cells, tagging each with its input index.
    ///
    /// Every position must lie inside the box.
    pub fn assign(&self, positions: &[DVec3]) -> Result<Vec<CellLoad>, TopologyError> {
        let mut loads = vec![CellLoad::default(); self.cells.len()];
        let d = self.divisions;
        for (i, &p) in positions.iter().enumerate() {
            let tag = Tag(i as u32);
            if !self.pbox.contains(p) {
                return Err(TopologyError::LostParticle { tag, position: p });
            }
            let scaled = p / self.pbox.size();
            let mut idx = [0usize; 3];
            for axis in 0..3 {
                idx[axis] = ((scaled[axis] * d[axis] as f64).floor() as usize).min(d[axis] - 1);
            }
            let mut rank = rank_of(idx, d);
            // Rounding in floor() can disagree with the extent bounds by one cell.
            if !self.cells[rank].extent.contains(p) {
                rank = self
                    .cells
                    .iter()
                    .position(|c| c.extent.contains(p))
                    .ok_or(TopologyError::LostParticle { tag, position: p })?;
            }
            loads[rank].positions.push(p);
            loads[rank].tags.push(tag);
        }
        Ok(loads)
    }
}

fn cell_indices(d: [usize; 3]) -> Vec<[usize; 3]> {
    let mut out = Vec::with_capacity(d[0] * d[1] * d[2]);
    for x in 0..d[0] {
        for y in 0..d[1] {
            for z in 0..d[2] {
                out.push([x, y, z]);
            }
        }
    }
    out
}

fn rank_of(idx: [usize; 3], d: [usize; 3]) -> usize {
    (idx[0] * d[1] + idx[1]) * d[2] + idx[2]
}

/// Neighbor grid index at `off`, wrapped.
fn shifted(idx: [usize; 3], off: [i32; 3], d: [usize; 3]) -> [usize; 3] {
    let mut out = [0usize; 3];
    for axis in 0..3 {
        let n = d[axis] as i64;
        out[axis] = (idx[axis] as i64 + off[axis] as i64).rem_euclid(n) as usize;
    }
    out
}

/// Coordinate of the extent edge selected by an offset sign.
fn edge_coord(extent: &Extent, axis: usize, sign: i32) -> f64 {
    if sign < 0 {
        extent.min()[axis]
    } else {
        extent.max()[axis]
    }
}

fn line_offsets() -> Vec<[i32; 3]> {
    let mut out = Vec::with_capacity(12);
    for x in -1..=1 {
        for y in -1..=1 {
            for z in -1..=1 {
                let o: [i32; 3] = [x, y, z];
                if o.iter().map(|v: &i32| v.abs()).sum::<i32>() == 2 {
                    out.push(o);
                }
            }
        }
    }
    out
}

fn plan_cell(
    rank: usize,
    idx: [usize; 3],
    d: [usize; 3],
    extents: &[Extent],
) -> Result<CellPlan, ConfigError> {
    let extent = extents[rank];
    let mut neighbors: IndexSet<usize> = IndexSet::new();
    let mut kinds: Vec<JunctionKind> = Vec::new();
    let mut surfaces = Vec::new();
    let mut lines = Vec::new();
    let mut points = Vec::new();

    let mut register = |off: [i32; 3], kind: JunctionKind| -> Option<usize> {
        let other = rank_of(shifted(idx, off, d), d);
        if other == rank {
            return None;
        }
        let (slot, fresh) = neighbors.insert_full(other);
        if fresh {
            kinds.push(kind);
        } else if kind < kinds[slot] {
            kinds[slot] = kind;
        }
        Some(slot)
    };

    for axis in Axis::ALL {
        for dir in [Direction::Negative, Direction::Positive] {
            let mut off = [0; 3];
            off[axis.index()] = dir.sign();
            if let Some(cell) = register(off, JunctionKind::Surface) {
                surfaces.push(SurfaceJunction { cell, axis, dir });
            }
        }
    }
    for off in line_offsets() {
        let Some(zero) = off.iter().position(|&v| v == 0) else {
            continue;
        };
        let Some(axis) = Axis::from_index(zero) else {
            continue;
        };
        let (a1, a2) = axis.others();
        if let Some(cell) = register(off, JunctionKind::Line) {
            lines.push(LineJunction {
                cell,
                axis,
                offset1: edge_coord(&extent, a1.index(), off[a1.index()]),
                offset2: edge_coord(&extent, a2.index(), off[a2.index()]),
            });
        }
    }
    for x in [-1, 1] {
        for y in [-1, 1] {
            for z in [-1, 1] {
                if let Some(cell) = register([x, y, z], JunctionKind::Point) {
                    points.push(PointJunction {
                        cell,
                        offset: DVec3::new(
                            edge_coord(&extent, 0, x),
                            edge_coord(&extent, 1, y),
                            edge_coord(&extent, 2, z),
                        ),
                    });
                }
            }
        }
    }

    let cells: Vec<JunctionCell> = neighbors
        .iter()
        .enumerate()
        .map(|(i, &other)| JunctionCell {
            channel: ChannelIndex(i as u32),
            extent: extents[other],
        })
        .collect();
    let junctions = JunctionSet::new(&extent, cells.len(), cells, surfaces, lines, points)?;
    Ok(CellPlan {
        id: PartitionId(rank as u32),
        index: idx,
        extent,
        neighbors: neighbors.into_iter().map(|r| PartitionId(r as u32)).collect(),
        junctions,
        kinds,
    })
}
