//! Junction descriptors: how a partition touches its neighbors.
//!
//! Cells can meet through a shared face (surface junction), a shared
//! edge (line junction) or a shared corner (point junction). With
//! periodic boundaries the same neighbor may be reached through several
//! junctions at once, so every query that yields destinations
//! deduplicates them by channel.

use glam::DVec3;
use partix_core::{ChannelIndex, ConfigError, PeriodicBox};
use smallvec::SmallVec;

use crate::extent::Extent;

/// A coordinate axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    /// The x axis.
    X,
    /// The y axis.
    Y,
    /// The z axis.
    Z,
}

impl Axis {
    /// All three axes in order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index (0, 1 or 2).
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Axis from a component index.
    pub fn from_index(i: usize) -> Option<Axis> {
        Self::ALL.get(i).copied()
    }

    /// The two remaining axes, in ascending order.
    pub fn others(self) -> (Axis, Axis) {
        match self {
            Axis::X => (Axis::Y, Axis::Z),
            Axis::Y => (Axis::X, Axis::Z),
            Axis::Z => (Axis::X, Axis::Y),
        }
    }
}

/// Which face along an axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The face at the minimum extent.
    Negative,
    /// The face at the maximum extent.
    Positive,
}

impl Direction {
    /// Parse the protocol's `-1`/`+1` encoding.
    pub fn from_sign(sign: i32) -> Option<Direction> {
        match sign {
            -1 => Some(Direction::Negative),
            1 => Some(Direction::Positive),
            _ => None,
        }
    }

    /// `-1` or `+1`.
    pub fn sign(self) -> i32 {
        match self {
            Direction::Negative => -1,
            Direction::Positive => 1,
        }
    }
}

/// Junction classes, strongest first.
///
/// The ordering is used by the schedule builder: links that share a
/// face are scheduled before links that share only an edge or a corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JunctionKind {
    /// Shared face.
    Surface,
    /// Shared edge.
    Line,
    /// Shared corner.
    Point,
}

/// A neighboring cell: its channel and extent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JunctionCell {
    /// Channel used to talk to the partition owning this cell.
    pub channel: ChannelIndex,
    /// The neighbor's extent.
    pub extent: Extent,
}

/// Neighbor reached across one face of this partition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceJunction {
    /// Index into [`JunctionSet::cells`].
    pub cell: usize,
    /// Axis normal to the face.
    pub axis: Axis,
    /// Which of the two faces.
    pub dir: Direction,
}

/// Neighbor reached across one edge of this partition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineJunction {
    /// Index into [`JunctionSet::cells`].
    pub cell: usize,
    /// Axis parallel to the edge.
    pub axis: Axis,
    /// Edge coordinate on the first remaining axis.
    pub offset1: f64,
    /// Edge coordinate on the second remaining axis.
    pub offset2: f64,
}

/// Neighbor reached across one corner of this partition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointJunction {
    /// Index into [`JunctionSet::cells`].
    pub cell: usize,
    /// The corner.
    pub offset: DVec3,
}

/// Destinations for one particle. Most particles touch at most a few
/// neighbors.
pub type Destinations = SmallVec<[ChannelIndex; 8]>;

/// Complete junction topology of one partition. Read-only once built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JunctionSet {
    cells: Vec<JunctionCell>,
    surfaces: Vec<SurfaceJunction>,
    lines: Vec<LineJunction>,
    points: Vec<PointJunction>,
}

impl JunctionSet {
    /// A partition with no neighbors.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build and validate a junction set for the partition spanning
    /// `this`, which has `channels` communication channels.
    ///
    /// Cells must name existing channels, junctions must name existing
    /// cells, and line and point offsets must lie within `this` on the
    /// axes they constrain.
    pub fn new(
        this: &Extent,
        channels: usize,
        cells: Vec<JunctionCell>,
        surfaces: Vec<SurfaceJunction>,
        lines: Vec<LineJunction>,
        points: Vec<PointJunction>,
    ) -> Result<Self, ConfigError> {
        for c in &cells {
            if c.channel.index() >= channels {
                return Err(ConfigError::UnknownReference {
                    what: "channel",
                    index: c.channel.index(),
                    len: channels,
                });
            }
        }
        let check_cell = |cell: usize| {
            if cell >= cells.len() {
                Err(ConfigError::UnknownReference {
                    what: "junction cell",
                    index: cell,
                    len: cells.len(),
                })
            } else {
                Ok(())
            }
        };
        for s in &surfaces {
            check_cell(s.cell)?;
        }
        for l in &lines {
            check_cell(l.cell)?;
            let (a1, a2) = l.axis.others();
            check_within(this, a1, l.offset1, "offset1")?;
            check_within(this, a2, l.offset2, "offset2")?;
        }
        for p in &points {
            check_cell(p.cell)?;
            for axis in Axis::ALL {
                check_within(this, axis, p.offset[axis.index()], "offset")?;
            }
        }
        Ok(Self {
            cells,
            surfaces,
            lines,
            points,
        })
    }

    /// Whether the partition has no neighbors at all.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Neighboring cells.
    pub fn cells(&self) -> &[JunctionCell] {
        &self.cells
    }

    /// Surface junctions.
    pub fn surfaces(&self) -> &[SurfaceJunction] {
        &self.surfaces
    }

    /// Line junctions.
    pub fn lines(&self) -> &[LineJunction] {
        &self.lines
    }

    /// Point junctions.
    pub fn points(&self) -> &[PointJunction] {
        &self.points
    }

    /// The neighboring cell whose extent contains `p`, if any.
    pub fn find_cell_containing(&self, p: DVec3) -> Option<&JunctionCell> {
        self.cells.iter().find(|c| c.extent.contains(p))
    }

    /// Channels of every neighbor that must receive a replica of a
    /// particle at `p`, deduplicated, in junction order.
    ///
    /// `this` is the extent of the partition evaluating the test.
    pub fn destinations(
        &self,
        p: DVec3,
        this: &Extent,
        pbox: &PeriodicBox,
        r_neighbor: f64,
    ) -> Destinations {
        let r_sqr = r_neighbor * r_neighbor;
        let mut out = Destinations::new();
        let mut add = |cell: usize| {
            let ch = self.cells[cell].channel;
            if !out.contains(&ch) {
                out.push(ch);
            }
        };
        for s in &self.surfaces {
            let face = match s.dir {
                Direction::Negative => this.min(),
                Direction::Positive => this.max(),
            };
            let r = pbox.separation(face, p);
            if r[s.axis.index()].abs() <= r_neighbor {
                add(s.cell);
            }
        }
        for l in &self.lines {
            let (a1, a2) = l.axis.others();
            let mut projected = p;
            projected[l.axis.index()] = 0.0;
            let mut edge = DVec3::ZERO;
            edge[a1.index()] = l.offset1;
            edge[a2.index()] = l.offset2;
            if pbox.separation(edge, projected).length_squared() <= r_sqr {
                add(l.cell);
            }
        }
        for pt in &self.points {
            if pbox.separation(pt.offset, p).length_squared() <= r_sqr {
                add(pt.cell);
            }
        }
        out
    }
}

fn check_within(
    this: &Extent,
    axis: Axis,
    v: f64,
    name: &'static str,
) -> Result<(), ConfigError> {
    let (lo, hi) = (this.min()[axis.index()], this.max()[axis.index()]);
    if v.is_finite() && v >= lo && v <= hi {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value: v,
            min: lo,
            max: hi,
        })
    }
}
