//! Spatial topology for Partix partitions.
//!
//! A periodic box is cut into axis-aligned [`Extent`]s, one per
//! partition. Each partition knows which neighbors touch it through a
//! face, an edge, or a corner of the periodic box; that knowledge is a
//! [`JunctionSet`]. The [`Decomposition`] builds all of this for a
//! uniform grid and buckets initial particles into cells.
//!
//! # Queries
//!
//! - [`JunctionSet::find_cell_containing`]: where an exiting particle goes
//! - [`JunctionSet::destinations`]: which neighbors need a replica

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod decomposition;
pub mod extent;
pub mod junction;

pub use decomposition::{best_divisions, CellLoad, CellPlan, Decomposition, Link};
pub use extent::Extent;
pub use junction::{
    Axis, Direction, JunctionCell, JunctionKind, JunctionSet, LineJunction, PointJunction,
    SurfaceJunction,
};
