//! Core types for the Partix partitioned Brownian dynamics engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the abstractions shared by every other Partix crate: strongly-typed
//! identifiers, periodic box geometry, physical unit constants, and the
//! error taxonomy used by the fail-fast engine.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod periodic;
pub mod units;

pub use error::{
    CapacityError, ConfigError, DivergenceError, ProtocolError, SimError, StageError,
    TopologyError,
};
pub use glam::DVec3;
pub use id::{ChannelIndex, PartitionId, RuleTag, Tag};
pub use periodic::PeriodicBox;
