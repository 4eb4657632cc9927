//! Partitioned Brownian dynamics engine.
//!
//! A [`Partition`] owns the particles inside one axis-aligned cell of a
//! periodic box and keeps read-only replicas of nearby particles owned
//! by its neighbors. Each rebuild cycle it hands escaped particles to
//! the partition now containing them ([`membership`]), replicates its
//! boundary particles to neighbors ([`discovery`]), builds pair lists
//! ([`neighbor`]) and prunes replicas nobody pairs with. Between
//! rebuilds it evaluates forces ([`forces`]) and advances positions with
//! an adaptive Brownian integrator ([`integrator`]).
//!
//! Partitions are driven in lockstep, either call by call through the
//! staged [`Partition`] API or all at once with
//! [`simulate_cycles()`](driver::simulate_cycles).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod discovery;
pub mod driver;
pub mod forces;
pub mod handshake;
pub mod integrator;
pub mod membership;
pub mod neighbor;
pub mod partition;
pub mod random;
pub mod snapshot;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{EngineConfig, ForceMode, InterpTable, SystemParams};
pub use driver::{simulate_cycles, CycleReport};
pub use handshake::HandshakeError;
pub use integrator::{integrate_subcycle, StepReport, SubcycleOutcome};
pub use neighbor::Adjacency;
pub use partition::{Partition, RebuildReport, Stage};
pub use random::GaussianSource;
pub use snapshot::{PartitionDump, Snapshot};
pub use state::PartitionState;
