//! Communication fabric for Partix partitions.
//!
//! Every partition talks to each neighbor over exactly one [`Channel`].
//! A globally precomputed schedule of [`CommRule`]s tells each partition,
//! round by round, whether to send or receive on which channel. The
//! schedule is symmetric: whenever one end of a link sends, the other
//! end receives, which is what keeps blocking transports from
//! deadlocking. [`Fabric::exchange`] runs one protocol step: a
//! [`Collective`] barrier followed by every rule in order.
//!
//! [`memory`] provides an in-process transport over crossbeam channels
//! so multi-partition runs can be exercised on threads.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod channel;
pub mod fabric;
pub mod memory;
pub mod rule;
pub mod schedule;
pub mod wire;

pub use channel::{Channel, Collective, Solo};
pub use fabric::{Fabric, Port};
pub use memory::{MemoryChannel, MemoryCollective, MemoryEndpoint, MemoryNetwork};
pub use rule::{CommRule, Instruction};
pub use schedule::{build_rules, schedule_rounds};
