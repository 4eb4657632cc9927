//! Partix: Brownian dynamics of interacting particles, decomposed over
//! partitions of a periodic box.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Partix sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use partix::prelude::*;
//! use partix::engine::InterpTable;
//! use partix::types::units::{KB, R_PARTICLE};
//!
//! let r = R_PARTICLE;
//! let flat = InterpTable::new(0.0, 0.01 * r, vec![0.0; 400]).unwrap();
//! let params = SystemParams {
//!     box_size: DVec3::splat(40.0 * r),
//!     temperature: 300.0,
//!     dt: 1e-9,
//!     du_max: 0.1 * KB * 300.0,
//!     friction: 1.27e-9,
//!     force_update_rate: 10,
//!     r_pair_cutoff: 3.0 * r,
//!     r_neighbor: 4.0 * r,
//!     pair_potential: flat.clone(),
//!     pair_force: flat,
//! };
//! let pbox = params.periodic_box().unwrap();
//!
//! // A partition alone in the run owns the whole box.
//! let mut part = Partition::<MemoryChannel>::new(EngineConfig::default());
//! part.initialize_system(params).unwrap();
//! part.initialize_random(42).unwrap();
//! part.initialize_cell_state(
//!     Extent::whole(&pbox),
//!     vec![DVec3::splat(10.0 * r), DVec3::splat(20.0 * r)],
//!     vec![Tag(0), Tag(1)],
//! )
//! .unwrap();
//! part.initialize_cell_comm(Fabric::isolated(PartitionId(0))).unwrap();
//! part.initialize_cell_junctions(JunctionSet::empty()).unwrap();
//!
//! let report = simulate_cycles(&mut part, 100).unwrap();
//! assert_eq!(report.steps, 100);
//! assert_eq!(part.collect_positions_and_tags().unwrap().tags.len(), 2);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `partix-core` | IDs, periodic box, units, error taxonomy |
//! | [`space`] | `partix-space` | Extents, junctions, decomposition |
//! | [`comm`] | `partix-comm` | Channels, schedule builder, fabric, in-process transport |
//! | [`msg`] | `partix-msg` | Handshake record codec |
//! | [`engine`] | `partix-engine` | Partition state, lists, forces, integrator, driver |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, IDs and errors (`partix-core`).
///
/// Every engine operation returns [`types::SimError`], which wraps the
/// per-concern error enums.
pub use partix_core as types;

/// Spatial topology (`partix-space`).
///
/// [`space::Decomposition`] splits a box into partitions and derives each
/// partition's [`space::JunctionSet`].
pub use partix_space as space;

/// Communication fabric (`partix-comm`).
///
/// The [`comm::Channel`] trait is the transport seam;
/// [`comm::MemoryNetwork`] wires partitions together in one process.
pub use partix_comm as comm;

/// Handshake codec (`partix-msg`).
pub use partix_msg as msg;

/// The partition engine (`partix-engine`).
///
/// [`engine::Partition`] for the staged per-partition API,
/// [`engine::simulate_cycles`] for the lockstep driver.
pub use partix_engine as engine;

/// Common imports for typical Partix usage.
///
/// ```rust
/// use partix::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use partix_core::{ChannelIndex, DVec3, PartitionId, PeriodicBox, SimError, Tag};

    // Space
    pub use partix_space::{Decomposition, Extent, JunctionSet};

    // Communication
    pub use partix_comm::{build_rules, Channel, Fabric, MemoryChannel, MemoryNetwork};

    // Engine
    pub use partix_engine::{
        simulate_cycles, CycleReport, EngineConfig, ForceMode, Partition, RebuildReport,
        Snapshot, Stage, SystemParams,
    };
}
