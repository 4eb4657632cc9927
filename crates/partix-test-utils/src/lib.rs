//! Test utilities for Partix development.
//!
//! Provides parameter presets in SI units scaled to the reference
//! particle radius, force tables and particle placements
//! ([`fixtures`]), and a [`harness`] that runs several partitions on
//! threads over an in-process [`MemoryNetwork`](partix_comm::MemoryNetwork).

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod harness;

use glam::DVec3;
use partix_core::units::{KB, R_PARTICLE};
use partix_engine::SystemParams;

pub use harness::{by_tag, run_assigned, run_partitions, RunSpec};

/// Room temperature, 1 ns steps, 40R box, no pair force.
pub fn room_temperature() -> SystemParams {
    let r = R_PARTICLE;
    SystemParams {
        box_size: DVec3::splat(40.0 * r),
        temperature: 300.0,
        dt: 1e-9,
        du_max: 0.1 * KB * 300.0,
        friction: 1.27e-9,
        force_update_rate: 10,
        r_pair_cutoff: 3.0 * r,
        r_neighbor: 4.0 * r,
        pair_potential: fixtures::flat_table(),
        pair_force: fixtures::flat_table(),
    }
}

/// [`room_temperature`] with soft repulsion between overlapping
/// particles.
pub fn repulsive(strength: f64) -> SystemParams {
    SystemParams {
        pair_potential: fixtures::soft_potential(strength),
        pair_force: fixtures::soft_repulsion(strength),
        ..room_temperature()
    }
}
