//! Benchmark profiles for the Partix engine.
//!
//! - [`reference_profile`]: 40R box, soft repulsion, ~1000 particles
//! - [`dense_profile`]: same box at roughly eight times the density

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use glam::DVec3;
use partix_core::units::R_PARTICLE;
use partix_engine::SystemParams;
use partix_test_utils::fixtures::jittered_lattice;
use partix_test_utils::repulsive;

/// Parameters and positions for one benchmark run.
pub struct Profile {
    /// Physics.
    pub params: SystemParams,
    /// Initial positions; tags are indices.
    pub positions: Vec<DVec3>,
}

fn profile(per_axis: usize, seed: u64) -> Profile {
    let params = repulsive(1e-6);
    // Infallible for the preset box.
    let pbox = match params.periodic_box() {
        Ok(b) => b,
        Err(e) => panic!("preset box rejected: {e}"),
    };
    let spacing = 40.0 * R_PARTICLE / per_axis as f64;
    let positions = jittered_lattice(&pbox, per_axis, 0.3 * spacing, seed);
    Profile { params, positions }
}

/// 10×10×10 jittered lattice at 4R spacing.
pub fn reference_profile(seed: u64) -> Profile {
    profile(10, seed)
}

/// 20×20×20 jittered lattice at 2R spacing.
pub fn dense_profile(seed: u64) -> Profile {
    profile(20, seed)
}
