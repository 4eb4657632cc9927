//! Shared helpers for unit tests.

use glam::DVec3;
use partix_core::units::{KB, R_PARTICLE};
use partix_core::Tag;

use crate::config::{InterpTable, SystemParams};
use crate::state::PartitionState;

/// Room-temperature parameters with no pair force.
pub(crate) fn params() -> SystemParams {
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
        pair_potential: flat_table(),
        pair_force: flat_table(),
    }
}

pub(crate) fn flat_table() -> InterpTable {
    InterpTable::new(0.0, 0.01 * R_PARTICLE, vec![0.0; 400]).unwrap()
}

/// Constant force-over-distance table.
pub(crate) fn constant_table(value: f64) -> InterpTable {
    InterpTable::new(0.0, 0.01 * R_PARTICLE, vec![value; 400]).unwrap()
}

/// State holding only internal particles at `positions`, tagged in order.
pub(crate) fn state_with(positions: &[DVec3]) -> PartitionState {
    let tags = (0..positions.len() as u32).map(Tag).collect();
    PartitionState::new(positions.to_vec(), tags).unwrap()
}
