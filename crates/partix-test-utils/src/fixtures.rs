//! Force tables and particle placements.

use glam::DVec3;
use partix_core::units::R_PARTICLE;
use partix_core::PeriodicBox;
use partix_engine::InterpTable;

/// Table spacing: one hundredth of the particle radius.
pub const TABLE_STEP: f64 = 0.01 * R_PARTICLE;
/// Samples per table; covers separations up to 4R.
pub const TABLE_SAMPLES: usize = 400;

fn table(f: impl Fn(f64) -> f64) -> InterpTable {
    match InterpTable::sample(0.0, TABLE_STEP, TABLE_SAMPLES, f) {
        Ok(t) => t,
        Err(e) => panic!("fixture table rejected: {e}"),
    }
}

/// All zeros.
pub fn flat_table() -> InterpTable {
    table(|_| 0.0)
}

/// Harmonic overlap potential `k/2·(2R − r)²` for `r < 2R`.
pub fn soft_potential(k: f64) -> InterpTable {
    let contact = 2.0 * R_PARTICLE;
    table(move |r| {
        if r < contact {
            0.5 * k * (contact - r).powi(2)
        } else {
            0.0
        }
    })
}

/// Force over distance of [`soft_potential`]: `k·(2R − r)/r`, finite at
/// `r = 0` by clamping to one table step.
pub fn soft_repulsion(k: f64) -> InterpTable {
    let contact = 2.0 * R_PARTICLE;
    table(move |r| {
        if r < contact {
            k * (contact - r) / r.max(TABLE_STEP)
        } else {
            0.0
        }
    })
}

/// A simple cubic lattice of `per_axis³` sites with spacing
/// `box / per_axis`, offset by half a spacing from the origin.
pub fn lattice(pbox: &PeriodicBox, per_axis: usize) -> Vec<DVec3> {
    let step = pbox.size() / per_axis as f64;
    let mut out = Vec::with_capacity(per_axis.pow(3));
    for x in 0..per_axis {
        for y in 0..per_axis {
            for z in 0..per_axis {
                let idx = DVec3::new(x as f64, y as f64, z as f64);
                out.push((idx + 0.5) * step);
            }
        }
    }
    out
}

/// [`lattice`] with each site displaced by a deterministic amount in
/// `[-jitter, jitter)` per axis.
pub fn jittered_lattice(pbox: &PeriodicBox, per_axis: usize, jitter: f64, seed: u64) -> Vec<DVec3> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let mut next = move || {
        // xorshift64*
        state ^= state >> 12;
        state ^= state << 25;
        state ^= state >> 27;
        let bits = state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        bits as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
    };
    lattice(pbox, per_axis)
        .into_iter()
        .map(|p| pbox.wrap(p + DVec3::new(next(), next(), next()) * jitter))
        .collect()
}

/// Particles evenly spaced along x at height `y = z = box/2`.
pub fn line(pbox: &PeriodicBox, xs: &[f64]) -> Vec<DVec3> {
    let mid = pbox.size() * 0.5;
    xs.iter().map(|&x| DVec3::new(x, mid.y, mid.z)).collect()
}
