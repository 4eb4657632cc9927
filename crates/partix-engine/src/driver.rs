//! Lockstep driver for one partition.
//!
//! Every partition of a run calls [`simulate_cycles`] with the same
//! budget. The rebuild decision is reduced across the run after every
//! step, so all partitions issue the same sequence of protocol rounds.

use partix_comm::Channel;
use partix_core::SimError;

use crate::partition::Partition;

/// Totals for one [`simulate_cycles`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Integration steps taken.
    pub steps: u64,
    /// Neighbor rebuilds, including the initial one.
    pub rebuilds: u64,
    /// Particle steps that needed subcycling.
    pub subcycled: u64,
    /// Largest subdivision count seen.
    pub max_subdivisions: u32,
}

/// Run `cycles` integration steps.
///
/// Neighbors are rebuilt once up front. Forces are refreshed every
/// `force_update_rate` steps, or right after a rebuild, whichever comes
/// first. A rebuild happens as soon as any partition reports one, even
/// on the last step.
pub fn simulate_cycles<C: Channel>(
    partition: &mut Partition<C>,
    cycles: u64,
) -> Result<CycleReport, SimError> {
    let rate = partition
        .params()
        .map_or(1, |p| p.force_update_rate.max(1));
    let mut report = CycleReport::default();
    let mut remaining = cycles;

    partition.update_neighbors()?;
    report.rebuilds += 1;

    while remaining > 0 {
        partition.update_forces()?;
        for _ in 0..rate {
            if remaining == 0 {
                break;
            }
            let step = partition.integrate()?;
            remaining -= 1;
            report.steps += 1;
            report.subcycled += step.subcycled as u64;
            report.max_subdivisions = report.max_subdivisions.max(step.max_subdivisions);
            if partition.any_rebuild(step.rebuild)? {
                partition.update_neighbors()?;
                report.rebuilds += 1;
                break;
            }
        }
    }
    log::debug!(
        "simulated {} steps with {} rebuilds, {} subcycled",
        report.steps,
        report.rebuilds,
        report.subcycled
    );
    Ok(report)
}
