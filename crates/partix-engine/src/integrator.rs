//! Adaptive Brownian integrator.
//!
//! A step moves each internal particle by
//!
//! ```text
//! δ = (dt/γ)·F + sqrt(2·kT·dt/γ)·ξ
//! ```
//!
//! with `ξ` a unit Gaussian vector. When the implied energy change
//! `|δ·F|` exceeds `dU_max`, the step is split into `n` sub-steps that
//! re-evaluate the force at the particle's moving position while every
//! other particle stays put. If some sub-step still exceeds the bound,
//! `n` doubles and the attempt is repeated.
//!
//! Every attempt consumes unit draws from a shared history: sub-step `k`
//! replays entry `k` if it exists and appends a fresh draw otherwise.
//! Entry 0 is the draw of the rejected full step. Finer attempts thus
//! reuse the noise of coarser ones instead of drawing new noise, which
//! would bias large subdivisions towards calmer trajectories.

use glam::DVec3;
use partix_core::{DivergenceError, PeriodicBox, Tag};

use crate::config::SystemParams;
use crate::forces::PairForce;
use crate::neighbor::Adjacency;
use crate::random::GaussianSource;
use crate::state::PartitionState;

/// Drift and noise coefficients for a step of `dt / divisions`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepCoefficients {
    /// Sub-step length over friction.
    pub dt_inv_gamma: f64,
    /// Noise amplitude `sqrt(2·kT·sdt/γ)`.
    pub noise: f64,
}

impl StepCoefficients {
    /// Coefficients for `divisions` equal sub-steps of `params.dt`.
    pub fn new(params: &SystemParams, divisions: u32) -> Self {
        let sdt = params.dt / f64::from(divisions.max(1));
        Self {
            dt_inv_gamma: sdt / params.friction,
            noise: (2.0 * params.kt() * sdt / params.friction).sqrt(),
        }
    }
}

/// Result of subcycling one particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubcycleOutcome {
    /// Total displacement over the step, unwrapped.
    pub displacement: DVec3,
    /// Final position, wrapped into the box.
    pub position: DVec3,
    /// Sub-steps used by the accepted attempt.
    pub subdivisions: u32,
    /// Largest sub-step energy change of the accepted attempt.
    pub peak_du: f64,
}

/// Integrate one particle over one step by subdivision.
///
/// `start` is the particle's position, `f0` the force there, `du` the
/// rejected full step's energy change and `history` the replayable unit
/// draws, holding at least the full step's draw. `force_at` gives the
/// force at any position with every other particle fixed.
#[allow(clippy::too_many_arguments)]
pub fn integrate_subcycle<F>(
    params: &SystemParams,
    pbox: &PeriodicBox,
    tag: Tag,
    start: DVec3,
    f0: DVec3,
    du: f64,
    history: &mut Vec<DVec3>,
    rng: &mut GaussianSource,
    mut force_at: F,
) -> Result<SubcycleOutcome, DivergenceError>
where
    F: FnMut(DVec3) -> DVec3,
{
    if !du.is_finite() {
        return Err(DivergenceError::NonFiniteEnergy {
            tag,
            subdivisions: 1,
        });
    }
    let du_max = params.du_max;
    let mut n: u32 = 1 + (du_max / du).ceil() as u32;
    loop {
        let c = StepCoefficients::new(params, n);
        let mut position = start;
        let mut displacement = DVec3::ZERO;
        let mut peak = 0.0f64;
        let mut accepted = true;
        for k in 0..n as usize {
            let unit = match history.get(k) {
                Some(&v) => v,
                None => {
                    let v = rng.draw_one(1.0);
                    history.push(v);
                    v
                }
            };
            let force = if k == 0 { f0 } else { force_at(position) };
            let delta = force * c.dt_inv_gamma + unit * c.noise;
            let du = delta.dot(force).abs();
            if !du.is_finite() {
                return Err(DivergenceError::NonFiniteEnergy {
                    tag,
                    subdivisions: n,
                });
            }
            peak = peak.max(du);
            if du > du_max {
                accepted = false;
                break;
            }
            displacement += delta;
            position = pbox.wrap(position + delta);
        }
        if accepted {
            if !pbox.contains(position) {
                return Err(DivergenceError::PositionEscaped { tag, position });
            }
            return Ok(SubcycleOutcome {
                displacement,
                position,
                subdivisions: n,
                peak_du: peak,
            });
        }
        n = n
            .checked_mul(2)
            .ok_or(DivergenceError::SubdivisionOverflow { tag, subdivisions: n })?;
        if n > 4 {
            log::warn!("particle {tag}: subcycling with {n} subdivisions");
        } else {
            log::trace!("particle {tag}: subcycle refined to {n}");
        }
    }
}

/// What one integration step did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Some particle moved far enough that the pair lists may be stale.
    pub rebuild: bool,
    /// Particles that needed subcycling.
    pub subcycled: usize,
    /// Largest subdivision count used.
    pub max_subdivisions: u32,
}

/// Advance every internal particle by one step.
///
/// Forces must be current. All particles see the step's start
/// positions; results are committed together at the end.
pub(crate) fn integrate_step(
    state: &mut PartitionState,
    params: &SystemParams,
    pbox: &PeriodicBox,
    rng: &mut GaussianSource,
) -> Result<StepReport, DivergenceError> {
    let n = state.n_internal;
    let law = PairForce::new(params, pbox);
    let c = StepCoefficients::new(params, 1);
    let threshold = params.rebuild_threshold_sqr();
    let mut report = StepReport::default();

    let PartitionState {
        positions,
        tags,
        forces,
        nl_displace,
        new_positions,
        gauss,
        adjacency,
        history,
        ..
    } = state;
    rng.fill(&mut gauss[..n], 1.0);

    for i in (0..n).rev() {
        let force = forces[i];
        let unit = gauss[i];
        let delta = force * c.dt_inv_gamma + unit * c.noise;
        let du = delta.dot(force).abs();
        if !du.is_finite() {
            return Err(DivergenceError::NonFiniteEnergy {
                tag: tags[i],
                subdivisions: 1,
            });
        }
        let moved = if du > params.du_max {
            history.clear();
            history.push(unit);
            let outcome = integrate_subcycle(
                params,
                pbox,
                tags[i],
                positions[i],
                force,
                du,
                history,
                rng,
                |at| particle_force(&law, adjacency, positions, i, at),
            )?;
            history.clear();
            report.subcycled += 1;
            report.max_subdivisions = report.max_subdivisions.max(outcome.subdivisions);
            new_positions[i] = outcome.position;
            outcome.displacement
        } else {
            let p = pbox.wrap(positions[i] + delta);
            if !pbox.contains(p) {
                return Err(DivergenceError::PositionEscaped {
                    tag: tags[i],
                    position: p,
                });
            }
            new_positions[i] = p;
            delta
        };
        nl_displace[i] += moved;
        report.rebuild |= nl_displace[i].length_squared() > threshold;
    }
    positions[..n].copy_from_slice(&new_positions[..n]);
    Ok(report)
}

fn particle_force(
    law: &PairForce<'_>,
    adjacency: &Adjacency,
    positions: &[DVec3],
    i: usize,
    at: DVec3,
) -> DVec3 {
    law.on_particle(at, adjacency.neighbors_of(i), positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{params, state_with};
    use partix_core::units::R_PARTICLE;
    use proptest::prelude::*;

    #[test]
    fn coefficients_scale_with_divisions() {
        let p = params();
        let one = StepCoefficients::new(&p, 1);
        let four = StepCoefficients::new(&p, 4);
        assert!((one.dt_inv_gamma / 4.0 - four.dt_inv_gamma).abs() < 1e-30);
        assert!((one.noise / 2.0 - four.noise).abs() < 1e-25);
    }

    #[test]
    fn free_particles_only_diffuse() {
        let p = params();
        let pbox = p.periodic_box().unwrap();
        let start = [DVec3::splat(20.0 * R_PARTICLE), DVec3::splat(5.0 * R_PARTICLE)];
        let mut state = state_with(&start);
        let mut rng = GaussianSource::seed(11);
        let report = integrate_step(&mut state, &p, &pbox, &mut rng).unwrap();
        assert_eq!(report.subcycled, 0);
        let sigma = StepCoefficients::new(&p, 1).noise;
        for (a, b) in start.iter().zip(state.internal_positions()) {
            let d = pbox.separation(*a, *b);
            assert!(d.length() < 10.0 * sigma);
            assert!(d.length() > 0.0);
        }
        let moved = pbox.separation(start[0], state.positions()[0]);
        assert!((state.displacements()[0] - moved).length() < 1e-18);
    }

    #[test]
    fn same_seed_same_step() {
        let p = params();
        let pbox = p.periodic_box().unwrap();
        let start = [DVec3::splat(1.0 * R_PARTICLE), DVec3::splat(2.0 * R_PARTICLE)];
        let mut a = state_with(&start);
        let mut b = state_with(&start);
        let (mut ra, mut rb) = (GaussianSource::seed(5), GaussianSource::seed(5));
        for _ in 0..5 {
            integrate_step(&mut a, &p, &pbox, &mut ra).unwrap();
            integrate_step(&mut b, &p, &pbox, &mut rb).unwrap();
        }
        assert_eq!(a.positions(), b.positions());
    }

    #[test]
    fn big_moves_request_a_rebuild() {
        let mut p = params();
        p.temperature = 2000.0;
        p.dt = 1e-5;
        p.du_max = 1e6;
        let pbox = p.periodic_box().unwrap();
        let mut state = state_with(&[DVec3::splat(20.0 * R_PARTICLE)]);
        let mut rng = GaussianSource::seed(1);
        assert!(integrate_step(&mut state, &p, &pbox, &mut rng).unwrap().rebuild);
    }

    #[test]
    fn non_finite_forces_diverge_without_subcycling() {
        let p = params();
        let pbox = p.periodic_box().unwrap();
        for bad in [f64::NAN, f64::INFINITY] {
            let mut state = state_with(&[DVec3::splat(20.0 * R_PARTICLE)]);
            state.forces[0] = DVec3::new(bad, 0.0, 0.0);
            let mut rng = GaussianSource::seed(1);
            assert_eq!(
                integrate_step(&mut state, &p, &pbox, &mut rng),
                Err(DivergenceError::NonFiniteEnergy {
                    tag: Tag(0),
                    subdivisions: 1,
                })
            );
        }
    }

    /// A force that makes the full step exceed the bound about threefold.
    fn steep(p: &SystemParams) -> f64 {
        (3.0 * p.du_max / StepCoefficients::new(p, 1).dt_inv_gamma).sqrt()
    }

    #[test]
    fn three_times_the_bound_starts_at_two_subdivisions() {
        let p = params();
        let pbox = p.periodic_box().unwrap();
        let f = DVec3::new(steep(&p), 0.0, 0.0);
        let c = StepCoefficients::new(&p, 1);
        let du = (f * c.dt_inv_gamma).dot(f).abs();
        assert!((du / p.du_max - 3.0).abs() < 1e-9);

        let mut history = vec![DVec3::ZERO];
        let mut rng = GaussianSource::seed(2);
        let start = DVec3::splat(20.0 * R_PARTICLE);
        // constant force, no noise beyond the replayed zero draw
        let out = integrate_subcycle(&p, &pbox, Tag(0), start, f, du, &mut history, &mut rng, |_| f)
            .unwrap();
        // sub-step energy scales as 1/n: 1.5 at n=2, 0.75 at n=4 (plus noise)
        assert!(out.subdivisions >= 4);
        assert!(out.peak_du <= p.du_max);
        assert_eq!(history[0], DVec3::ZERO);
        assert!(history.len() >= out.subdivisions as usize);
    }

    #[test]
    fn finer_attempts_replay_coarser_draws() {
        let p = params();
        let pbox = p.periodic_box().unwrap();
        let f = DVec3::new(steep(&p), 0.0, 0.0);
        let du = 3.0 * p.du_max;
        let first = DVec3::new(0.3, -0.2, 0.1);
        let mut history = vec![first];
        let mut rng = GaussianSource::seed(9);
        let out = integrate_subcycle(
            &p,
            &pbox,
            Tag(3),
            DVec3::splat(20.0 * R_PARTICLE),
            f,
            du,
            &mut history,
            &mut rng,
            |_| f,
        )
        .unwrap();
        assert_eq!(history[0], first);

        // Rerun from the same generator state with the recorded draws:
        // nothing new may be drawn and the result must match exactly.
        let mut replay = history.clone();
        let mut idle = GaussianSource::seed(9);
        let again = integrate_subcycle(
            &p,
            &pbox,
            Tag(3),
            DVec3::splat(20.0 * R_PARTICLE),
            f,
            du,
            &mut replay,
            &mut idle,
            |_| f,
        )
        .unwrap();
        assert_eq!(out, again);
        assert_eq!(replay, history);
    }

    #[test]
    fn non_finite_force_inside_a_subcycle_is_reported() {
        let p = params();
        let pbox = p.periodic_box().unwrap();
        let f = DVec3::new(steep(&p), 0.0, 0.0);
        let du = 3.0 * p.du_max;
        let mut history = vec![DVec3::ZERO];
        let mut rng = GaussianSource::seed(4);
        // n = 2 fails on the first sub-step; n = 4 accepts it and then
        // meets the NaN force on the second
        let err = integrate_subcycle(
            &p,
            &pbox,
            Tag(5),
            DVec3::splat(20.0 * R_PARTICLE),
            f,
            du,
            &mut history,
            &mut rng,
            |_| DVec3::splat(f64::NAN),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DivergenceError::NonFiniteEnergy {
                tag: Tag(5),
                subdivisions: 4,
            }
        );
    }

    proptest! {
        #[test]
        fn subcycling_respects_the_bound(
            fx in -5e-11f64..5e-11,
            fy in -5e-11f64..5e-11,
            ux in -3.0f64..3.0,
            uy in -3.0f64..3.0,
            uz in -3.0f64..3.0,
            seed in any::<u32>(),
        ) {
            let p = params();
            let pbox = p.periodic_box().unwrap();
            let f = DVec3::new(fx, fy, 0.0);
            let unit = DVec3::new(ux, uy, uz);
            let c = StepCoefficients::new(&p, 1);
            let du = (f * c.dt_inv_gamma + unit * c.noise).dot(f).abs();
            prop_assume!(du > p.du_max);
            let mut history = vec![unit];
            let mut rng = GaussianSource::seed(seed);
            let out = integrate_subcycle(
                &p, &pbox, Tag(0), DVec3::splat(20.0 * R_PARTICLE), f, du,
                &mut history, &mut rng, |_| f,
            ).unwrap();
            prop_assert!(out.peak_du <= p.du_max);
            prop_assert!(out.subdivisions >= 2);
            prop_assert!(pbox.contains(out.position));
        }
    }
}
