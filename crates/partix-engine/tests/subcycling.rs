//! Integration test: overlapping particles push each other apart through
//! the subcycling branch of the integrator.
//!
//! The runs are cold (1 K) so that the drift term dominates the noise
//! and whether a particle subcycles does not depend on its draw.

use partix_core::units::R_PARTICLE;
use partix_core::DVec3;
use partix_engine::{StepReport, SystemParams};
use partix_test_utils::{repulsive, run_partitions, RunSpec};

const R: f64 = R_PARTICLE;

fn cold(strength: f64) -> SystemParams {
    SystemParams {
        temperature: 1.0,
        ..repulsive(strength)
    }
}

struct Step {
    report: StepReport,
    before: Vec<DVec3>,
    after: Vec<DVec3>,
}

/// One rebuild, force update and step of a pair 1.2R apart.
fn overlapping_pair(params: SystemParams) -> (Step, SystemParams) {
    let positions = vec![
        DVec3::new(19.4 * R, 20.0 * R, 20.0 * R),
        DVec3::new(20.6 * R, 20.0 * R, 20.0 * R),
    ];
    let spec = RunSpec::new(params.clone(), [1, 1, 1], positions);
    let mut out = run_partitions(&spec, |part| {
        part.update_neighbors().unwrap();
        part.update_forces().unwrap();
        let before = part.state().internal_positions().to_vec();
        let report = part.integrate().unwrap();
        Step {
            report,
            before,
            after: part.state().internal_positions().to_vec(),
        }
    });
    (out.remove(0), params)
}

fn gap(params: &SystemParams, pair: &[DVec3]) -> f64 {
    let pbox = params.periodic_box().unwrap();
    pbox.separation(pair[0], pair[1]).length()
}

#[test]
fn weak_overlap_steps_directly() {
    let (step, _) = overlapping_pair(cold(1e-6));
    assert_eq!(step.report.subcycled, 0);
    assert_eq!(step.report.max_subdivisions, 0);
}

#[test]
fn strong_overlap_subcycles_and_separates() {
    let (step, params) = overlapping_pair(cold(1e-3));
    assert_eq!(step.report.subcycled, 2);
    assert!(step.report.max_subdivisions >= 2);

    let pbox = params.periodic_box().unwrap();
    assert!(step.after.iter().all(|&p| pbox.contains(p)));
    assert!(gap(&params, &step.after) > gap(&params, &step.before));
    // pushed outwards along x
    assert!(step.after[0].x < step.before[0].x);
    assert!(step.after[1].x > step.before[1].x);
}

#[test]
fn stiffer_tables_need_finer_subdivision() {
    let (soft, _) = overlapping_pair(cold(1e-3));
    let (stiff, params) = overlapping_pair(cold(1e-2));
    assert_eq!(stiff.report.subcycled, 2);
    // drift alone needs n > 500 on the first sub-step
    assert!(stiff.report.max_subdivisions >= 256);
    assert!(stiff.report.max_subdivisions > soft.report.max_subdivisions);

    let pbox = params.periodic_box().unwrap();
    assert!(stiff.after.iter().all(|&p| pbox.contains(p)));
    assert!(gap(&params, &stiff.after) > gap(&params, &stiff.before));
}
