//! Four partitions on threads, diffusing soft spheres for a few hundred
//! steps.
//!
//! ```text
//! RUST_LOG=info cargo run -p partix-engine --example quickstart
//! ```

use std::thread;
use std::time::Instant;

use partix_comm::{build_rules, Fabric, MemoryNetwork};
use partix_core::units::{KB, R_PARTICLE};
use partix_engine::{simulate_cycles, EngineConfig, ForceMode, InterpTable, Partition, SystemParams};
use partix_space::Decomposition;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let r = R_PARTICLE;
    let contact = 2.0 * r;
    let k = 1e-6;
    let step = 0.01 * r;
    let params = SystemParams {
        box_size: glam::DVec3::splat(40.0 * r),
        temperature: 300.0,
        dt: 1e-9,
        du_max: 0.1 * KB * 300.0,
        friction: 1.27e-9,
        force_update_rate: 10,
        r_pair_cutoff: 3.0 * r,
        r_neighbor: 4.0 * r,
        pair_potential: InterpTable::sample(0.0, step, 400, |x| {
            if x < contact {
                0.5 * k * (contact - x).powi(2)
            } else {
                0.0
            }
        })?,
        pair_force: InterpTable::sample(0.0, step, 400, |x| {
            if x < contact {
                k * (contact - x) / x.max(step)
            } else {
                0.0
            }
        })?,
    };

    let pbox = params.periodic_box()?;
    let decomp = Decomposition::uniform(pbox, [2, 2, 1])?;
    let per_axis = 10;
    let spacing = 40.0 * r / per_axis as f64;
    let mut positions = Vec::new();
    for x in 0..per_axis {
        for y in 0..per_axis {
            for z in 0..per_axis {
                positions.push((glam::DVec3::new(x as f64, y as f64, z as f64) + 0.5) * spacing);
            }
        }
    }
    let loads = decomp.assign(&positions)?;
    let rules = build_rules(&decomp)?;
    let neighbors: Vec<_> = decomp.cells().iter().map(|c| c.neighbors.clone()).collect();
    let endpoints = MemoryNetwork::connect(&neighbors)?;

    let started = Instant::now();
    let reports = thread::scope(|s| {
        let handles: Vec<_> = decomp
            .cells()
            .iter()
            .zip(loads)
            .zip(rules)
            .zip(endpoints)
            .map(|(((cell, load), rules), ep)| {
                let params = params.clone();
                s.spawn(move || -> Result<_, partix_core::SimError> {
                    let mut part = Partition::new(EngineConfig {
                        force_mode: ForceMode::Overlapped,
                    });
                    part.initialize_system(params)?;
                    part.initialize_random(2024 + cell.id.0)?;
                    part.initialize_cell_state(cell.extent, load.positions, load.tags)?;
                    part.initialize_cell_comm(Fabric::new(
                        ep.id,
                        ep.channels,
                        rules,
                        Box::new(ep.collective),
                    )?)?;
                    part.initialize_cell_junctions(cell.junctions.clone())?;
                    let report = simulate_cycles(&mut part, 500)?;
                    let owned = part.state().n_internal();
                    part.exit()?;
                    Ok((cell.id, report, owned))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| "partition thread panicked"))
            .collect::<Vec<_>>()
    });

    for joined in reports {
        let (id, report, owned) = joined??;
        println!(
            "partition {id}: {owned} particles, {} steps, {} rebuilds, {} subcycled (max n = {})",
            report.steps, report.rebuilds, report.subcycled, report.max_subdivisions
        );
    }
    println!("elapsed: {:.2?}", started.elapsed());
    Ok(())
}
