//! Run a decomposed system on threads, one per partition.

use std::thread;

use glam::DVec3;
use partix_comm::{build_rules, Fabric, MemoryChannel, MemoryNetwork};
use partix_core::Tag;
use partix_engine::{EngineConfig, Partition, Snapshot, SystemParams};
use partix_space::{CellLoad, Decomposition};

/// Everything needed to start an in-process run.
#[derive(Clone, Debug)]
pub struct RunSpec {
    pub params: SystemParams,
    pub divisions: [usize; 3],
    /// Initial positions of every particle in the run. A particle's tag
    /// is its index here.
    pub positions: Vec<DVec3>,
    pub config: EngineConfig,
    /// Partition `r` is seeded with `seed + r`.
    pub seed: u32,
}

impl RunSpec {
    pub fn new(params: SystemParams, divisions: [usize; 3], positions: Vec<DVec3>) -> Self {
        Self {
            params,
            divisions,
            positions,
            config: EngineConfig::default(),
            seed: 1,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }
}

/// Initialize one partition per cell of `spec`, run `body` on each in
/// its own thread, and return the results in rank order.
///
/// Panics if setup fails or any thread panics.
pub fn run_partitions<T, F>(spec: &RunSpec, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(&mut Partition<MemoryChannel>) -> T + Sync,
{
    let decomp = decomposition(spec);
    let loads = decomp.assign(&spec.positions).expect("assignment");
    run_assigned(spec, loads, body)
}

fn decomposition(spec: &RunSpec) -> Decomposition {
    let pbox = spec.params.periodic_box().expect("box");
    let decomp = Decomposition::uniform(pbox, spec.divisions).expect("decomposition");
    decomp
        .check_reach(spec.params.r_neighbor)
        .expect("partitions too narrow for the neighbor radius");
    decomp
}

/// Like [`run_partitions`], but partition `r` starts with `loads[r]`
/// instead of the particles inside its extent. `spec.positions` is
/// ignored.
pub fn run_assigned<T, F>(spec: &RunSpec, loads: Vec<CellLoad>, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(&mut Partition<MemoryChannel>) -> T + Sync,
{
    let decomp = decomposition(spec);
    assert_eq!(loads.len(), decomp.len(), "one load per partition");
    let rules = build_rules(&decomp).expect("schedule");
    let neighbors: Vec<_> = decomp.cells().iter().map(|c| c.neighbors.clone()).collect();
    let endpoints = MemoryNetwork::connect(&neighbors).expect("network");
    let body = &body;

    thread::scope(|s| {
        let handles: Vec<_> = decomp
            .cells()
            .iter()
            .zip(loads)
            .zip(rules)
            .zip(endpoints)
            .map(|(((cell, load), rules), ep)| {
                s.spawn(move || {
                    let mut part = Partition::new(spec.config.clone());
                    part.initialize_system(spec.params.clone()).expect("system");
                    part.initialize_random(spec.seed.wrapping_add(cell.id.0))
                        .expect("random");
                    part.initialize_cell_state(cell.extent, load.positions, load.tags)
                        .expect("cell state");
                    let fabric = Fabric::new(ep.id, ep.channels, rules, Box::new(ep.collective))
                        .expect("fabric");
                    part.initialize_cell_comm(fabric).expect("cell comm");
                    part.initialize_cell_junctions(cell.junctions.clone())
                        .expect("cell junctions");
                    body(&mut part)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("partition thread panicked"))
            .collect()
    })
}

/// Merge per-partition snapshots into one list ordered by tag.
pub fn by_tag(snapshots: impl IntoIterator<Item = Snapshot>) -> Vec<(Tag, DVec3)> {
    let mut all: Vec<(Tag, DVec3)> = snapshots
        .into_iter()
        .flat_map(|s| s.tags.into_iter().zip(s.positions))
        .collect();
    all.sort_by_key(|&(t, _)| t);
    all
}
