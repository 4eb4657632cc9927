//! Integration test: partitions configured purely from encoded handshake
//! records, the way an external controller would drive them.

use std::thread;

use partix_comm::{build_rules, Fabric, MemoryNetwork};
use partix_core::units::R_PARTICLE;
use partix_core::{SimError, StageError};
use partix_engine::handshake::{
    read_cell_comm, read_cell_junctions, read_cell_state, read_random, read_system,
    write_cell_comm, write_cell_junctions, write_cell_state, write_random, write_system,
};
use partix_engine::{simulate_cycles, EngineConfig, Partition, Snapshot, Stage};
use partix_msg::{MessageError, MessageReader, MessageWriter};
use partix_space::Decomposition;
use partix_test_utils::fixtures::jittered_lattice;
use partix_test_utils::repulsive;

fn record(f: impl FnOnce(&mut MessageWriter) -> Result<(), MessageError>) -> Vec<u8> {
    let mut w = MessageWriter::new();
    f(&mut w).unwrap();
    w.into_bytes()
}

/// The five initialization records of one partition.
struct Records {
    system: Vec<u8>,
    random: Vec<u8>,
    cell_state: Vec<u8>,
    cell_comm: Vec<u8>,
    cell_junctions: Vec<u8>,
}

#[test]
fn controller_records_configure_a_two_partition_run() {
    let params = repulsive(1e-6);
    let pbox = params.periodic_box().unwrap();
    let decomp = Decomposition::uniform(pbox, [2, 1, 1]).unwrap();
    let positions = jittered_lattice(&pbox, 4, 1.0 * R_PARTICLE, 3);
    let loads = decomp.assign(&positions).unwrap();
    let rules = build_rules(&decomp).unwrap();

    let records: Vec<Records> = decomp
        .cells()
        .iter()
        .zip(&loads)
        .zip(&rules)
        .map(|((cell, load), rules)| Records {
            system: record(|w| write_system(w, &params)),
            random: record(|w| write_random(w, 100 + cell.id.0)),
            cell_state: record(|w| write_cell_state(w, &cell.extent, &load.positions, &load.tags)),
            cell_comm: record(|w| write_cell_comm(w, &cell.neighbors, rules)),
            cell_junctions: record(|w| write_cell_junctions(w, &cell.junctions)),
        })
        .collect();

    let neighbors: Vec<_> = decomp.cells().iter().map(|c| c.neighbors.clone()).collect();
    let endpoints = MemoryNetwork::connect(&neighbors).unwrap();
    let partitions = decomp.len();

    let snapshots: Vec<Snapshot> = thread::scope(|s| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .zip(&records)
            .map(|(ep, rec)| {
                s.spawn(move || {
                    let mut part = Partition::new(EngineConfig::default());

                    let params = read_system(&mut MessageReader::new(&rec.system)).unwrap();
                    let pbox = params.periodic_box().unwrap();
                    part.initialize_system(params).unwrap();

                    let seed = read_random(&mut MessageReader::new(&rec.random)).unwrap();
                    part.initialize_random(seed).unwrap();

                    let state =
                        read_cell_state(&mut MessageReader::new(&rec.cell_state), &pbox).unwrap();
                    let extent = state.extent;
                    part.initialize_cell_state(state.extent, state.positions, state.tags)
                        .unwrap();

                    let comm =
                        read_cell_comm(&mut MessageReader::new(&rec.cell_comm), partitions)
                            .unwrap();
                    assert_eq!(comm.peers.len(), ep.channels.len());
                    let fabric =
                        Fabric::new(ep.id, ep.channels, comm.rules, Box::new(ep.collective))
                            .unwrap();
                    part.initialize_cell_comm(fabric).unwrap();

                    let junctions = read_cell_junctions(
                        &mut MessageReader::new(&rec.cell_junctions),
                        &extent,
                        &pbox,
                        comm.peers.len(),
                    )
                    .unwrap();
                    part.initialize_cell_junctions(junctions).unwrap();
                    assert_eq!(part.stage(), Stage::Ready);

                    simulate_cycles(&mut part, 15).unwrap();
                    let snap = part.collect_positions_and_tags().unwrap();
                    part.exit().unwrap();
                    snap
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let total: usize = snapshots.iter().map(|s| s.tags.len()).sum();
    assert_eq!(total, positions.len());
}

#[test]
fn simulation_before_junctions_is_rejected() {
    let params = repulsive(1e-6);
    let bytes = record(|w| write_system(w, &params));
    let mut part = Partition::<partix_comm::MemoryChannel>::new(EngineConfig::default());
    part.initialize_system(read_system(&mut MessageReader::new(&bytes)).unwrap())
        .unwrap();
    part.initialize_random(1).unwrap();
    let err = part.update_forces().unwrap_err();
    assert_eq!(
        err,
        SimError::Stage(StageError::OutOfOrder {
            operation: "update_forces",
            required: "ready",
            current: "random",
        })
    );
    assert_eq!(part.stage(), Stage::Failed);
    assert!(matches!(
        part.collect_positions_and_tags(),
        Err(SimError::Stage(StageError::Failed { .. }))
    ));
}
