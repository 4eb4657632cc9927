//! The staged per-partition API.
//!
//! A [`Partition`] is configured by five initialization calls, issued in
//! order, after which it accepts the simulation calls any number of
//! times:
//!
//! ```text
//! initialize_system → initialize_random → initialize_cell_state
//!   → initialize_cell_comm → initialize_cell_junctions → Ready
//!
//! Ready: update_neighbors, update_forces, integrate, any_rebuild,
//!        collect_positions_and_tags, collect_state
//! ```
//!
//! Every call checks the stage first. A call in the wrong stage, or any
//! call that fails, moves the partition to [`Stage::Failed`]; from then
//! on every call is rejected with [`StageError::Failed`]. Peers may be
//! blocked mid-protocol at that point, so the embedding driver is
//! expected to abort the run.

use glam::DVec3;
use partix_comm::{Channel, Fabric};
use partix_core::{ConfigError, PartitionId, PeriodicBox, SimError, StageError, Tag};
use partix_space::{Extent, JunctionSet};

use crate::config::{EngineConfig, ForceMode, SystemParams};
use crate::discovery::{discover, prune};
use crate::forces::{self, PairForce};
use crate::integrator::{integrate_step, StepReport};
use crate::membership::migrate;
use crate::neighbor::{build_external, build_internal};
use crate::random::GaussianSource;
use crate::snapshot::{PartitionDump, Snapshot};
use crate::state::PartitionState;

// ── Stage ──────────────────────────────────────────────────────────

/// Lifecycle stage of a partition. Stages advance in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Freshly created.
    Uninitialized,
    /// System parameters accepted.
    System,
    /// Random source seeded.
    Random,
    /// Extent and initial particles accepted.
    CellState,
    /// Channels and protocol rules accepted.
    CellComm,
    /// Junctions accepted; simulation calls are allowed.
    Ready,
    /// An earlier call failed. Terminal.
    Failed,
    /// [`Partition::exit`] was called. Terminal.
    Exited,
}

impl Stage {
    /// Lower-case name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::System => "system",
            Self::Random => "random",
            Self::CellState => "cell-state",
            Self::CellComm => "cell-comm",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Exited => "exited",
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Exited)
    }
}

// ── RebuildReport ──────────────────────────────────────────────────

/// What one [`Partition::update_neighbors`] call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Particles handed to neighbors.
    pub sent: usize,
    /// Particles adopted from neighbors.
    pub received: usize,
    /// Replicas received before pruning.
    pub replicas: usize,
    /// Replicas this partition asked its neighbors to stop sending.
    pub pruned: usize,
    /// Internal pairs in the rebuilt list.
    pub internal_pairs: usize,
    /// External pairs in the rebuilt list.
    pub external_pairs: usize,
}

// ── Partition ──────────────────────────────────────────────────────

/// One spatial partition of a distributed run.
pub struct Partition<C: Channel> {
    config: EngineConfig,
    stage: Stage,
    params: Option<SystemParams>,
    pbox: Option<PeriodicBox>,
    rng: Option<GaussianSource>,
    extent: Option<Extent>,
    fabric: Option<Fabric<C>>,
    junctions: JunctionSet,
    state: PartitionState,
    pool: Option<rayon::ThreadPool>,
}

/// Split borrows of a ready partition.
struct Parts<'a, C: Channel> {
    params: &'a SystemParams,
    pbox: &'a PeriodicBox,
    extent: &'a Extent,
    junctions: &'a JunctionSet,
    fabric: &'a mut Fabric<C>,
    rng: &'a mut GaussianSource,
    state: &'a mut PartitionState,
    pool: Option<&'a rayon::ThreadPool>,
    mode: ForceMode,
}

enum Requirement {
    Exactly(Stage),
    AtLeast(Stage),
}

impl<C: Channel> Partition<C> {
    /// An uninitialized partition.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            stage: Stage::Uninitialized,
            params: None,
            pbox: None,
            rng: None,
            extent: None,
            fabric: None,
            junctions: JunctionSet::empty(),
            state: PartitionState::default(),
            pool: None,
        }
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Execution options.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Accepted system parameters, once initialized.
    pub fn params(&self) -> Option<&SystemParams> {
        self.params.as_ref()
    }

    /// This partition's extent, once initialized.
    pub fn extent(&self) -> Option<&Extent> {
        self.extent.as_ref()
    }

    /// Rank, once the communication fabric is attached.
    pub fn id(&self) -> Option<PartitionId> {
        self.fabric.as_ref().map(|f| f.id())
    }

    /// Particle state, for inspection.
    pub fn state(&self) -> &PartitionState {
        &self.state
    }

    fn check(&mut self, operation: &'static str, req: Requirement) -> Result<(), StageError> {
        let current = self.stage;
        match current {
            Stage::Failed => return Err(StageError::Failed { operation }),
            Stage::Exited => return Err(StageError::Exited { operation }),
            _ => {}
        }
        let (ok, required) = match req {
            Requirement::Exactly(s) => (current == s, s),
            Requirement::AtLeast(s) => (current >= s, s),
        };
        if ok {
            Ok(())
        } else {
            self.stage = Stage::Failed;
            Err(StageError::OutOfOrder {
                operation,
                required: required.name(),
                current: current.name(),
            })
        }
    }

    /// Run `f` after the stage check; any error fails the partition.
    fn guarded<T>(
        &mut self,
        operation: &'static str,
        req: Requirement,
        f: impl FnOnce(&mut Self) -> Result<T, SimError>,
    ) -> Result<T, SimError> {
        self.check(operation, req)?;
        let result = f(self);
        if let Err(e) = &result {
            if !self.stage.is_terminal() {
                self.stage = Stage::Failed;
            }
            log::error!("{operation} failed: {e}");
        }
        result
    }

    fn parts(&mut self, operation: &'static str) -> Result<Parts<'_, C>, SimError> {
        let (Some(params), Some(pbox), Some(extent), Some(fabric), Some(rng)) = (
            self.params.as_ref(),
            self.pbox.as_ref(),
            self.extent.as_ref(),
            self.fabric.as_mut(),
            self.rng.as_mut(),
        ) else {
            return Err(StageError::OutOfOrder {
                operation,
                required: Stage::Ready.name(),
                current: self.stage.name(),
            }
            .into());
        };
        Ok(Parts {
            params,
            pbox,
            extent,
            junctions: &self.junctions,
            fabric,
            rng,
            state: &mut self.state,
            pool: self.pool.as_ref(),
            mode: self.config.force_mode,
        })
    }

    // ── Initialization ─────────────────────────────────────────────

    /// Accept the run's physical parameters.
    pub fn initialize_system(&mut self, params: SystemParams) -> Result<(), SimError> {
        self.guarded(
            "initialize_system",
            Requirement::Exactly(Stage::Uninitialized),
            |p| {
                params.validate()?;
                let pbox = params.periodic_box()?;
                if let ForceMode::Parallel { .. } = p.config.force_mode {
                    let threads = p.config.resolved_threads();
                    let pool = rayon::ThreadPoolBuilder::new()
                        .num_threads(threads)
                        .thread_name(|i| format!("partix-force-{i}"))
                        .build()
                        .map_err(|e| ConfigError::InvalidParameter {
                            name: "threads",
                            reason: e.to_string(),
                        })?;
                    p.pool = Some(pool);
                }
                let s = params.box_size;
                log::info!(
                    "system: box=({:e}, {:e}, {:e}) T={} dt={:e} dU_max={:.3} kT gamma={:e} \
                     cutoff={:e} r_neighbor={:e} force_update={} mode={:?}",
                    s.x,
                    s.y,
                    s.z,
                    params.temperature,
                    params.dt,
                    params.du_max / params.kt(),
                    params.friction,
                    params.r_pair_cutoff,
                    params.r_neighbor,
                    params.force_update_rate,
                    p.config.force_mode,
                );
                p.params = Some(params);
                p.pbox = Some(pbox);
                p.stage = Stage::System;
                Ok(())
            },
        )
    }

    /// Seed the partition's Gaussian source.
    pub fn initialize_random(&mut self, seed: u32) -> Result<(), SimError> {
        self.guarded("initialize_random", Requirement::Exactly(Stage::System), |p| {
            let rng = GaussianSource::seed(seed);
            let first = rng.clone().draw_one(1.0);
            log::info!("random: seed={seed} first draw=({}, {}, {})", first.x, first.y, first.z);
            p.rng = Some(rng);
            p.stage = Stage::Random;
            Ok(())
        })
    }

    /// Accept this partition's extent and its initial particles.
    ///
    /// Positions must lie inside the box. Particles outside `extent` are
    /// handed to their owners by the first rebuild.
    pub fn initialize_cell_state(
        &mut self,
        extent: Extent,
        positions: Vec<DVec3>,
        tags: Vec<Tag>,
    ) -> Result<(), SimError> {
        self.guarded(
            "initialize_cell_state",
            Requirement::Exactly(Stage::Random),
            |p| {
                let pbox = p.pbox.ok_or(StageError::OutOfOrder {
                    operation: "initialize_cell_state",
                    required: Stage::System.name(),
                    current: p.stage.name(),
                })?;
                if !extent.fits_in(&pbox) {
                    return Err(ConfigError::InvalidParameter {
                        name: "extent",
                        reason: "extent exceeds the box".into(),
                    }
                    .into());
                }
                if let Some(k) = positions.iter().position(|&x| !pbox.contains(x)) {
                    return Err(ConfigError::InvalidParameter {
                        name: "positions",
                        reason: format!("particle {k} at {} is outside the box", positions[k]),
                    }
                    .into());
                }
                p.state = PartitionState::new(positions, tags)?;
                log::info!(
                    "cell state: extent={}..{} particles={}",
                    extent.min(),
                    extent.max(),
                    p.state.n_internal()
                );
                p.extent = Some(extent);
                p.stage = Stage::CellState;
                Ok(())
            },
        )
    }

    /// Attach the communication fabric: channels and protocol rules.
    pub fn initialize_cell_comm(&mut self, fabric: Fabric<C>) -> Result<(), SimError> {
        self.guarded(
            "initialize_cell_comm",
            Requirement::Exactly(Stage::CellState),
            |p| {
                p.state.ensure_channels(fabric.channel_count());
                log::info!(
                    "cell comm: partition {} with {} channels, {} rules",
                    fabric.id(),
                    fabric.channel_count(),
                    fabric.rules().len()
                );
                p.fabric = Some(fabric);
                p.stage = Stage::CellComm;
                Ok(())
            },
        )
    }

    /// Accept the junction topology. The partition is then ready.
    ///
    /// A partition with junctions must be at least `r_neighbor` wide on
    /// every axis along which the box is split.
    pub fn initialize_cell_junctions(&mut self, junctions: JunctionSet) -> Result<(), SimError> {
        self.guarded(
            "initialize_cell_junctions",
            Requirement::Exactly(Stage::CellComm),
            |p| {
                if !junctions.is_empty() {
                    if let (Some(extent), Some(pbox), Some(params)) =
                        (&p.extent, &p.pbox, &p.params)
                    {
                        extent.check_reach(pbox, params.r_neighbor)?;
                    }
                }
                let channels = p.fabric.as_ref().map_or(0, |f| f.channel_count());
                for cell in junctions.cells() {
                    if cell.channel.index() >= channels {
                        return Err(ConfigError::UnknownReference {
                            what: "channel",
                            index: cell.channel.index(),
                            len: channels,
                        }
                        .into());
                    }
                }
                log::info!(
                    "cell junctions: cells={} surface={} line={} point={}",
                    junctions.cells().len(),
                    junctions.surfaces().len(),
                    junctions.lines().len(),
                    junctions.points().len()
                );
                p.junctions = junctions;
                p.stage = Stage::Ready;
                Ok(())
            },
        )
    }

    // ── Simulation ─────────────────────────────────────────────────

    /// Rebuild cycle: migrate escaped particles, replicate boundary
    /// particles, rebuild both pair lists and prune unused replicas.
    ///
    /// A partition without junctions skips every exchange.
    pub fn update_neighbors(&mut self) -> Result<RebuildReport, SimError> {
        const OP: &str = "update_neighbors";
        self.guarded(OP, Requirement::Exactly(Stage::Ready), |p| {
            let Parts {
                params,
                pbox,
                extent,
                junctions,
                fabric,
                state,
                ..
            } = p.parts(OP)?;
            let r_sqr = params.r_neighbor_sqr();
            let linked = !junctions.is_empty();
            let mut report = RebuildReport::default();

            // 1. Ownership, then replicas.
            if linked {
                let m = migrate(state, fabric, extent, junctions)?;
                report.sent = m.sent;
                report.received = m.received;
                report.replicas = discover(state, fabric, extent, junctions, pbox, params.r_neighbor)?;
            } else {
                state.truncate_externals();
            }

            // 2. Pair lists.
            let n = state.n_internal;
            build_internal(&state.positions[..n], pbox, r_sqr, &mut state.internal);
            build_external(&state.positions, n, pbox, r_sqr, &mut state.external);

            // 3. Drop replicas nobody pairs with.
            if linked {
                report.pruned = prune(state, fabric, pbox, r_sqr)?;
            }

            // 4. Derived data.
            state.adjacency.rebuild(n, &state.internal, &state.external);
            state.reset_displacement();
            report.internal_pairs = state.internal.len();
            report.external_pairs = state.external.len();

            log::debug!(
                "rebuild: sent={} received={} replicas={} pruned={} kept={} pairs={}+{}",
                report.sent,
                report.received,
                report.replicas,
                report.pruned,
                state.n_external(),
                report.internal_pairs,
                report.external_pairs
            );
            Ok(report)
        })
    }

    /// Refresh replica positions and evaluate the force on every owned
    /// particle.
    pub fn update_forces(&mut self) -> Result<(), SimError> {
        const OP: &str = "update_forces";
        self.guarded(OP, Requirement::Exactly(Stage::Ready), |p| {
            let Parts {
                params,
                pbox,
                fabric,
                state,
                pool,
                mode,
                ..
            } = p.parts(OP)?;
            let law = PairForce::new(params, pbox);
            forces::update_forces(state, fabric, &law, mode, pool)
        })
    }

    /// Advance every owned particle by one time step. The report's
    /// `rebuild` flag is local; combine it with
    /// [`any_rebuild`](Self::any_rebuild).
    pub fn integrate(&mut self) -> Result<StepReport, SimError> {
        const OP: &str = "integrate";
        self.guarded(OP, Requirement::Exactly(Stage::Ready), |p| {
            let Parts {
                params,
                pbox,
                rng,
                state,
                ..
            } = p.parts(OP)?;
            Ok(integrate_step(state, params, pbox, rng)?)
        })
    }

    /// Logical OR of `flag` across every partition of the run.
    pub fn any_rebuild(&mut self, flag: bool) -> Result<bool, SimError> {
        const OP: &str = "any_rebuild";
        self.guarded(OP, Requirement::Exactly(Stage::Ready), |p| {
            let Parts { fabric, .. } = p.parts(OP)?;
            Ok(fabric.any(flag)?)
        })
    }

    /// Leave the run. Further calls are rejected with
    /// [`StageError::Exited`].
    pub fn exit(&mut self) -> Result<(), SimError> {
        match self.stage {
            Stage::Exited => Err(StageError::Exited { operation: "exit" }.into()),
            stage => {
                log::info!(
                    "exit from stage {} with {} particles",
                    stage.name(),
                    self.state.n_internal()
                );
                self.pool = None;
                self.stage = Stage::Exited;
                Ok(())
            }
        }
    }

    // ── Collection ─────────────────────────────────────────────────

    /// Positions and tags of owned particles.
    pub fn collect_positions_and_tags(&mut self) -> Result<Snapshot, SimError> {
        self.guarded(
            "collect_positions_and_tags",
            Requirement::AtLeast(Stage::CellState),
            |p| Ok(Snapshot::of(&p.state)),
        )
    }

    /// Positions including replicas, tags, and both pair lists.
    pub fn collect_state(&mut self) -> Result<PartitionDump, SimError> {
        self.guarded(
            "collect_state",
            Requirement::AtLeast(Stage::CellState),
            |p| Ok(PartitionDump::of(&p.state)),
        )
    }
}

impl<C: Channel> std::fmt::Debug for Partition<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("stage", &self.stage)
            .field("id", &self.id())
            .field("n_internal", &self.state.n_internal())
            .field("n_external", &self.state.n_external())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::params;
    use partix_comm::{build_rules, MemoryChannel, MemoryNetwork};
    use partix_core::units::R_PARTICLE;
    use partix_space::Decomposition;

    fn lone(positions: Vec<DVec3>, mode: ForceMode) -> Partition<MemoryChannel> {
        let p = params();
        let pbox = p.periodic_box().unwrap();
        let tags = (0..positions.len() as u32).map(Tag).collect();
        let mut part = Partition::new(EngineConfig { force_mode: mode });
        part.initialize_system(p).unwrap();
        part.initialize_random(7).unwrap();
        part.initialize_cell_state(Extent::whole(&pbox), positions, tags)
            .unwrap();
        part.initialize_cell_comm(Fabric::isolated(PartitionId(0)))
            .unwrap();
        part.initialize_cell_junctions(JunctionSet::empty()).unwrap();
        part
    }

    fn row() -> Vec<DVec3> {
        (0..5)
            .map(|k| DVec3::new((5.0 + 2.5 * k as f64) * R_PARTICLE, 10.0 * R_PARTICLE, 10.0 * R_PARTICLE))
            .collect()
    }

    #[test]
    fn stages_advance_in_order() {
        let part = lone(row(), ForceMode::Serial);
        assert_eq!(part.stage(), Stage::Ready);
        assert_eq!(part.id(), Some(PartitionId(0)));
        assert!(Stage::System < Stage::Ready);
    }

    #[test]
    fn calls_before_their_stage_are_fatal() {
        let mut part = Partition::<MemoryChannel>::new(EngineConfig::default());
        let err = part.initialize_random(1).unwrap_err();
        assert_eq!(
            err,
            SimError::Stage(StageError::OutOfOrder {
                operation: "initialize_random",
                required: "system",
                current: "uninitialized",
            })
        );
        assert_eq!(part.stage(), Stage::Failed);
        assert_eq!(
            part.initialize_system(params()).unwrap_err(),
            SimError::Stage(StageError::Failed {
                operation: "initialize_system"
            })
        );
    }

    #[test]
    fn simulation_calls_need_ready() {
        let mut part = Partition::<MemoryChannel>::new(EngineConfig::default());
        part.initialize_system(params()).unwrap();
        assert!(matches!(
            part.update_neighbors(),
            Err(SimError::Stage(StageError::OutOfOrder { .. }))
        ));
    }

    #[test]
    fn invalid_params_fail_the_partition() {
        let mut p = params();
        p.r_neighbor = p.r_pair_cutoff / 2.0;
        let mut part = Partition::<MemoryChannel>::new(EngineConfig::default());
        assert!(matches!(part.initialize_system(p), Err(SimError::Config(_))));
        assert_eq!(part.stage(), Stage::Failed);
    }

    #[test]
    fn positions_outside_the_box_are_rejected() {
        let p = params();
        let pbox = p.periodic_box().unwrap();
        let mut part = Partition::<MemoryChannel>::new(EngineConfig::default());
        part.initialize_system(p).unwrap();
        part.initialize_random(1).unwrap();
        let err = part
            .initialize_cell_state(Extent::whole(&pbox), vec![DVec3::splat(-1.0)], vec![Tag(0)])
            .unwrap_err();
        assert!(matches!(err, SimError::Config(ConfigError::InvalidParameter { name: "positions", .. })));
    }

    #[test]
    fn lone_partition_rebuilds_and_steps() {
        let mut part = lone(row(), ForceMode::Serial);
        let report = part.update_neighbors().unwrap();
        // spacing 2.5R, neighbor radius 4R: only adjacent particles pair
        assert_eq!(report.internal_pairs, 4);
        assert_eq!(report.external_pairs, 0);
        assert_eq!(report.sent + report.received + report.replicas, 0);
        part.update_forces().unwrap();
        let step = part.integrate().unwrap();
        assert_eq!(step.subcycled, 0);
        assert!(!part.any_rebuild(false).unwrap());
        assert!(part.any_rebuild(true).unwrap());

        let snap = part.collect_positions_and_tags().unwrap();
        assert_eq!(snap.tags, (0..5).map(Tag).collect::<Vec<_>>());
        let dump = part.collect_state().unwrap();
        assert_eq!(dump.internal_neighbors, vec![(1, 0), (2, 1), (3, 2), (4, 3)]);
    }

    #[test]
    fn partitions_narrower_than_the_neighbor_radius_are_rejected() {
        let mut p = params();
        // ten cuts leave 4R slabs, below a 5R neighbor radius
        p.r_neighbor = 5.0 * R_PARTICLE;
        let pbox = p.periodic_box().unwrap();
        let decomp = Decomposition::uniform(pbox, [10, 1, 1]).unwrap();
        let mut rules = build_rules(&decomp).unwrap();
        let neighbors: Vec<_> = decomp.cells().iter().map(|c| c.neighbors.clone()).collect();
        let ep = MemoryNetwork::connect(&neighbors).unwrap().swap_remove(0);
        let cell = &decomp.cells()[0];

        let mut part = Partition::new(EngineConfig::default());
        part.initialize_system(p).unwrap();
        part.initialize_random(1).unwrap();
        part.initialize_cell_state(cell.extent, Vec::new(), Vec::new())
            .unwrap();
        let fabric =
            Fabric::new(ep.id, ep.channels, rules.swap_remove(0), Box::new(ep.collective)).unwrap();
        part.initialize_cell_comm(fabric).unwrap();
        let err = part
            .initialize_cell_junctions(cell.junctions.clone())
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::Config(ConfigError::OutOfRange {
                name: "partition_width",
                ..
            })
        ));
        assert_eq!(part.stage(), Stage::Failed);
    }

    #[test]
    fn exit_is_terminal() {
        let mut part = lone(row(), ForceMode::Serial);
        part.exit().unwrap();
        assert_eq!(part.stage(), Stage::Exited);
        assert_eq!(
            part.update_forces().unwrap_err(),
            SimError::Stage(StageError::Exited {
                operation: "update_forces"
            })
        );
        assert!(part.exit().is_err());
    }

    #[test]
    fn parallel_mode_builds_a_pool() {
        let mut part = lone(row(), ForceMode::Parallel { threads: Some(2) });
        assert!(part.pool.is_some());
        part.update_neighbors().unwrap();
        part.update_forces().unwrap();
        assert_eq!(part.state().forces().len(), 5);
    }
}
