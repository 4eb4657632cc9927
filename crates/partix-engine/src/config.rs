//! System parameters, engine options and their validation.
//!
//! [`SystemParams`] describes the physics of a run and is identical on
//! every partition. [`validate()`](SystemParams::validate) checks the
//! structural invariants the engine relies on; the handshake decoder
//! additionally applies the controller protocol's physical ranges via
//! [`check_physical_ranges()`](SystemParams::check_physical_ranges).
//! [`EngineConfig`] holds per-process execution choices that do not
//! affect results.

use glam::DVec3;
use partix_core::units::{KB, NS, PS, R_PARTICLE};
use partix_core::{ConfigError, PeriodicBox};

// ── InterpTable ────────────────────────────────────────────────────

/// A uniformly sampled scalar function, linearly interpolated.
///
/// The pair force table stores force magnitude divided by separation,
/// so multiplying a sample by the separation vector yields the force.
#[derive(Clone, Debug, PartialEq)]
pub struct InterpTable {
    x_min: f64,
    x_prec: f64,
    values: Vec<f64>,
}

impl InterpTable {
    /// Create a table sampled at `x_min + i * x_prec`.
    pub fn new(x_min: f64, x_prec: f64, values: Vec<f64>) -> Result<Self, ConfigError> {
        if !x_min.is_finite() || x_min < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "x_min",
                reason: format!("must be finite and non-negative, got {x_min}"),
            });
        }
        if !x_prec.is_finite() || x_prec <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "x_prec",
                reason: format!("must be finite and positive, got {x_prec}"),
            });
        }
        if values.len() < 2 {
            return Err(ConfigError::LengthMismatch {
                what: "interpolation table",
                expected: 2,
                found: values.len(),
            });
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "table",
                reason: format!("sample {i} is not finite"),
            });
        }
        Ok(Self {
            x_min,
            x_prec,
            values,
        })
    }

    /// Sample a function on `n` points from `x_min` with spacing `x_prec`.
    pub fn sample<F: Fn(f64) -> f64>(
        x_min: f64,
        x_prec: f64,
        n: usize,
        f: F,
    ) -> Result<Self, ConfigError> {
        let values = (0..n).map(|i| f(x_min + x_prec * i as f64)).collect();
        Self::new(x_min, x_prec, values)
    }

    /// First abscissa.
    pub fn x_min(&self) -> f64 {
        self.x_min
    }

    /// Sample spacing.
    pub fn x_prec(&self) -> f64 {
        self.x_prec
    }

    /// Last abscissa.
    pub fn x_max(&self) -> f64 {
        self.x_min + self.x_prec * (self.values.len() - 1) as f64
    }

    /// Raw samples.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Interpolated value at `x`, clamped to the sampled range.
    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        let last = self.values.len() - 1;
        let k = ((x - self.x_min) / self.x_prec).clamp(0.0, last as f64);
        let i = (k as usize).min(last - 1);
        let w = k - i as f64;
        self.values[i] * (1.0 - w) + self.values[i + 1] * w
    }
}

// ── SystemParams ───────────────────────────────────────────────────

/// Physics of a run. All values in SI units.
#[derive(Clone, Debug, PartialEq)]
pub struct SystemParams {
    /// Periodic box edge lengths (m).
    pub box_size: DVec3,
    /// Temperature (K).
    pub temperature: f64,
    /// Integration time step (s).
    pub dt: f64,
    /// Largest potential energy change a single step may imply (J).
    pub du_max: f64,
    /// Friction coefficient γ (kg/s).
    pub friction: f64,
    /// Integration steps between force-list rebuild opportunities.
    pub force_update_rate: u32,
    /// Separation beyond which pair forces vanish (m).
    pub r_pair_cutoff: f64,
    /// Neighbor-list and replication radius (m).
    pub r_neighbor: f64,
    /// Pair potential (J) against separation. Kept for diagnostics.
    pub pair_potential: InterpTable,
    /// Pair force over separation (N/m) against separation.
    pub pair_force: InterpTable,
}

fn positive(name: &'static str, v: f64) -> Result<(), ConfigError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("must be finite and positive, got {v}"),
        })
    }
}

fn within(name: &'static str, v: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if v.is_finite() && v >= min && v <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value: v,
            min,
            max,
        })
    }
}

impl SystemParams {
    /// Check the structural invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. Box must be a real box.
        PeriodicBox::new(self.box_size)?;
        // 2. Scalars finite and positive.
        positive("temperature", self.temperature)?;
        positive("dt", self.dt)?;
        positive("du_max", self.du_max)?;
        positive("friction", self.friction)?;
        positive("r_pair_cutoff", self.r_pair_cutoff)?;
        positive("r_neighbor", self.r_neighbor)?;
        if self.force_update_rate == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "force_update_rate",
                reason: "must be at least 1".into(),
            });
        }
        // 3. The neighbor radius is the cutoff plus a skin.
        if self.r_neighbor < self.r_pair_cutoff {
            return Err(ConfigError::InvalidParameter {
                name: "r_neighbor",
                reason: format!(
                    "{:e} is below the pair cutoff {:e}",
                    self.r_neighbor, self.r_pair_cutoff
                ),
            });
        }
        // 4. Minimum image is only exact within half a box.
        let half = self.box_size.min_element() * 0.5;
        if self.r_neighbor > half {
            return Err(ConfigError::OutOfRange {
                name: "r_neighbor",
                value: self.r_neighbor,
                min: self.r_pair_cutoff,
                max: half,
            });
        }
        // 5. The force table must be usable at every separation a pair can have.
        if self.pair_force.x_max() < self.r_pair_cutoff {
            return Err(ConfigError::TableTooShort {
                covers: self.pair_force.x_max(),
                cutoff: self.r_pair_cutoff,
            });
        }
        Ok(())
    }

    /// Ranges accepted by the controller protocol, in units of the
    /// reference particle radius and `kT`.
    pub fn check_physical_ranges(&self) -> Result<(), ConfigError> {
        let r = R_PARTICLE;
        for v in self.box_size.to_array() {
            within("box_size", v, 2.0 * r, 1e5 * r)?;
        }
        within("T", self.temperature, 1.0, 2000.0)?;
        within("dt", self.dt, PS, 1000.0 * NS)?;
        let kt = self.kt();
        within("dU_max", self.du_max, 1e-3 * kt, 200.0 * kt)?;
        within("fric_gamma", self.friction, 1e-14, 1e-8)?;
        within("force_update", self.force_update_rate as f64, 1.0, 1000.0)?;
        within("r_pair_cutoff", self.r_pair_cutoff, 2.0 * r, 5.0 * r)?;
        within("r_neighbor", self.r_neighbor, 2.0 * r, 10.0 * r)?;
        for t in [&self.pair_potential, &self.pair_force] {
            within("x_min", t.x_min(), 0.0, f64::MAX)?;
            within("x_prec", t.x_prec(), 0.0, f64::MAX)?;
        }
        Ok(())
    }

    /// Thermal energy `kB·T` (J).
    pub fn kt(&self) -> f64 {
        KB * self.temperature
    }

    /// The periodic box.
    pub fn periodic_box(&self) -> Result<PeriodicBox, ConfigError> {
        PeriodicBox::new(self.box_size)
    }

    /// `r_neighbor²`.
    pub fn r_neighbor_sqr(&self) -> f64 {
        self.r_neighbor * self.r_neighbor
    }

    /// `r_pair_cutoff²`.
    pub fn r_pair_cutoff_sqr(&self) -> f64 {
        self.r_pair_cutoff * self.r_pair_cutoff
    }

    /// Squared displacement after which the neighbor lists may be stale:
    /// half the skin, squared.
    pub fn rebuild_threshold_sqr(&self) -> f64 {
        let half_skin = (self.r_neighbor - self.r_pair_cutoff) / 2.0;
        half_skin * half_skin
    }
}

// ── EngineConfig ───────────────────────────────────────────────────

/// How a partition evaluates forces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForceMode {
    /// Exchange replica positions, then walk both pair lists.
    #[default]
    Serial,
    /// Exchange replica positions on a second thread while internal
    /// forces are evaluated; join before external forces.
    Overlapped,
    /// Evaluate per particle over the adjacency table on a worker pool.
    Parallel {
        /// Worker count. `None` = auto-detect.
        threads: Option<usize>,
    },
}

/// Per-process execution options. Results do not depend on them beyond
/// floating-point summation order.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    /// Force evaluation strategy.
    pub force_mode: ForceMode,
}

impl EngineConfig {
    /// Resolve the worker count for [`ForceMode::Parallel`].
    ///
    /// Explicit values are clamped to `[1, 64]`; auto-detection uses the
    /// available parallelism clamped to the same range. Other modes use
    /// a single thread.
    pub fn resolved_threads(&self) -> usize {
        match self.force_mode {
            ForceMode::Parallel { threads: Some(n) } => n.clamp(1, 64),
            ForceMode::Parallel { threads: None } => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .clamp(1, 64),
            ForceMode::Serial | ForceMode::Overlapped => 1,
        }
    }
}
