//! SI unit constants used by the controller protocol's range checks.

/// Boltzmann constant (J/K).
pub const KB: f64 = 1.38e-23;
/// One nanometer (m).
pub const NM: f64 = 1e-9;
/// One picosecond (s).
pub const PS: f64 = 1e-12;
/// One nanosecond (s).
pub const NS: f64 = 1e-9;
/// One piconewton (N).
pub const PN: f64 = 1e-12;
/// Reference particle radius (m). Physical ranges are expressed in it.
pub const R_PARTICLE: f64 = 0.5 * 135.0 * NM;
