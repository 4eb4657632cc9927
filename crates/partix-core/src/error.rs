//! Error types for the Partix engine.
//!
//! Organized by the failure class the engine reports: configuration
//! rejected by validation, topology faults during decomposition or
//! migration, protocol faults on a channel, numerical divergence, index
//! capacity faults, and calls made in the wrong lifecycle stage.
//!
//! Every error is fatal for the partition that raised it. [`SimError`]
//! is the umbrella type returned by engine operations.

use std::error::Error;
use std::fmt;

use glam::DVec3;

use crate::id::{PartitionId, RuleTag, Tag};

/// Parameters or inputs rejected by validation.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// A scalar parameter fell outside its accepted range.
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Supplied value.
        value: f64,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// A parameter was structurally invalid (NaN, wrong ordering, etc.).
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// Two parallel inputs had different lengths.
    LengthMismatch {
        /// What was being compared.
        what: &'static str,
        /// Expected length.
        expected: usize,
        /// Length actually supplied.
        found: usize,
    },
    /// The force table does not reach the pair cutoff.
    TableTooShort {
        /// Largest separation the table can interpolate.
        covers: f64,
        /// The pair cutoff that must be covered.
        cutoff: f64,
    },
    /// A rule or junction referred to a channel or cell that is not
    /// configured.
    UnknownReference {
        /// Kind of thing referenced.
        what: &'static str,
        /// Requested index.
        index: usize,
        /// Number of entries available.
        len: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange {
                name,
                value,
                min,
                max,
            } => write!(f, "{name} = {value:e} outside [{min:e}, {max:e}]"),
            Self::InvalidParameter { name, reason } => write!(f, "invalid {name}: {reason}"),
            Self::LengthMismatch {
                what,
                expected,
                found,
            } => write!(f, "{what}: expected {expected} entries, found {found}"),
            Self::TableTooShort { covers, cutoff } => write!(
                f,
                "force table covers separations up to {covers:e}, cutoff is {cutoff:e}"
            ),
            Self::UnknownReference { what, index, len } => {
                write!(f, "{what} {index} does not exist ({len} configured)")
            }
        }
    }
}

impl Error for ConfigError {}

/// Topology faults: the decomposition cannot account for a particle.
#[derive(Clone, Debug, PartialEq)]
pub enum TopologyError {
    /// After wrapping, a particle was not inside any extent the engine
    /// knows about.
    LostParticle {
        /// Particle tag.
        tag: Tag,
        /// Wrapped position.
        position: DVec3,
    },
    /// The particle count cannot be decomposed as requested.
    InvalidDecomposition {
        /// Description of the problem.
        reason: String,
    },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LostParticle { tag, position } => write!(
                f,
                "particle {tag} at ({}, {}, {}) is outside every known extent",
                position.x, position.y, position.z
            ),
            Self::InvalidDecomposition { reason } => write!(f, "invalid decomposition: {reason}"),
        }
    }
}

impl Error for TopologyError {}

/// Faults while exchanging data with a neighboring partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// The underlying transport failed.
    Transport {
        /// Remote partition.
        peer: PartitionId,
        /// Transport-level description.
        reason: String,
    },
    /// The peer hung up.
    Disconnected {
        /// Remote partition.
        peer: PartitionId,
    },
    /// The received message carried a different tag than the rule expects.
    TagMismatch {
        /// Remote partition.
        peer: PartitionId,
        /// Tag the schedule expected.
        expected: RuleTag,
        /// Tag actually received.
        found: RuleTag,
    },
    /// A payload could not be decoded.
    Malformed {
        /// Remote partition.
        peer: PartitionId,
        /// Decoder description.
        reason: String,
    },
    /// The number of items received differs from the announced count.
    CountMismatch {
        /// Remote partition.
        peer: PartitionId,
        /// Announced count.
        expected: usize,
        /// Count actually received.
        found: usize,
    },
    /// A schedule rule carried an instruction code that is neither send
    /// nor receive.
    UnknownInstruction {
        /// Offending code.
        code: i32,
    },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { peer, reason } => write!(f, "transport to {peer} failed: {reason}"),
            Self::Disconnected { peer } => write!(f, "partition {peer} disconnected"),
            Self::TagMismatch {
                peer,
                expected,
                found,
            } => write!(f, "from {peer}: expected tag {expected}, got {found}"),
            Self::Malformed { peer, reason } => write!(f, "malformed payload from {peer}: {reason}"),
            Self::CountMismatch {
                peer,
                expected,
                found,
            } => write!(f, "from {peer}: announced {expected} items, received {found}"),
            Self::UnknownInstruction { code } => write!(f, "unknown protocol instruction {code}"),
        }
    }
}

impl Error for ProtocolError {}

/// Numerical divergence during integration.
#[derive(Clone, Debug, PartialEq)]
pub enum DivergenceError {
    /// A position became non-finite or escaped the box after wrapping.
    PositionEscaped {
        /// Particle tag.
        tag: Tag,
        /// Offending position.
        position: DVec3,
    },
    /// A step's energy change was NaN or infinite, so no subdivision
    /// can bound it.
    NonFiniteEnergy {
        /// Particle tag.
        tag: Tag,
        /// Subdivision count of the attempt that saw it; 1 for the full
        /// step.
        subdivisions: u32,
    },
    /// Subcycling kept doubling until the subdivision count overflowed.
    SubdivisionOverflow {
        /// Particle tag.
        tag: Tag,
        /// Last subdivision count attempted.
        subdivisions: u32,
    },
}

impl fmt::Display for DivergenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PositionEscaped { tag, position } => write!(
                f,
                "particle {tag} diverged to ({}, {}, {})",
                position.x, position.y, position.z
            ),
            Self::NonFiniteEnergy { tag, subdivisions } => write!(
                f,
                "particle {tag}: non-finite energy change at {subdivisions} subdivisions"
            ),
            Self::SubdivisionOverflow { tag, subdivisions } => write!(
                f,
                "particle {tag} still unstable after {subdivisions} subdivisions"
            ),
        }
    }
}

impl Error for DivergenceError {}

/// An index referred past the end of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapacityError {
    /// Index out of range.
    IndexOutOfRange {
        /// Buffer being indexed.
        what: &'static str,
        /// Offending index.
        index: usize,
        /// Buffer length.
        len: usize,
    },
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfRange { what, index, len } => {
                write!(f, "{what}: index {index} out of range (len {len})")
            }
        }
    }
}

impl Error for CapacityError {}

/// An operation was invoked in the wrong lifecycle stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageError {
    /// The partition has not reached the stage this operation requires.
    OutOfOrder {
        /// The operation attempted.
        operation: &'static str,
        /// The stage the operation needs.
        required: &'static str,
        /// The stage the partition is in.
        current: &'static str,
    },
    /// A previous error left the partition unusable.
    Failed {
        /// The operation attempted.
        operation: &'static str,
    },
    /// The partition has exited.
    Exited {
        /// The operation attempted.
        operation: &'static str,
    },
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrder {
                operation,
                required,
                current,
            } => write!(f, "{operation} requires stage {required}, partition is {current}"),
            Self::Failed { operation } => {
                write!(f, "{operation} rejected: partition failed earlier")
            }
            Self::Exited { operation } => write!(f, "{operation} rejected: partition has exited"),
        }
    }
}

impl Error for StageError {}

/// Umbrella error returned by engine operations.
#[derive(Clone, Debug, PartialEq)]
pub enum SimError {
    /// Invalid configuration.
    Config(ConfigError),
    /// Topology fault.
    Topology(TopologyError),
    /// Protocol fault.
    Protocol(ProtocolError),
    /// Numerical divergence.
    Divergence(DivergenceError),
    /// Index capacity fault.
    Capacity(CapacityError),
    /// Lifecycle ordering fault.
    Stage(StageError),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Topology(e) => write!(f, "topology: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Divergence(e) => write!(f, "divergence: {e}"),
            Self::Capacity(e) => write!(f, "capacity: {e}"),
            Self::Stage(e) => write!(f, "stage: {e}"),
        }
    }
}

impl Error for SimError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Topology(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::Divergence(e) => Some(e),
            Self::Capacity(e) => Some(e),
            Self::Stage(e) => Some(e),
        }
    }
}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<TopologyError> for SimError {
    fn from(e: TopologyError) -> Self {
        Self::Topology(e)
    }
}

impl From<ProtocolError> for SimError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<DivergenceError> for SimError {
    fn from(e: DivergenceError) -> Self {
        Self::Divergence(e)
    }
}

impl From<CapacityError> for SimError {
    fn from(e: CapacityError) -> Self {
        Self::Capacity(e)
    }
}

impl From<StageError> for SimError {
    fn from(e: StageError) -> Self {
        Self::Stage(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_error_exposes_source() {
        let err = SimError::from(CapacityError::IndexOutOfRange {
            what: "forces",
            index: 7,
            len: 3,
        });
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "capacity: forces: index 7 out of range (len 3)");
    }

    #[test]
    fn out_of_range_message_names_parameter() {
        let err = ConfigError::OutOfRange {
            name: "temperature",
            value: 5000.0,
            min: 1.0,
            max: 2000.0,
        };
        assert!(err.to_string().starts_with("temperature"));
    }
}
