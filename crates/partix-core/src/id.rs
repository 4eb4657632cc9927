//! Strongly-typed identifiers.

use std::fmt;

/// Identifies a partition (one spatial cell and the compute unit owning it).
///
/// Partitions are ranked in lexicographic order of their grid index, so
/// `PartitionId(n)` is the n-th partition of a decomposition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId(pub u32);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PartitionId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Index of a channel within one partition's channel table.
///
/// Each neighboring partition gets exactly one channel; per-channel
/// buffers are stored in vectors indexed by this value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelIndex(pub u32);

impl ChannelIndex {
    /// The index as a `usize`, for slice access.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ChannelIndex {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Stable identity of a particle across migrations.
///
/// Used only for bookkeeping and tracing; the engine addresses particles
/// by index everywhere else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u32);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for Tag {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Message tag agreed between the two ends of one protocol step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleTag(pub u32);

impl fmt::Display for RuleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RuleTag {
    fn from(v: u32) -> Self {
        Self(v)
    }
}
