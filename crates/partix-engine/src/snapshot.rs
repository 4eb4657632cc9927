//! Read-back of partition contents for the controller.

use glam::DVec3;
use partix_core::Tag;
use partix_msg::{MessageError, MessageReader, MessageWriter};

use crate::state::PartitionState;

/// Owned particles of one partition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Positions of owned particles.
    pub positions: Vec<DVec3>,
    /// Tags, parallel to `positions`.
    pub tags: Vec<Tag>,
}

impl Snapshot {
    pub(crate) fn of(state: &PartitionState) -> Self {
        Self {
            positions: state.internal_positions().to_vec(),
            tags: state.tags().to_vec(),
        }
    }

    /// Encode as `positions` and `tags` fields.
    pub fn write(&self, w: &mut MessageWriter) -> Result<(), MessageError> {
        w.field_vecs("positions", &self.positions)?;
        w.field_uints("tags", &tags_out(&self.tags))
    }

    /// Decode what [`write`](Self::write) produced.
    pub fn read(r: &mut MessageReader<'_>) -> Result<Self, MessageError> {
        Ok(Self {
            positions: r.field_vecs("positions")?,
            tags: r.field_uints("tags")?.into_iter().map(Tag).collect(),
        })
    }
}

/// Full debugging view of one partition: positions including replicas,
/// and both pair lists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartitionDump {
    /// Owned particles first, then replicas.
    pub positions: Vec<DVec3>,
    /// Tags of owned particles.
    pub tags: Vec<Tag>,
    /// Number of owned particles.
    pub n_internal: usize,
    /// Internal pairs `(i, j)` with `i > j`.
    pub internal_neighbors: Vec<(u32, u32)>,
    /// External pairs `(internal, replica)`.
    pub external_neighbors: Vec<(u32, u32)>,
}

fn tags_out(tags: &[Tag]) -> Vec<u32> {
    tags.iter().map(|t| t.0).collect()
}

fn flatten(pairs: &[(u32, u32)]) -> Vec<u32> {
    pairs.iter().flat_map(|&(a, b)| [a, b]).collect()
}

// An odd count means the second half of the last pair is missing.
fn unflatten(flat: Vec<u32>) -> Result<Vec<(u32, u32)>, MessageError> {
    if flat.len() % 2 != 0 {
        return Err(MessageError::Truncated {
            needed: flat.len() + 1,
            remaining: flat.len(),
        });
    }
    Ok(flat.chunks_exact(2).map(|c| (c[0], c[1])).collect())
}

impl PartitionDump {
    pub(crate) fn of(state: &PartitionState) -> Self {
        Self {
            positions: state.positions().to_vec(),
            tags: state.tags().to_vec(),
            n_internal: state.n_internal(),
            internal_neighbors: state.internal_neighbors().to_vec(),
            external_neighbors: state.external_neighbors().to_vec(),
        }
    }

    /// Number of replicas.
    pub fn n_external(&self) -> usize {
        self.positions.len() - self.n_internal
    }

    /// Encode as named fields. Pair lists are flattened.
    pub fn write(&self, w: &mut MessageWriter) -> Result<(), MessageError> {
        w.field_uint("n_internal", u32::try_from(self.n_internal).unwrap_or(u32::MAX))?;
        w.field_vecs("positions", &self.positions)?;
        w.field_uints("tags", &tags_out(&self.tags))?;
        w.field_uints("internal_neighbors", &flatten(&self.internal_neighbors))?;
        w.field_uints("external_neighbors", &flatten(&self.external_neighbors))
    }

    /// Decode what [`write`](Self::write) produced.
    pub fn read(r: &mut MessageReader<'_>) -> Result<Self, MessageError> {
        let n_internal = r.field_uint("n_internal")? as usize;
        let positions = r.field_vecs("positions")?;
        let tags = r.field_uints("tags")?.into_iter().map(Tag).collect();
        if n_internal > positions.len() {
            return Err(MessageError::IntOutOfRange {
                value: n_internal as i64,
            });
        }
        let internal_neighbors = unflatten(r.field_uints("internal_neighbors")?)?;
        let external_neighbors = unflatten(r.field_uints("external_neighbors")?)?;
        Ok(Self {
            positions,
            tags,
            n_internal,
            internal_neighbors,
            external_neighbors,
        })
    }
}
