//! Per-partition particle storage.
//!
//! Positions and tags keep the owned particles as a contiguous prefix
//! of length `n_internal`; replicas received from neighbors follow. The
//! replica suffix is discarded and rebuilt every rebuild cycle. Forces,
//! displacements, Gaussian draws and scratch positions are sized to the
//! internal prefix only.

use glam::DVec3;
use partix_core::{CapacityError, ConfigError, Tag};

use crate::neighbor::Adjacency;

/// Exchange bookkeeping for one channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelBuffers {
    /// Internal indices sent to the peer, ascending.
    pub(crate) send_indices: Vec<u32>,
    /// Replicas announced by the peer for the current round.
    pub(crate) recv_len: usize,
    /// Where this channel's replicas start in the position container.
    pub(crate) ext_offset: usize,
    /// Positions in the peer's send list whose replicas nobody here uses.
    pub(crate) remove_indices: Vec<u32>,
    /// Gathered outgoing positions.
    pub(crate) send_positions: Vec<DVec3>,
}

impl ChannelBuffers {
    /// Internal indices replicated to this channel's peer.
    pub fn send_indices(&self) -> &[u32] {
        &self.send_indices
    }

    /// Number of replicas received from the peer.
    pub fn recv_len(&self) -> usize {
        self.recv_len
    }

    /// Offset of the peer's replicas in the position container.
    pub fn ext_offset(&self) -> usize {
        self.ext_offset
    }
}

/// Everything a partition knows about its particles.
#[derive(Clone, Debug, Default)]
pub struct PartitionState {
    pub(crate) positions: Vec<DVec3>,
    pub(crate) tags: Vec<Tag>,
    pub(crate) n_internal: usize,
    pub(crate) forces: Vec<DVec3>,
    pub(crate) nl_displace: Vec<DVec3>,
    pub(crate) new_positions: Vec<DVec3>,
    /// Unit Gaussian draws for the next step.
    pub(crate) gauss: Vec<DVec3>,
    pub(crate) channels: Vec<ChannelBuffers>,
    pub(crate) internal: Vec<(u32, u32)>,
    pub(crate) external: Vec<(u32, u32)>,
    pub(crate) adjacency: Adjacency,
    /// Replayable unit draws of the particle being subcycled.
    pub(crate) history: Vec<DVec3>,
}

impl PartitionState {
    /// A state owning `positions`, tagged by `tags`.
    pub fn new(positions: Vec<DVec3>, tags: Vec<Tag>) -> Result<Self, ConfigError> {
        if positions.len() != tags.len() {
            return Err(ConfigError::LengthMismatch {
                what: "tags",
                expected: positions.len(),
                found: tags.len(),
            });
        }
        if positions.len() > u32::MAX as usize {
            return Err(ConfigError::InvalidParameter {
                name: "positions",
                reason: format!("{} particles exceed the index range", positions.len()),
            });
        }
        let mut state = Self {
            n_internal: positions.len(),
            positions,
            tags,
            ..Self::default()
        };
        state.resize_aux();
        Ok(state)
    }

    /// Number of owned particles.
    pub fn n_internal(&self) -> usize {
        self.n_internal
    }

    /// Number of replicas currently held.
    pub fn n_external(&self) -> usize {
        self.positions.len() - self.n_internal
    }

    /// Owned positions followed by replica positions.
    pub fn positions(&self) -> &[DVec3] {
        &self.positions
    }

    /// Owned positions.
    pub fn internal_positions(&self) -> &[DVec3] {
        &self.positions[..self.n_internal]
    }

    /// Tags of owned particles.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Forces on owned particles from the last evaluation.
    pub fn forces(&self) -> &[DVec3] {
        &self.forces
    }

    /// Displacement of each owned particle since the last rebuild.
    pub fn displacements(&self) -> &[DVec3] {
        &self.nl_displace
    }

    /// Internal pairs `(larger, smaller)`, sorted.
    pub fn internal_neighbors(&self) -> &[(u32, u32)] {
        &self.internal
    }

    /// Internal-replica pairs `(internal, external)`, sorted.
    pub fn external_neighbors(&self) -> &[(u32, u32)] {
        &self.external
    }

    /// Per-channel exchange bookkeeping.
    pub fn channels(&self) -> &[ChannelBuffers] {
        &self.channels
    }

    /// Per-particle adjacency derived from both pair lists.
    pub fn adjacency(&self) -> &Adjacency {
        &self.adjacency
    }

    pub(crate) fn ensure_channels(&mut self, n: usize) {
        self.channels.resize_with(n, ChannelBuffers::default);
    }

    /// Drop every replica.
    pub(crate) fn truncate_externals(&mut self) {
        self.positions.truncate(self.n_internal);
        self.tags.truncate(self.n_internal);
    }

    /// Size per-particle buffers to the internal count. New entries are zero.
    pub(crate) fn resize_aux(&mut self) {
        let n = self.n_internal;
        self.forces.resize(n, DVec3::ZERO);
        self.nl_displace.resize(n, DVec3::ZERO);
        self.new_positions.resize(n, DVec3::ZERO);
        self.gauss.resize(n, DVec3::ZERO);
    }

    pub(crate) fn reset_displacement(&mut self) {
        self.nl_displace.fill(DVec3::ZERO);
    }

    /// Fill every channel's outgoing buffer from its send indices.
    pub(crate) fn gather_send_positions(&mut self) -> Result<(), CapacityError> {
        let positions = &self.positions[..self.n_internal];
        for ch in &mut self.channels {
            ch.send_positions.clear();
            for &i in &ch.send_indices {
                let p = positions
                    .get(i as usize)
                    .ok_or(CapacityError::IndexOutOfRange {
                        what: "send index",
                        index: i as usize,
                        len: positions.len(),
                    })?;
                ch.send_positions.push(*p);
            }
        }
        Ok(())
    }
}

/// Gather `values[i]` for every index, bounds-checked.
pub(crate) fn gather<T: Copy>(
    values: &[T],
    indices: &[u32],
    what: &'static str,
) -> Result<Vec<T>, CapacityError> {
    indices
        .iter()
        .map(|&i| {
            values
                .get(i as usize)
                .copied()
                .ok_or(CapacityError::IndexOutOfRange {
                    what,
                    index: i as usize,
                    len: values.len(),
                })
        })
        .collect()
}

/// Remove the elements at `indices` from `v`, keeping the order of the
/// rest. `indices` is sorted and deduplicated in place. Returns how many
/// elements were removed.
pub(crate) fn remove_indices<T>(
    v: &mut Vec<T>,
    indices: &mut Vec<usize>,
    what: &'static str,
) -> Result<usize, CapacityError> {
    indices.sort_unstable();
    indices.dedup();
    if let Some(&last) = indices.last() {
        if last >= v.len() {
            return Err(CapacityError::IndexOutOfRange {
                what,
                index: last,
                len: v.len(),
            });
        }
    }
    let mut doomed = indices.iter().copied().peekable();
    let mut k = 0usize;
    v.retain(|_| {
        let drop = doomed.peek() == Some(&k);
        if drop {
            doomed.next();
        }
        k += 1;
        !drop
    });
    Ok(indices.len())
}
