//! Replica discovery, refresh and pruning.
//!
//! Every internal particle within junction range of a neighbor is
//! replicated there. Each channel's send list fixes the order of the
//! replicas its peer holds, so the peer can later refer to them by
//! position in that list: after the pair lists are built, every replica
//! that no pair uses is named back to its owner, which drops it from
//! the send list. From then on, each force update only ships the
//! positions that matter.

use glam::DVec3;
use partix_comm::{Channel, Fabric};
use partix_core::{CapacityError, ChannelIndex, PeriodicBox, ProtocolError, SimError};
use partix_space::{Extent, JunctionSet};

use crate::neighbor::build_external;
use crate::state::{gather, remove_indices, ChannelBuffers, PartitionState};

pub(crate) fn buffers(
    channels: &[ChannelBuffers],
    ch: ChannelIndex,
) -> Result<&ChannelBuffers, CapacityError> {
    channels.get(ch.index()).ok_or(CapacityError::IndexOutOfRange {
        what: "channel",
        index: ch.index(),
        len: channels.len(),
    })
}

pub(crate) fn buffers_mut(
    channels: &mut [ChannelBuffers],
    ch: ChannelIndex,
) -> Result<&mut ChannelBuffers, CapacityError> {
    let len = channels.len();
    channels
        .get_mut(ch.index())
        .ok_or(CapacityError::IndexOutOfRange {
            what: "channel",
            index: ch.index(),
            len,
        })
}

/// Tell every peer how many elements follow, and learn how many it
/// will send. The peer's count lands in `recv_len`.
pub(crate) fn exchange_counts<C: Channel>(
    state: &mut PartitionState,
    fabric: &mut Fabric<C>,
) -> Result<(), SimError> {
    fabric.exchange(
        state,
        |st: &mut PartitionState, ch, port| {
            let n = buffers(&st.channels, ch)?.send_indices.len();
            port.send_count(n)?;
            Ok::<(), SimError>(())
        },
        |st: &mut PartitionState, ch, port| {
            buffers_mut(&mut st.channels, ch)?.recv_len = port.recv_count()?;
            Ok::<(), SimError>(())
        },
    )
}

/// Send the positions named by each channel's send list and append the
/// peers' positions to the container, recording where each channel's
/// replicas start.
pub(crate) fn exchange_new_replicas<C: Channel>(
    state: &mut PartitionState,
    fabric: &mut Fabric<C>,
) -> Result<usize, SimError> {
    let before = state.positions.len();
    fabric.exchange(
        state,
        |st: &mut PartitionState, ch, port| {
            let indices = &buffers(&st.channels, ch)?.send_indices;
            let out = gather(&st.positions[..st.n_internal], indices, "send index")?;
            port.send_vecs(&out)?;
            Ok::<(), SimError>(())
        },
        |st: &mut PartitionState, ch, port| {
            let offset = st.positions.len();
            let got = port.recv_extend_vecs(&mut st.positions)?;
            let buf = buffers_mut(&mut st.channels, ch)?;
            buf.ext_offset = offset;
            if got != buf.recv_len {
                return Err(ProtocolError::CountMismatch {
                    peer: port.peer(),
                    expected: buf.recv_len,
                    found: got,
                }
                .into());
            }
            Ok::<(), SimError>(())
        },
    )?;
    Ok(state.positions.len() - before)
}

/// Replicate boundary particles to every neighbor whose junction they
/// satisfy. Returns the number of replicas received.
pub(crate) fn discover<C: Channel>(
    state: &mut PartitionState,
    fabric: &mut Fabric<C>,
    extent: &Extent,
    junctions: &JunctionSet,
    pbox: &PeriodicBox,
    r_neighbor: f64,
) -> Result<usize, SimError> {
    state.truncate_externals();
    for ch in &mut state.channels {
        ch.send_indices.clear();
    }
    for i in 0..state.n_internal {
        let p = state.positions[i];
        for ch in junctions.destinations(p, extent, pbox, r_neighbor) {
            buffers_mut(&mut state.channels, ch)?
                .send_indices
                .push(i as u32);
        }
    }
    exchange_counts(state, fabric)?;
    exchange_new_replicas(state, fabric)
}

/// Drop replicas that no external pair uses, on both ends of every
/// channel, then rebuild the external list against the survivors.
/// Returns how many replicas were dropped here.
pub(crate) fn prune<C: Channel>(
    state: &mut PartitionState,
    fabric: &mut Fabric<C>,
    pbox: &PeriodicBox,
    r_neighbor_sqr: f64,
) -> Result<usize, SimError> {
    let n_internal = state.n_internal;
    let mut uses = vec![0u32; state.n_external()];
    for &(_, e) in &state.external {
        if let Some(u) = (e as usize)
            .checked_sub(n_internal)
            .and_then(|k| uses.get_mut(k))
        {
            *u += 1;
        }
    }

    let mut pruned = 0;
    for ch in &mut state.channels {
        ch.remove_indices.clear();
        let start = ch.ext_offset.saturating_sub(n_internal);
        for k in 0..ch.recv_len {
            if uses.get(start + k) == Some(&0) {
                ch.remove_indices.push(k as u32);
            }
        }
        pruned += ch.remove_indices.len();
    }

    fabric.exchange(
        state,
        |st: &mut PartitionState, ch, port| {
            port.send_u32s(&buffers(&st.channels, ch)?.remove_indices)?;
            Ok::<(), SimError>(())
        },
        |st: &mut PartitionState, ch, port| {
            let mut doomed: Vec<usize> =
                port.recv_u32s()?.into_iter().map(|k| k as usize).collect();
            let buf = buffers_mut(&mut st.channels, ch)?;
            remove_indices(&mut buf.send_indices, &mut doomed, "remove index")?;
            Ok::<(), SimError>(())
        },
    )?;

    state.truncate_externals();
    exchange_counts(state, fabric)?;
    exchange_new_replicas(state, fabric)?;
    build_external(
        &state.positions,
        n_internal,
        pbox,
        r_neighbor_sqr,
        &mut state.external,
    );
    for ch in &mut state.channels {
        ch.remove_indices.clear();
    }
    Ok(pruned)
}

struct Refresh<'a> {
    channels: &'a mut [ChannelBuffers],
    replicas: &'a mut [DVec3],
    n_internal: usize,
}

/// Ship fresh positions of already-replicated particles and overwrite
/// the replica suffix in place. Outgoing positions must already be
/// gathered into each channel's `send_positions`.
///
/// `replicas` is the container past the internal prefix.
pub(crate) fn refresh_replicas<C: Channel>(
    fabric: &mut Fabric<C>,
    channels: &mut [ChannelBuffers],
    replicas: &mut [DVec3],
    n_internal: usize,
) -> Result<(), SimError> {
    let mut ctx = Refresh {
        channels,
        replicas,
        n_internal,
    };
    fabric.exchange(
        &mut ctx,
        |ctx: &mut Refresh<'_>, ch, port| {
            port.send_vecs(&buffers(ctx.channels, ch)?.send_positions)?;
            Ok::<(), SimError>(())
        },
        |ctx: &mut Refresh<'_>, ch, port| {
            let buf = buffers(ctx.channels, ch)?;
            let start = buf.ext_offset.saturating_sub(ctx.n_internal);
            let end = start + buf.recv_len;
            let len = ctx.replicas.len();
            let slot = ctx
                .replicas
                .get_mut(start..end)
                .ok_or(CapacityError::IndexOutOfRange {
                    what: "replica",
                    index: end,
                    len,
                })?;
            port.recv_vecs_into(slot)?;
            Ok::<(), SimError>(())
        },
    )
}
