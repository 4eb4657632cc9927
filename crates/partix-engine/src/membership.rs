//! Ownership transfer of particles that left the partition.

use partix_comm::{Channel, Fabric};
use partix_core::{ProtocolError, SimError, Tag, TopologyError};
use partix_space::{Extent, JunctionSet};

use crate::discovery::{buffers, buffers_mut, exchange_counts};
use crate::state::{gather, remove_indices, PartitionState};

/// Particles moved by one membership update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Migration {
    /// Particles handed to neighbors.
    pub sent: usize,
    /// Particles taken over from neighbors.
    pub received: usize,
}

/// Hand every internal particle outside `extent` to the neighbor whose
/// cell now contains it, and adopt the particles neighbors hand over.
///
/// Replicas are discarded first. Surviving particles keep their relative
/// order; arrivals are appended in protocol order. A particle outside
/// both this extent and every neighbor's is lost.
pub(crate) fn migrate<C: Channel>(
    state: &mut PartitionState,
    fabric: &mut Fabric<C>,
    extent: &Extent,
    junctions: &JunctionSet,
) -> Result<Migration, SimError> {
    // 1. Forget last cycle's replicas.
    state.truncate_externals();
    // 2. Clear outgoing lists.
    for ch in &mut state.channels {
        ch.send_indices.clear();
    }
    // 3. Annotate leavers.
    let mut leaving = Vec::new();
    for i in 0..state.n_internal {
        let p = state.positions[i];
        if extent.contains(p) {
            continue;
        }
        let cell = junctions
            .find_cell_containing(p)
            .ok_or(TopologyError::LostParticle {
                tag: state.tags[i],
                position: p,
            })?;
        buffers_mut(&mut state.channels, cell.channel)?
            .send_indices
            .push(i as u32);
        leaving.push(i);
    }

    // 4. Counts, then 5. positions and tags.
    exchange_counts(state, fabric)?;
    let n_before = state.positions.len();
    fabric.exchange(
        state,
        |st: &mut PartitionState, ch, port| {
            let indices = &buffers(&st.channels, ch)?.send_indices;
            port.send_vecs(&gather(&st.positions, indices, "send index")?)?;
            Ok::<(), SimError>(())
        },
        |st: &mut PartitionState, ch, port| {
            let got = port.recv_extend_vecs(&mut st.positions)?;
            let expected = buffers(&st.channels, ch)?.recv_len;
            if got != expected {
                return Err(ProtocolError::CountMismatch {
                    peer: port.peer(),
                    expected,
                    found: got,
                }
                .into());
            }
            Ok::<(), SimError>(())
        },
    )?;
    fabric.exchange(
        state,
        |st: &mut PartitionState, ch, port| {
            let indices = &buffers(&st.channels, ch)?.send_indices;
            let tags: Vec<u32> = gather(&st.tags, indices, "send index")?
                .into_iter()
                .map(|t| t.0)
                .collect();
            port.send_u32s(&tags)?;
            Ok::<(), SimError>(())
        },
        |st: &mut PartitionState, ch, port| {
            let tags = port.recv_u32s()?;
            let expected = buffers(&st.channels, ch)?.recv_len;
            if tags.len() != expected {
                return Err(ProtocolError::CountMismatch {
                    peer: port.peer(),
                    expected,
                    found: tags.len(),
                }
                .into());
            }
            st.tags.extend(tags.into_iter().map(Tag));
            Ok::<(), SimError>(())
        },
    )?;
    let received = state.positions.len() - n_before;

    // 6. Drop leavers; 7. arrivals are already appended.
    let sent = remove_indices(&mut state.positions, &mut leaving, "leaving particle")?;
    remove_indices(&mut state.tags, &mut leaving, "leaving particle")?;

    // 8. Resize per-particle buffers.
    state.n_internal = state.positions.len();
    state.resize_aux();

    log::debug!("membership: sent {sent}, received {received}, now {}", state.n_internal);
    Ok(Migration { sent, received })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::state_with;
    use glam::DVec3;
    use partix_comm::MemoryChannel;
    use partix_core::{PartitionId, PeriodicBox, SimError};

    #[test]
    fn lone_partition_keeps_everyone() {
        let pbox = PeriodicBox::new(DVec3::splat(10.0)).unwrap();
        let mut state = state_with(&[DVec3::splat(1.0), DVec3::splat(9.0)]);
        let mut fabric = Fabric::<MemoryChannel>::isolated(PartitionId(0));
        let m = migrate(&mut state, &mut fabric, &Extent::whole(&pbox), &JunctionSet::empty())
            .unwrap();
        assert_eq!(m, Migration::default());
        assert_eq!(state.n_internal(), 2);
    }

    #[test]
    fn particle_outside_every_cell_is_lost() {
        let extent = Extent::new(DVec3::ZERO, DVec3::splat(5.0)).unwrap();
        let mut state = state_with(&[DVec3::splat(1.0), DVec3::new(7.0, 1.0, 1.0)]);
        let mut fabric = Fabric::<MemoryChannel>::isolated(PartitionId(0));
        let err = migrate(&mut state, &mut fabric, &extent, &JunctionSet::empty()).unwrap_err();
        assert_eq!(
            err,
            SimError::Topology(TopologyError::LostParticle {
                tag: Tag(1),
                position: DVec3::new(7.0, 1.0, 1.0),
            })
        );
    }
}
