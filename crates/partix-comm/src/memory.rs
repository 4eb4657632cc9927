//! In-process transport for running several partitions on threads.
//!
//! Channels are crossbeam rendezvous channels (`bounded(0)`): a send
//! blocks until the peer receives, which is the strictest blocking
//! behavior a real transport can show. A run that completes over this
//! transport exercises the schedule's deadlock freedom.
//!
//! Dropping an endpoint disconnects its channels and breaks the shared
//! collective, so peers blocked on it fail instead of hanging.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crossbeam_channel::{Receiver, Sender};
use partix_core::{ConfigError, PartitionId, ProtocolError};

use crate::channel::{Channel, Collective};

/// One end of an in-process link.
pub struct MemoryChannel {
    peer: PartitionId,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    stash: Option<Vec<u8>>,
}

impl MemoryChannel {
    /// A connected pair of channels between `a` and `b`.
    pub fn pair(a: PartitionId, b: PartitionId) -> (MemoryChannel, MemoryChannel) {
        let (a_tx, b_rx) = crossbeam_channel::bounded(0);
        let (b_tx, a_rx) = crossbeam_channel::bounded(0);
        (
            MemoryChannel {
                peer: b,
                tx: a_tx,
                rx: a_rx,
                stash: None,
            },
            MemoryChannel {
                peer: a,
                tx: b_tx,
                rx: b_rx,
                stash: None,
            },
        )
    }
}

impl Channel for MemoryChannel {
    fn peer(&self) -> PartitionId {
        self.peer
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), ProtocolError> {
        self.tx
            .send(frame.to_vec())
            .map_err(|_| ProtocolError::Disconnected { peer: self.peer })
    }

    fn recv(&mut self) -> Result<Vec<u8>, ProtocolError> {
        if let Some(frame) = self.stash.take() {
            return Ok(frame);
        }
        self.rx
            .recv()
            .map_err(|_| ProtocolError::Disconnected { peer: self.peer })
    }

    fn probe_size(&mut self) -> Result<usize, ProtocolError> {
        if self.stash.is_none() {
            let frame = self
                .rx
                .recv()
                .map_err(|_| ProtocolError::Disconnected { peer: self.peer })?;
            self.stash = Some(frame);
        }
        Ok(self.stash.as_ref().map_or(0, Vec::len))
    }
}

// ── Collective ──────────────────────────────────────────────────

struct Round {
    arrived: usize,
    generation: u64,
    acc: bool,
    result: bool,
    departed: Option<PartitionId>,
}

struct Rendezvous {
    size: usize,
    state: Mutex<Round>,
    cond: Condvar,
}

/// Barrier and OR-reduction shared by every endpoint of a
/// [`MemoryNetwork`].
pub struct MemoryCollective {
    id: PartitionId,
    shared: Arc<Rendezvous>,
}

impl MemoryCollective {
    fn lock(&self) -> Result<MutexGuard<'_, Round>, ProtocolError> {
        self.shared.state.lock().map_err(|_| ProtocolError::Transport {
            peer: self.id,
            reason: "collective state poisoned".into(),
        })
    }
}

impl Collective for MemoryCollective {
    fn barrier(&mut self) -> Result<(), ProtocolError> {
        self.any(false).map(|_| ())
    }

    fn any(&mut self, flag: bool) -> Result<bool, ProtocolError> {
        let mut round = self.lock()?;
        if let Some(peer) = round.departed {
            return Err(ProtocolError::Disconnected { peer });
        }
        round.acc |= flag;
        round.arrived += 1;
        if round.arrived == self.shared.size {
            round.result = round.acc;
            round.acc = false;
            round.arrived = 0;
            round.generation = round.generation.wrapping_add(1);
            self.shared.cond.notify_all();
            return Ok(round.result);
        }
        let generation = round.generation;
        loop {
            round = self
                .shared
                .cond
                .wait(round)
                .map_err(|_| ProtocolError::Transport {
                    peer: self.id,
                    reason: "collective state poisoned".into(),
                })?;
            if round.generation != generation {
                return Ok(round.result);
            }
            if let Some(peer) = round.departed {
                return Err(ProtocolError::Disconnected { peer });
            }
        }
    }
}

impl Drop for MemoryCollective {
    fn drop(&mut self) {
        if let Ok(mut round) = self.shared.state.lock() {
            if round.departed.is_none() {
                round.departed = Some(self.id);
            }
            self.shared.cond.notify_all();
        }
    }
}

// ── Network ─────────────────────────────────────────────────────

/// Everything one partition needs to join an in-process run.
pub struct MemoryEndpoint {
    /// Rank of the partition.
    pub id: PartitionId,
    /// Channels in the order of the neighbor list used to build them.
    pub channels: Vec<MemoryChannel>,
    /// Shared barrier and reduction.
    pub collective: MemoryCollective,
}

/// Builder for in-process runs.
pub struct MemoryNetwork;

impl MemoryNetwork {
    /// Wire up one endpoint per partition.
    ///
    /// `neighbors[r]` lists the peers of partition `r`; channel `i` of
    /// endpoint `r` connects to `neighbors[r][i]`. Neighbor lists must be
    /// symmetric.
    pub fn connect(neighbors: &[Vec<PartitionId>]) -> Result<Vec<MemoryEndpoint>, ConfigError> {
        let n = neighbors.len();
        let mut halves: HashMap<(usize, usize), MemoryChannel> = HashMap::new();
        for (a, list) in neighbors.iter().enumerate() {
            for peer in list {
                let b = peer.0 as usize;
                if b >= n || b == a {
                    return Err(ConfigError::UnknownReference {
                        what: "peer partition",
                        index: b,
                        len: n,
                    });
                }
                if !neighbors[b].contains(&PartitionId(a as u32)) {
                    return Err(ConfigError::InvalidParameter {
                        name: "neighbors",
                        reason: format!("{b} is a neighbor of {a} but not the reverse"),
                    });
                }
                if a < b {
                    let (ab, ba) = MemoryChannel::pair(PartitionId(a as u32), PartitionId(b as u32));
                    halves.insert((a, b), ab);
                    halves.insert((b, a), ba);
                }
            }
        }

        let shared = Arc::new(Rendezvous {
            size: n,
            state: Mutex::new(Round {
                arrived: 0,
                generation: 0,
                acc: false,
                result: false,
                departed: None,
            }),
            cond: Condvar::new(),
        });

        let mut endpoints = Vec::with_capacity(n);
        for (a, list) in neighbors.iter().enumerate() {
            let mut channels = Vec::with_capacity(list.len());
            for peer in list {
                let b = peer.0 as usize;
                let half = halves
                    .remove(&(a, b))
                    .ok_or_else(|| ConfigError::InvalidParameter {
                        name: "neighbors",
                        reason: format!("{b} listed twice as a neighbor of {a}"),
                    })?;
                channels.push(half);
            }
            endpoints.push(MemoryEndpoint {
                id: PartitionId(a as u32),
                channels,
                collective: MemoryCollective {
                    id: PartitionId(a as u32),
                    shared: Arc::clone(&shared),
                },
            });
        }
        Ok(endpoints)
    }
}
