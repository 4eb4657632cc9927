//! Executing the protocol schedule.

use glam::DVec3;
use partix_core::{ChannelIndex, ConfigError, PartitionId, ProtocolError, RuleTag};

use crate::channel::{Channel, Collective, Solo};
use crate::rule::{CommRule, Instruction};
use crate::wire::{self, WireError, U32_BYTES};

/// Handle given to send and receive actions for a single protocol step.
///
/// Every frame carries the step's tag in a 4-byte header; received
/// frames with a different tag are rejected.
pub struct Port<'a, C: Channel> {
    channel: &'a mut C,
    tag: RuleTag,
}

impl<'a, C: Channel> Port<'a, C> {
    /// Wrap a channel for one step tagged `tag`.
    pub fn new(channel: &'a mut C, tag: RuleTag) -> Self {
        Self { channel, tag }
    }

    /// The partition at the other end.
    pub fn peer(&self) -> PartitionId {
        self.channel.peer()
    }

    /// Tag of the current step.
    pub fn tag(&self) -> RuleTag {
        self.tag
    }

    fn malformed(&self, e: WireError) -> ProtocolError {
        ProtocolError::Malformed {
            peer: self.peer(),
            reason: e.to_string(),
        }
    }

    /// Send a raw payload.
    pub fn send_bytes(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        let mut frame = Vec::with_capacity(U32_BYTES + payload.len());
        wire::put_u32(&mut frame, self.tag.0);
        frame.extend_from_slice(payload);
        self.channel.send(&frame)
    }

    /// Receive a raw payload, checking the tag.
    pub fn recv_bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let mut frame = self.channel.recv()?;
        if frame.len() < U32_BYTES {
            return Err(ProtocolError::Malformed {
                peer: self.peer(),
                reason: format!("frame of {} bytes has no tag header", frame.len()),
            });
        }
        let found = RuleTag(u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]));
        if found != self.tag {
            return Err(ProtocolError::TagMismatch {
                peer: self.peer(),
                expected: self.tag,
                found,
            });
        }
        frame.drain(..U32_BYTES);
        Ok(frame)
    }

    /// Size of the next payload without consuming it.
    pub fn probe_len(&mut self) -> Result<usize, ProtocolError> {
        Ok(self.channel.probe_size()?.saturating_sub(U32_BYTES))
    }

    /// Send a single count.
    pub fn send_count(&mut self, n: usize) -> Result<(), ProtocolError> {
        let n = u32::try_from(n).map_err(|_| ProtocolError::Malformed {
            peer: self.peer(),
            reason: format!("count {n} exceeds u32"),
        })?;
        self.send_bytes(&n.to_le_bytes())
    }

    /// Receive a single count.
    pub fn recv_count(&mut self) -> Result<usize, ProtocolError> {
        let values = self.recv_u32s()?;
        match values.as_slice() {
            [n] => Ok(*n as usize),
            _ => Err(ProtocolError::CountMismatch {
                peer: self.peer(),
                expected: 1,
                found: values.len(),
            }),
        }
    }

    /// Send a sequence of u32.
    pub fn send_u32s(&mut self, values: &[u32]) -> Result<(), ProtocolError> {
        self.send_bytes(&wire::encode_u32s(values.iter().copied()))
    }

    /// Receive a sequence of u32.
    pub fn recv_u32s(&mut self) -> Result<Vec<u32>, ProtocolError> {
        let bytes = self.recv_bytes()?;
        wire::decode_u32s(&bytes).map_err(|e| self.malformed(e))
    }

    /// Send a sequence of vectors.
    pub fn send_vecs(&mut self, values: &[DVec3]) -> Result<(), ProtocolError> {
        self.send_bytes(&wire::encode_vecs(values.iter().copied()))
    }

    /// Receive vectors and append them to `out`. Returns how many arrived.
    pub fn recv_extend_vecs(&mut self, out: &mut Vec<DVec3>) -> Result<usize, ProtocolError> {
        let bytes = self.recv_bytes()?;
        wire::decode_vecs_into(&bytes, out).map_err(|e| self.malformed(e))
    }

    /// Receive exactly `out.len()` vectors into `out`.
    pub fn recv_vecs_into(&mut self, out: &mut [DVec3]) -> Result<(), ProtocolError> {
        let bytes = self.recv_bytes()?;
        let n = wire::decode_vecs_to_slice(&bytes, out).map_err(|e| self.malformed(e))?;
        if n != out.len() {
            return Err(ProtocolError::CountMismatch {
                peer: self.peer(),
                expected: out.len(),
                found: n,
            });
        }
        Ok(())
    }
}

/// One partition's view of the communication fabric: a channel per
/// neighbor, the ordered protocol rules, and the run-wide collective.
pub struct Fabric<C: Channel> {
    id: PartitionId,
    channels: Vec<C>,
    rules: Vec<CommRule>,
    collective: Box<dyn Collective>,
}

impl<C: Channel> Fabric<C> {
    /// Assemble a fabric. Every rule must name an existing channel.
    pub fn new(
        id: PartitionId,
        channels: Vec<C>,
        rules: Vec<CommRule>,
        collective: Box<dyn Collective>,
    ) -> Result<Self, ConfigError> {
        for rule in &rules {
            if rule.channel.index() >= channels.len() {
                return Err(ConfigError::UnknownReference {
                    what: "channel",
                    index: rule.channel.index(),
                    len: channels.len(),
                });
            }
        }
        log::info!(
            "partition {id}: {} channels, {} communication rules",
            channels.len(),
            rules.len()
        );
        Ok(Self {
            id,
            channels,
            rules,
            collective,
        })
    }

    /// A fabric for a partition that is alone in the run.
    pub fn isolated(id: PartitionId) -> Self {
        Self {
            id,
            channels: Vec::new(),
            rules: Vec::new(),
            collective: Box::new(Solo),
        }
    }

    /// This partition's rank.
    pub fn id(&self) -> PartitionId {
        self.id
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Peer on channel `ch`.
    pub fn peer(&self, ch: ChannelIndex) -> Option<PartitionId> {
        self.channels.get(ch.index()).map(|c| c.peer())
    }

    /// The ordered rules.
    pub fn rules(&self) -> &[CommRule] {
        &self.rules
    }

    /// Run-wide barrier.
    pub fn barrier(&mut self) -> Result<(), ProtocolError> {
        self.collective.barrier()
    }

    /// Run-wide logical OR.
    pub fn any(&mut self, flag: bool) -> Result<bool, ProtocolError> {
        self.collective.any(flag)
    }

    /// Run one protocol step: a barrier, then every rule in order.
    ///
    /// `send` runs for each send rule and `recv` for each receive rule,
    /// both with mutable access to `ctx`. The first error aborts the step;
    /// the fabric must not be used again afterwards, since peers may be
    /// blocked mid-step.
    pub fn exchange<T, E, S, R>(&mut self, ctx: &mut T, mut send: S, mut recv: R) -> Result<(), E>
    where
        E: From<ProtocolError>,
        S: FnMut(&mut T, ChannelIndex, &mut Port<'_, C>) -> Result<(), E>,
        R: FnMut(&mut T, ChannelIndex, &mut Port<'_, C>) -> Result<(), E>,
    {
        self.collective.barrier()?;
        for rule in &self.rules {
            let channel = &mut self.channels[rule.channel.index()];
            let mut port = Port::new(channel, rule.tag);
            match rule.instruction {
                Instruction::Send => send(ctx, rule.channel, &mut port)?,
                Instruction::Recv => recv(ctx, rule.channel, &mut port)?,
            }
        }
        Ok(())
    }
}

impl<C: Channel> std::fmt::Debug for Fabric<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fabric")
            .field("id", &self.id)
            .field("channels", &self.channels.len())
            .field("rules", &self.rules)
            .finish()
    }
}
