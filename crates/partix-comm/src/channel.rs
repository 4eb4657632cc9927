//! Transport traits.

use partix_core::{PartitionId, ProtocolError};

/// A point-to-point, blocking, ordered byte transport to one peer.
///
/// Implementations must deliver frames in order and block in
/// [`recv`](Channel::recv) until a frame arrives. [`send`](Channel::send)
/// may block until the peer receives.
pub trait Channel: Send {
    /// The partition at the other end.
    fn peer(&self) -> PartitionId;

    /// Send one frame.
    fn send(&mut self, frame: &[u8]) -> Result<(), ProtocolError>;

    /// Receive the next frame.
    fn recv(&mut self) -> Result<Vec<u8>, ProtocolError>;

    /// Size in bytes of the next frame, blocking until it is available.
    /// The frame is not consumed.
    fn probe_size(&mut self) -> Result<usize, ProtocolError>;
}

/// Operations spanning every partition of a run.
pub trait Collective: Send {
    /// Block until every partition has reached the same call.
    fn barrier(&mut self) -> Result<(), ProtocolError>;

    /// Logical OR of `flag` across every partition.
    fn any(&mut self, flag: bool) -> Result<bool, ProtocolError>;
}

/// A run with a single partition: every collective is trivially local.
#[derive(Clone, Copy, Debug, Default)]
pub struct Solo;

impl Collective for Solo {
    fn barrier(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn any(&mut self, flag: bool) -> Result<bool, ProtocolError> {
        Ok(flag)
    }
}
