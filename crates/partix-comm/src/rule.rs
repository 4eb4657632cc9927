//! Protocol instructions.

use std::fmt;

use partix_core::{ChannelIndex, ProtocolError, RuleTag};

/// What one side of a link does in a protocol round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// Run the send action for the channel.
    Send,
    /// Run the receive action for the channel.
    Recv,
}

impl Instruction {
    /// Wire code used by the controller handshake.
    pub fn code(self) -> i32 {
        match self {
            Instruction::Send => 1,
            Instruction::Recv => 2,
        }
    }

    /// Decode a wire code. Anything but 1 or 2 is a protocol violation.
    pub fn from_code(code: i32) -> Result<Self, ProtocolError> {
        match code {
            1 => Ok(Instruction::Send),
            2 => Ok(Instruction::Recv),
            _ => Err(ProtocolError::UnknownInstruction { code }),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Send => write!(f, "send"),
            Instruction::Recv => write!(f, "recv"),
        }
    }
}

/// One step of a partition's protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommRule {
    /// Send or receive.
    pub instruction: Instruction,
    /// Channel the step runs on.
    pub channel: ChannelIndex,
    /// Tag both ends agree on for this step.
    pub tag: RuleTag,
}

impl CommRule {
    /// A send step.
    pub fn send(channel: ChannelIndex, tag: RuleTag) -> Self {
        Self {
            instruction: Instruction::Send,
            channel,
            tag,
        }
    }

    /// A receive step.
    pub fn recv(channel: ChannelIndex, tag: RuleTag) -> Self {
        Self {
            instruction: Instruction::Recv,
            channel,
            tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_codes() {
        assert_eq!(Instruction::from_code(1), Ok(Instruction::Send));
        assert_eq!(Instruction::from_code(2), Ok(Instruction::Recv));
        assert_eq!(
            Instruction::from_code(3),
            Err(ProtocolError::UnknownInstruction { code: 3 })
        );
        assert_eq!(Instruction::Recv.code(), 2);
    }
}
