//! Error types for the handshake codec.

use std::error::Error;
use std::fmt;

/// Errors raised while encoding or decoding a handshake message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageError {
    /// The message ended before the item being read.
    Truncated {
        /// Bytes the item needs.
        needed: usize,
        /// Bytes left in the message.
        remaining: usize,
    },
    /// A field name did not match the one expected at this position.
    NameMismatch {
        /// Name the reader expected.
        expected: String,
        /// Name found in the message.
        found: String,
    },
    /// A char array was not valid UTF-8.
    InvalidText,
    /// A double's text could not be parsed.
    InvalidDouble {
        /// The offending text.
        text: String,
    },
    /// An integer cannot be represented on the wire.
    IntOutOfRange {
        /// The value.
        value: i64,
    },
    /// A length does not fit in a wire uint.
    LengthOverflow {
        /// The length.
        len: usize,
    },
    /// Bytes remained after the message was fully read.
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, remaining } => {
                write!(f, "truncated message: need {needed} bytes, {remaining} left")
            }
            Self::NameMismatch { expected, found } => {
                write!(f, "expected field '{expected}', found '{found}'")
            }
            Self::InvalidText => write!(f, "char array is not valid UTF-8"),
            Self::InvalidDouble { text } => write!(f, "invalid double '{text}'"),
            Self::IntOutOfRange { value } => write!(f, "integer {value} not representable"),
            Self::LengthOverflow { len } => write!(f, "length {len} exceeds u32"),
            Self::TrailingBytes { count } => write!(f, "{count} unread bytes after message"),
        }
    }
}

impl Error for MessageError {}
