//! Handshake message codec.
//!
//! Controllers configure partitions with structured records: the command
//! name, then a sequence of named fields. Every field is preceded by its
//! name so the reader can check alignment as it goes.
//!
//! # Wire format
//!
//! | Item | Encoding |
//! |---|---|
//! | uint | 4 bytes, big-endian |
//! | int | magnitude in bits 0..31, bit 31 set when non-negative |
//! | char array | uint length, then the bytes |
//! | double | char array holding `%.10e` text |
//! | vec | three doubles |
//! | array | uint count, then the elements |
//! | sub-message | char array of the inner message bytes |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod reader;
pub mod writer;

pub use error::MessageError;
pub use reader::MessageReader;
pub use writer::MessageWriter;
