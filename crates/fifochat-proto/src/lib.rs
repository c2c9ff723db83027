//! # fifochat-proto
//!
//! Wire protocol codec and shared types for the fifochat relay.
//!
//! This crate is transport-independent: it knows how to frame and parse the
//! line protocols carried over the FIFOs, but nothing about FIFOs themselves.
//! It provides:
//! - `PeerId` for identifying peer processes
//! - `Envelope` encoding/decoding for the `[pid]-text` chat protocol
//! - The bare-integer report line codec and the `reportar` command grammar
//! - `LineBuffer` for reassembling lines across partial reads

mod envelope;
mod error;
mod line_buffer;
mod peer_id;
mod report;

pub use envelope::Envelope;
pub use error::DecodeError;
pub use line_buffer::LineBuffer;
pub use peer_id::PeerId;
pub use report::{ReportCommand, decode_report, encode_report, parse_report_command};
