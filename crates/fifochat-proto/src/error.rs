//! Decode errors for the wire protocols.

use thiserror::Error;

/// Reasons a protocol line can be rejected.
///
/// Rejection is always side-effect free: the caller logs and drops the line,
/// nothing is sent back to the writer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No `[` in the line, or no `]` following it.
    #[error("missing sender frame brackets")]
    MissingFrame,

    /// The `[...]` sender field is empty.
    #[error("empty sender field")]
    EmptySender,

    /// The sender field is not a positive integer with digits only.
    #[error("invalid sender field: {0:?}")]
    InvalidSender(String),

    /// No `-` separator after the closing bracket.
    #[error("missing `-` separator after sender field")]
    MissingSeparator,

    /// A report line is not a bare positive integer.
    #[error("invalid report target: {0:?}")]
    InvalidReportTarget(String),
}
