//! Error types for the relay loops.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the broker, moderator, and peer loops.
///
/// Only startup and channel-lifecycle failures reach this type; per-line
/// protocol problems and broken peers are handled inside the loops (logged,
/// dropped, or pruned) and never bubble up.
#[derive(Debug, Error)]
pub enum Error {
    /// A required FIFO could not be created.
    #[error("failed to create fifo {path}: {source}")]
    CreateFifo {
        path: PathBuf,
        source: nix::Error,
    },

    /// A required channel could not be opened.
    #[error("failed to open {path}: {source}")]
    OpenChannel {
        path: PathBuf,
        source: io::Error,
    },

    /// Reading the channel failed with something other than EOF.
    #[error("read error on {path}: {source}")]
    ReadChannel {
        path: PathBuf,
        source: io::Error,
    },

    /// Writing to the channel failed (and the failure is not a prunable
    /// broken peer).
    #[error("write error on {path}: {source}")]
    WriteChannel {
        path: PathBuf,
        source: io::Error,
    },

    /// Shutdown was requested while still waiting for a channel to appear.
    #[error("shutdown requested while waiting for {path}")]
    Cancelled { path: PathBuf },

    /// The broker's read end of the inbound channel is gone; a peer cannot
    /// recover from this.
    #[error("broker is gone (broken pipe on the inbound channel)")]
    BrokerGone,
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
