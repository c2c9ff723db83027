//! Peer identifiers.

use std::fmt;

/// Identifier for a peer process.
///
/// Doubles as the OS process id: a peer derives its own id from
/// `std::process::id()` at startup, and the moderator addresses termination
/// signals to the same value. Always strictly positive on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u32);

impl PeerId {
    /// Creates a peer id from a raw positive integer.
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Derives the peer id of the current process.
    pub fn current() -> Self {
        Self(std::process::id())
    }

    /// Returns the raw integer value.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
