//! In-memory test doubles for the relay's seams.
//!
//! These replace the FIFO-backed implementations in unit tests: delivery
//! channels become shared vectors, the report sink records targets, and the
//! process terminator records ids instead of sending SIGKILL.

use crate::broker::ReportSink;
use crate::moderator::ProcessTerminator;
use crate::registry::{DeliveryChannel, DeliveryOpener};
use async_trait::async_trait;
use fifochat_proto::PeerId;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MemoryState {
    sent: HashMap<PeerId, Vec<String>>,
    fail_writes: HashSet<PeerId>,
    fail_opens: HashSet<PeerId>,
}

/// Shared view of everything the broker delivered, keyed by peer.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    state: Arc<Mutex<MemoryState>>,
}

/// Returns the lines delivered to one peer so far.
pub fn sent_lines(log: &MemoryLog, peer: PeerId) -> Vec<String> {
    log.state
        .lock()
        .unwrap()
        .sent
        .get(&peer)
        .cloned()
        .unwrap_or_default()
}

/// Delivery-channel factory backed by in-memory vectors.
#[derive(Debug, Clone)]
pub struct MemoryOpener {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryOpener {
    /// Creates an opener and the log observing its channels.
    pub fn new() -> (Self, MemoryLog) {
        let state = Arc::new(Mutex::new(MemoryState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MemoryLog { state },
        )
    }

    /// Makes every subsequent write to `peer` fail with `BrokenPipe`.
    pub fn fail_writes_to(&self, peer: PeerId) {
        self.state.lock().unwrap().fail_writes.insert(peer);
    }

    /// Makes opening a channel for `peer` fail.
    pub fn fail_opens_for(&self, peer: PeerId) {
        self.state.lock().unwrap().fail_opens.insert(peer);
    }

    /// Undoes `fail_opens_for`.
    pub fn allow_opens_for(&self, peer: PeerId) {
        self.state.lock().unwrap().fail_opens.remove(&peer);
    }
}

#[async_trait]
impl DeliveryOpener for MemoryOpener {
    async fn open(&self, peer: PeerId) -> io::Result<Box<dyn DeliveryChannel>> {
        if self.state.lock().unwrap().fail_opens.contains(&peer) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "open refused"));
        }
        Ok(Box::new(MemoryChannel {
            peer,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryChannel {
    peer: PeerId,
    state: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl DeliveryChannel for MemoryChannel {
    async fn send(&mut self, line: &str) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes.contains(&self.peer) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
        }
        state.sent.entry(self.peer).or_default().push(line.to_string());
        Ok(())
    }
}

/// Report sink that records targets instead of writing a FIFO.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    targets: Arc<Mutex<Vec<PeerId>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets reported so far, in order.
    pub fn targets(&self) -> Vec<PeerId> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn report(&mut self, target: PeerId) -> io::Result<()> {
        self.targets.lock().unwrap().push(target);
        Ok(())
    }
}

/// Terminator that records ids instead of sending SIGKILL.
#[derive(Debug, Clone, Default)]
pub struct MockTerminator {
    terminated: Arc<Mutex<Vec<PeerId>>>,
}

impl MockTerminator {
    /// Creates a terminator with an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Peers terminated so far, in order.
    pub fn terminated(&self) -> Vec<PeerId> {
        self.terminated.lock().unwrap().clone()
    }
}

impl ProcessTerminator for MockTerminator {
    fn terminate(&mut self, target: PeerId) -> io::Result<()> {
        self.terminated.lock().unwrap().push(target);
        Ok(())
    }
}
