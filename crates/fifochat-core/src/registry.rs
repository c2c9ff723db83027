//! Delivery registry: one outbound channel per peer, owned by the broker.

use crate::channel::{ChannelLayout, ensure_fifo};
use async_trait::async_trait;
use fifochat_proto::PeerId;
use std::collections::HashMap;
use std::io;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::pipe;
use tracing::{debug, info, warn};

/// Write half of one peer's delivery channel.
#[async_trait]
pub trait DeliveryChannel: Send {
    /// Writes one line (terminator included) to the peer.
    async fn send(&mut self, line: &str) -> io::Result<()>;
}

/// Factory for delivery channels.
///
/// This is the seam that keeps the naming scheme and transport out of the
/// broker's control flow: production opens a FIFO derived from the peer id,
/// tests hand out in-memory channels.
#[async_trait]
pub trait DeliveryOpener: Send {
    /// Opens the delivery channel for `peer`.
    async fn open(&self, peer: PeerId) -> io::Result<Box<dyn DeliveryChannel>>;
}

/// Production opener: a FIFO per peer, addressed via the channel layout.
#[derive(Debug, Clone)]
pub struct FifoOpener {
    layout: ChannelLayout,
}

impl FifoOpener {
    /// Creates an opener rooted at the given layout.
    pub fn new(layout: ChannelLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl DeliveryOpener for FifoOpener {
    async fn open(&self, peer: PeerId) -> io::Result<Box<dyn DeliveryChannel>> {
        let path = self.layout.delivery_path(peer);
        // The peer normally creates its own FIFO before first contact, but
        // whichever side is first wins.
        ensure_fifo(&path).map_err(io::Error::other)?;
        let sender = pipe::OpenOptions::new().open_sender(&path)?;
        Ok(Box::new(FifoDelivery { sender }))
    }
}

struct FifoDelivery {
    sender: pipe::Sender,
}

#[async_trait]
impl DeliveryChannel for FifoDelivery {
    async fn send(&mut self, line: &str) -> io::Result<()> {
        self.sender.write_all(line.as_bytes()).await
    }
}

/// The broker's table of connected peers.
///
/// Entries are created lazily on a peer's first valid envelope and pruned on
/// the first failed write; there is no retry and no buffering. The registry
/// is plain owned state inside the broker loop, not shared with anything.
pub struct DeliveryRegistry {
    channels: HashMap<PeerId, Box<dyn DeliveryChannel>>,
    opener: Box<dyn DeliveryOpener>,
}

impl DeliveryRegistry {
    /// Creates an empty registry backed by the given channel factory.
    pub fn new(opener: Box<dyn DeliveryOpener>) -> Self {
        Self {
            channels: HashMap::new(),
            opener,
        }
    }

    /// Number of currently registered peers.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if no peer is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Returns true if `peer` currently has a delivery channel.
    pub fn contains(&self, peer: PeerId) -> bool {
        self.channels.contains_key(&peer)
    }

    /// Ensures `peer` has a delivery channel, opening one on first contact.
    ///
    /// A newly opened channel receives a one-time welcome line before any
    /// other traffic. If opening fails the peer is simply not registered;
    /// its next envelope triggers another attempt.
    pub async fn ensure(&mut self, peer: PeerId) {
        if self.channels.contains_key(&peer) {
            return;
        }
        match self.opener.open(peer).await {
            Ok(mut channel) => {
                info!(%peer, "peer connected, delivery channel open");
                let welcome = format!("[broker] welcome, your peer id is {peer}\n");
                if let Err(e) = channel.send(&welcome).await {
                    warn!(%peer, error = %e, "welcome write failed, dropping channel");
                    return;
                }
                self.channels.insert(peer, channel);
            }
            Err(e) => {
                warn!(%peer, error = %e, "could not open delivery channel");
            }
        }
    }

    /// Sends one line to a single peer.
    ///
    /// On failure the peer is presumed gone: the entry is removed and the
    /// handle dropped. Returns whether the write succeeded.
    pub async fn send(&mut self, peer: PeerId, line: &str) -> bool {
        let Some(channel) = self.channels.get_mut(&peer) else {
            return false;
        };
        match channel.send(line).await {
            Ok(()) => true,
            Err(e) => {
                debug!(%peer, error = %e, "delivery write failed, pruning peer");
                self.channels.remove(&peer);
                false
            }
        }
    }

    /// Sends one line to every registered peer except `exclude`.
    ///
    /// Failures prune entries in place without aborting the remaining sends.
    pub async fn broadcast(&mut self, exclude: PeerId, line: &str) {
        let targets: Vec<PeerId> = self
            .channels
            .keys()
            .copied()
            .filter(|&p| p != exclude)
            .collect();
        for peer in targets {
            self.send(peer, line).await;
        }
    }

    /// Drops every delivery channel. Shutdown path.
    pub fn close_all(&mut self) {
        self.channels.clear();
    }
}
