//! # fifochat-core
//!
//! Core relay functionality for fifochat.
//!
//! This crate provides:
//! - The broker event loop fanning chat lines out over per-peer FIFOs
//! - The delivery registry with its swappable channel factory
//! - The moderator loop tallying reports and expelling repeat offenders
//! - The interactive peer loop multiplexing stdin and the delivery FIFO
//! - FIFO plumbing (creation, retrying opens, keep-alive writers)
//! - Cooperative shutdown wired into every readiness wait
//!
//! Every process is a single `tokio::select!` loop; coordination happens
//! only through FIFO reads and writes, never shared memory.

mod broker;
mod channel;
mod error;
mod moderator;
mod peer;
mod registry;
pub mod shutdown;
pub mod testing;

pub use broker::{Broker, FifoReportSink, LoopState, ReportSink};
pub use channel::{ChannelLayout, ensure_fifo, open_receiver, open_sender, open_sender_retry};
pub use error::{Error, Result};
pub use moderator::{Moderator, ProcessTerminator, ReportTally, SigkillTerminator};
pub use peer::{Peer, PeerConfig};
pub use registry::{DeliveryChannel, DeliveryOpener, DeliveryRegistry, FifoOpener};
pub use shutdown::{Shutdown, ShutdownHandle};
