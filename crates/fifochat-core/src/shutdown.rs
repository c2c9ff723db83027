//! Cooperative shutdown.
//!
//! Every loop in this crate multiplexes a shutdown receiver alongside its
//! I/O readiness sources, so an interrupt is observed inside the wait itself
//! rather than polled between blocking calls. The flag is a `watch` channel:
//! the signal listener flips it once, every clone sees it.

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::warn;

/// Read side of the shutdown flag. Cheap to clone; one per loop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Completes once shutdown has been requested.
    ///
    /// Intended for use as a `tokio::select!` branch. Completes immediately
    /// if the request already happened, and also if every handle was
    /// dropped (nothing can ever flip the flag, so waiting is pointless).
    pub async fn requested(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Returns true if shutdown has been requested, without waiting.
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Write side of the shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Requests shutdown. Idempotent.
    pub fn request(&self) {
        let _ = self.tx.send(true);
    }
}

/// Creates a manually triggered shutdown pair.
///
/// Used by tests and by callers that wire their own signal handling.
pub fn manual() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

/// Creates a shutdown flag flipped by SIGINT or SIGTERM.
///
/// Spawns a listener task holding the write side, so the returned receiver
/// stays live for the rest of the process. Must be called from within a
/// tokio runtime.
pub fn on_signal() -> std::io::Result<Shutdown> {
    let (handle, rx) = manual();
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received, shutting down..."),
            _ = sigterm.recv() => warn!("SIGTERM received, shutting down..."),
        }
        handle.request();
    });

    Ok(rx)
}
