//! FIFO plumbing: channel addressing, creation, and opening.
//!
//! All channels are filesystem FIFOs under one directory. Addressing is
//! deterministic so independent processes agree on paths without any
//! rendezvous: the inbound and report channels have fixed names, delivery
//! channels derive theirs from the peer id.

use crate::error::{Error, Result};
use crate::shutdown::Shutdown;
use fifochat_proto::PeerId;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::unix::pipe;
use tracing::debug;

/// Delay between attempts while waiting for a channel's reader to appear.
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(150);

/// Where the relay's FIFOs live and how they are named.
#[derive(Debug, Clone)]
pub struct ChannelLayout {
    dir: PathBuf,
}

impl ChannelLayout {
    /// Creates a layout rooted at the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The shared many-writers/one-reader channel peers send on.
    pub fn inbound_path(&self) -> PathBuf {
        self.dir.join("fifochat_inbound.fifo")
    }

    /// The broker-to-moderator report channel.
    pub fn reports_path(&self) -> PathBuf {
        self.dir.join("fifochat_reports.fifo")
    }

    /// The broker-to-peer delivery channel for one peer.
    pub fn delivery_path(&self, peer: PeerId) -> PathBuf {
        self.dir.join(format!("fifochat_peer_{peer}.fifo"))
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::new("/tmp")
    }
}

/// Creates a FIFO at `path` if one does not already exist.
///
/// An existing FIFO is fine: whichever side gets there first creates it, the
/// other just opens it.
pub fn ensure_fifo(path: &Path) -> Result<()> {
    match mkfifo(path, Mode::from_bits_truncate(0o666)) {
        Ok(()) | Err(nix::errno::Errno::EEXIST) => Ok(()),
        Err(source) => Err(Error::CreateFifo {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Opens the read end of a FIFO.
///
/// Succeeds even when no writer exists yet; the returned receiver simply
/// pends until data arrives (provided a keep-alive writer holds the channel
/// open, see the loop owners).
pub fn open_receiver(path: &Path) -> Result<pipe::Receiver> {
    pipe::OpenOptions::new()
        .open_receiver(path)
        .map_err(|source| Error::OpenChannel {
            path: path.to_path_buf(),
            source,
        })
}

/// Opens the write end of a FIFO whose reader is known to exist.
pub fn open_sender(path: &Path) -> Result<pipe::Sender> {
    pipe::OpenOptions::new()
        .open_sender(path)
        .map_err(|source| Error::OpenChannel {
            path: path.to_path_buf(),
            source,
        })
}

/// Opens the write end of a FIFO, waiting for its reader to appear.
///
/// "Not yet present" comes in two flavors, both transient: the FIFO itself
/// is missing (`ENOENT`, the owning process has not created it) or it has no
/// reader (`ENXIO`, the owner created it but has not opened it). Both are
/// retried on a short delay; any other error is fatal. A shutdown request
/// bounds the wait.
pub async fn open_sender_retry(path: &Path, shutdown: &mut Shutdown) -> Result<pipe::Sender> {
    loop {
        match pipe::OpenOptions::new().open_sender(path) {
            Ok(sender) => return Ok(sender),
            Err(e) if is_transient_open(&e) => {
                debug!(path = %path.display(), "channel not ready, retrying");
                tokio::select! {
                    _ = shutdown.requested() => {
                        return Err(Error::Cancelled {
                            path: path.to_path_buf(),
                        });
                    }
                    () = tokio::time::sleep(OPEN_RETRY_DELAY) => {}
                }
            }
            Err(source) => {
                return Err(Error::OpenChannel {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }
}

fn is_transient_open(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(nix::libc::ENXIO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths_are_deterministic() {
        let layout = ChannelLayout::new("/var/run/chat");
        assert_eq!(
            layout.inbound_path(),
            PathBuf::from("/var/run/chat/fifochat_inbound.fifo")
        );
        assert_eq!(
            layout.reports_path(),
            PathBuf::from("/var/run/chat/fifochat_reports.fifo")
        );
        assert_eq!(
            layout.delivery_path(PeerId::new(77)),
            PathBuf::from("/var/run/chat/fifochat_peer_77.fifo")
        );
    }

    #[test]
    fn test_ensure_fifo_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.fifo");
        ensure_fifo(&path).unwrap();
        ensure_fifo(&path).unwrap();
    }

    #[tokio::test]
    async fn test_open_sender_retry_gives_up_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.fifo");
        let (handle, mut shutdown) = crate::shutdown::manual();
        handle.request();
        let err = open_sender_retry(&path, &mut shutdown).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_open_sender_retry_succeeds_once_reader_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.fifo");
        let (_handle, mut shutdown) = crate::shutdown::manual();

        let opener = {
            let path = path.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                ensure_fifo(&path).unwrap();
                open_receiver(&path).unwrap()
            })
        };

        let sender = open_sender_retry(&path, &mut shutdown).await;
        assert!(sender.is_ok());
        let _rx = opener.await.unwrap();
    }
}
