//! The peer: interactive client loop.

use crate::channel::{ChannelLayout, ensure_fifo, open_receiver, open_sender, open_sender_retry};
use crate::error::{Error, Result};
use crate::shutdown::Shutdown;
use fifochat_proto::{Envelope, PeerId};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;
use tracing::{info, warn};

/// Notice bodies sent on session boundaries.
const CONNECT_NOTICE: &str = "peer connected";
const DISCONNECT_NOTICE: &str = "peer disconnected";

/// Peer setup.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Where the relay's FIFOs live.
    pub layout: ChannelLayout,
    /// Arguments that re-launch this executable as another peer (`/share`).
    pub clone_args: Vec<String>,
}

/// What one line of user input asked for.
#[derive(Debug, PartialEq, Eq)]
enum InputOutcome {
    Continue,
    Leave,
}

/// An interactive chat client.
///
/// Owns exactly two channel ends: the read side of its personal delivery
/// FIFO and the write side of the shared inbound FIFO. Multiplexes those
/// with stdin and the shutdown flag in a single `tokio::select!` loop.
pub struct Peer {
    id: PeerId,
    config: PeerConfig,
    shutdown: Shutdown,
}

impl Peer {
    /// Creates a peer identified by the current process.
    pub fn new(config: PeerConfig, shutdown: Shutdown) -> Self {
        Self {
            id: PeerId::current(),
            config,
            shutdown,
        }
    }

    /// This peer's identifier.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Runs the interactive loop until the session ends.
    ///
    /// The delivery FIFO is created and its read end opened before first
    /// contact, so the broker's lazy open succeeds; a keep-alive writer on
    /// the same FIFO prevents spurious end-of-stream while the broker is
    /// not writing. Opening the inbound channel retries with backoff until
    /// the broker exists.
    pub async fn run(&mut self) -> Result<()> {
        let delivery_path = self.config.layout.delivery_path(self.id);
        ensure_fifo(&delivery_path)?;
        let mut delivery = open_receiver(&delivery_path)?;
        let _keep_alive = open_sender(&delivery_path)?;

        let mut shutdown = self.shutdown.clone();
        let mut inbound =
            open_sender_retry(&self.config.layout.inbound_path(), &mut shutdown).await?;

        println!("[peer] your id is {}", self.id);
        println!("[peer] commands: /leave | /share | /report <pid>");
        self.send_envelope(&mut inbound, CONNECT_NOTICE).await?;
        prompt();

        let mut input = BufReader::new(tokio::io::stdin()).lines();
        let mut chunk = [0u8; 4096];

        loop {
            tokio::select! {
                _ = shutdown.requested() => {
                    // Best effort: the broker may already be gone.
                    let _ = self.send_envelope(&mut inbound, DISCONNECT_NOTICE).await;
                    break;
                }
                line = input.next_line() => match line {
                    Ok(Some(line)) => {
                        match self.handle_input(&mut inbound, line.trim_end()).await? {
                            InputOutcome::Continue => prompt(),
                            InputOutcome::Leave => break,
                        }
                    }
                    Ok(None) => {
                        // End of user input is a clean exit.
                        let _ = self.send_envelope(&mut inbound, DISCONNECT_NOTICE).await;
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "stdin read failed, leaving");
                        let _ = self.send_envelope(&mut inbound, DISCONNECT_NOTICE).await;
                        break;
                    }
                },
                res = delivery.read(&mut chunk) => match res {
                    Ok(0) => {
                        println!("\n[peer] broker ended the session");
                        break;
                    }
                    Ok(n) => {
                        print!("\r{}", String::from_utf8_lossy(&chunk[..n]));
                        prompt();
                    }
                    Err(source) => {
                        return Err(Error::ReadChannel {
                            path: delivery_path.clone(),
                            source,
                        });
                    }
                },
            }
        }

        Ok(())
    }

    /// Dispatches one line of user input.
    async fn handle_input(
        &mut self,
        inbound: &mut pipe::Sender,
        line: &str,
    ) -> Result<InputOutcome> {
        if line == "/leave" {
            let _ = self.send_envelope(inbound, DISCONNECT_NOTICE).await;
            return Ok(InputOutcome::Leave);
        }

        if line == "/share" {
            self.spawn_clone();
            return Ok(InputOutcome::Continue);
        }

        if let Some(rest) = line.strip_prefix("/report") {
            match rest.trim().parse::<u32>() {
                Ok(target) if target > 0 => {
                    self.send_envelope(inbound, &format!("reportar {target}"))
                        .await?;
                }
                _ => println!("[peer] usage: /report <pid>"),
            }
            return Ok(InputOutcome::Continue);
        }

        self.send_envelope(inbound, line).await?;
        Ok(InputOutcome::Continue)
    }

    /// Encodes and writes one envelope to the shared inbound channel.
    ///
    /// A broken pipe means the broker's read end is gone; there is no
    /// recovering from that.
    async fn send_envelope(&self, inbound: &mut pipe::Sender, body: &str) -> Result<()> {
        let line = Envelope::new(self.id, body).encode();
        inbound.write_all(line.as_bytes()).await.map_err(|source| {
            if source.kind() == io::ErrorKind::BrokenPipe {
                warn!("broker is gone, cannot send");
                Error::BrokerGone
            } else {
                Error::WriteChannel {
                    path: self.config.layout.inbound_path(),
                    source,
                }
            }
        })
    }

    /// Spawns another peer process from the same executable (`/share`).
    fn spawn_clone(&self) {
        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                warn!(error = %e, "cannot resolve own executable for /share");
                return;
            }
        };
        match std::process::Command::new(exe)
            .args(&self.config.clone_args)
            .spawn()
        {
            Ok(child) => info!(pid = child.id(), "spawned peer clone"),
            Err(e) => warn!(error = %e, "failed to spawn peer clone"),
        }
    }
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}
