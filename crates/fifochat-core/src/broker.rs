//! The broker: central relay loop fanning chat traffic out to peers.

use crate::channel::{ChannelLayout, ensure_fifo, open_receiver, open_sender, open_sender_retry};
use crate::error::{Error, Result};
use crate::registry::DeliveryRegistry;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use fifochat_proto::{Envelope, LineBuffer, PeerId, ReportCommand, encode_report, parse_report_command};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::pipe;
use tracing::{debug, info, warn};

/// Where report targets go. The seam between the broker and the moderator's
/// channel; tests record targets in memory instead.
#[async_trait]
pub trait ReportSink: Send {
    /// Forwards one report target to the moderator.
    async fn report(&mut self, target: PeerId) -> io::Result<()>;
}

/// Production sink: the write end of the moderator's report FIFO.
pub struct FifoReportSink {
    sender: pipe::Sender,
}

impl FifoReportSink {
    /// Ensures the report FIFO exists and opens its write end, waiting for
    /// the moderator to open the read end.
    pub async fn connect(layout: &ChannelLayout, shutdown: &mut Shutdown) -> Result<Self> {
        let path = layout.reports_path();
        ensure_fifo(&path)?;
        let sender = open_sender_retry(&path, shutdown).await?;
        Ok(Self { sender })
    }
}

#[async_trait]
impl ReportSink for FifoReportSink {
    async fn report(&mut self, target: PeerId) -> io::Result<()> {
        self.sender.write_all(encode_report(target).as_bytes()).await
    }
}

/// Lifecycle of the broker's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Serving traffic.
    Running,
    /// Interrupt observed; finishing the in-flight cycle.
    Draining,
    /// Loop exited, resources released.
    Stopped,
}

/// The central relay.
///
/// Owns the delivery registry and the report sink; reads the shared inbound
/// channel, decodes envelopes, and dispatches them. Single-threaded and
/// cooperative: everything happens inside one `tokio::select!` loop.
pub struct Broker {
    layout: ChannelLayout,
    registry: DeliveryRegistry,
    reports: Box<dyn ReportSink>,
    shutdown: Shutdown,
    state: LoopState,
}

impl Broker {
    /// Creates a broker over the given registry and report sink.
    pub fn new(
        layout: ChannelLayout,
        registry: DeliveryRegistry,
        reports: Box<dyn ReportSink>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            layout,
            registry,
            reports,
            shutdown,
            state: LoopState::Running,
        }
    }

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs the relay until shutdown is requested.
    ///
    /// Creates the inbound FIFO, opens its read end plus a keep-alive write
    /// end (so the channel never reports end-of-stream merely because no
    /// peer is connected), then serves read cycles. On shutdown the
    /// in-flight cycle finishes, every delivery handle is closed, and the
    /// keep-alive writer is dropped.
    pub async fn run(&mut self) -> Result<()> {
        let inbound_path = self.layout.inbound_path();
        ensure_fifo(&inbound_path)?;
        let mut inbound = open_receiver(&inbound_path)?;
        // Opened after the receiver so a reader is guaranteed to exist.
        let keep_alive = open_sender(&inbound_path)?;

        info!(path = %inbound_path.display(), "broker serving");

        let mut shutdown = self.shutdown.clone();
        let mut lines = LineBuffer::new();
        let mut chunk = [0u8; 4096];

        while self.state == LoopState::Running {
            tokio::select! {
                _ = shutdown.requested() => {
                    self.state = LoopState::Draining;
                    // Finish the cycle: complete lines already buffered are
                    // still dispatched before resources go away.
                    for line in lines.drain_lines() {
                        self.handle_line(&line).await;
                    }
                }
                res = inbound.read(&mut chunk) => match res {
                    Ok(0) => {
                        // All writers closed. Not an error: reopen so future
                        // peers can still connect.
                        debug!("inbound channel hit end-of-stream, reopening");
                        inbound = open_receiver(&inbound_path)?;
                    }
                    Ok(n) => {
                        lines.push(&chunk[..n]);
                        for line in lines.drain_lines() {
                            self.handle_line(&line).await;
                        }
                    }
                    Err(source) => {
                        return Err(Error::ReadChannel {
                            path: inbound_path.clone(),
                            source,
                        });
                    }
                },
            }
        }

        self.registry.close_all();
        drop(keep_alive);
        self.state = LoopState::Stopped;
        info!("broker stopped");
        Ok(())
    }

    /// Decodes and dispatches one inbound line.
    ///
    /// Rejected lines are logged and dropped; they never crash the loop,
    /// block rebroadcast, or earn a reply.
    async fn handle_line(&mut self, line: &str) {
        let envelope = match Envelope::decode(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(line, error = %e, "rejected inbound line");
                return;
            }
        };
        let sender = envelope.sender;

        self.registry.ensure(sender).await;
        info!(peer = %sender, "{}", envelope.body);

        match parse_report_command(&envelope.body) {
            Some(ReportCommand::Target(target)) => {
                if let Err(e) = self.reports.report(target).await {
                    warn!(%target, error = %e, "report forward failed");
                }
            }
            Some(ReportCommand::Invalid) => {
                debug!(peer = %sender, "report command with unusable target, dropped");
            }
            None => {
                let line = format!("[{sender}] {}\n", envelope.body);
                self.registry.broadcast(sender, &line).await;
            }
        }

        // The sender alone gets an acknowledgement, command or chat alike.
        self.registry.send(sender, "[broker] ACK\n").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use crate::testing::{MemoryOpener, MemorySink, sent_lines};

    fn broker_with_memory() -> (Broker, crate::testing::MemoryLog, MemorySink) {
        let (opener, log) = MemoryOpener::new();
        let sink = MemorySink::new();
        // The handle can drop: these tests drive `handle_line` directly and
        // never wait on the shutdown flag.
        let (_handle, shutdown) = shutdown::manual();
        let broker = Broker::new(
            ChannelLayout::default(),
            DeliveryRegistry::new(Box::new(opener)),
            Box::new(sink.clone()),
            shutdown,
        );
        (broker, log, sink)
    }

    #[tokio::test]
    async fn test_chat_fans_out_and_acks_sender() {
        let (mut broker, log, sink) = broker_with_memory();
        let (a, b, c) = (PeerId::new(1), PeerId::new(2), PeerId::new(3));

        // Register all three peers via their connect notices.
        for p in [a, b, c] {
            broker.handle_line(&format!("[{p}]-peer connected")).await;
        }

        broker.handle_line("[1]-hola").await;

        let to_b = sent_lines(&log, b);
        let to_c = sent_lines(&log, c);
        assert_eq!(to_b.iter().filter(|l| *l == "[1] hola\n").count(), 1);
        assert_eq!(to_c.iter().filter(|l| *l == "[1] hola\n").count(), 1);

        // The sender sees the ACK but never its own chat line.
        let to_a = sent_lines(&log, a);
        assert!(to_a.iter().any(|l| l == "[broker] ACK\n"));
        assert!(!to_a.iter().any(|l| l.contains("hola")));
        assert!(sink.targets().is_empty());
    }

    #[tokio::test]
    async fn test_first_contact_welcome_precedes_other_traffic() {
        let (mut broker, log, _sink) = broker_with_memory();
        let a = PeerId::new(7);

        broker.handle_line("[7]-first words").await;

        let to_a = sent_lines(&log, a);
        assert_eq!(to_a[0], "[broker] welcome, your peer id is 7\n");
        assert_eq!(to_a[1], "[broker] ACK\n");
        assert_eq!(to_a.len(), 2);
    }

    #[tokio::test]
    async fn test_report_command_forwards_and_skips_rebroadcast() {
        let (mut broker, log, sink) = broker_with_memory();
        let (a, b) = (PeerId::new(1), PeerId::new(2));
        for p in [a, b] {
            broker.handle_line(&format!("[{p}]-peer connected")).await;
        }

        broker.handle_line("[1]-reportar 4242").await;

        assert_eq!(sink.targets(), vec![PeerId::new(4242)]);
        // The command never reaches the other peer.
        assert!(!sent_lines(&log, b).iter().any(|l| l.contains("reportar")));
        // The reporter is still acknowledged.
        assert!(sent_lines(&log, a).iter().any(|l| l == "[broker] ACK\n"));
    }

    #[tokio::test]
    async fn test_invalid_report_target_is_consumed_silently() {
        let (mut broker, log, sink) = broker_with_memory();
        let (a, b) = (PeerId::new(1), PeerId::new(2));
        for p in [a, b] {
            broker.handle_line(&format!("[{p}]-peer connected")).await;
        }

        broker.handle_line("[1]-reportar nonsense").await;

        assert!(sink.targets().is_empty());
        assert!(!sent_lines(&log, b).iter().any(|l| l.contains("reportar")));
    }

    #[tokio::test]
    async fn test_malformed_line_produces_no_traffic() {
        let (mut broker, log, sink) = broker_with_memory();
        let a = PeerId::new(1);
        broker.handle_line("[1]-peer connected").await;
        let before = sent_lines(&log, a).len();

        broker.handle_line("not an envelope").await;
        broker.handle_line("[abc]-nope").await;
        broker.handle_line("[2]no separator").await;

        assert_eq!(sent_lines(&log, a).len(), before);
        assert!(sink.targets().is_empty());
    }
}
