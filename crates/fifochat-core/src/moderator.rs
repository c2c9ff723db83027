//! The moderator: tallies reports and expels repeat offenders.

use crate::channel::{ChannelLayout, ensure_fifo, open_receiver, open_sender};
use crate::error::{Error, Result};
use crate::shutdown::Shutdown;
use fifochat_proto::{LineBuffer, PeerId, decode_report};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::io;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// Per-target report counts with a fixed expulsion threshold.
///
/// Owned exclusively by the moderator loop. Once a count reaches the
/// threshold the entry is removed, so a single crossing can never terminate
/// the same target twice; if reports resume against a recycled id the count
/// starts over.
#[derive(Debug)]
pub struct ReportTally {
    counts: HashMap<PeerId, u32>,
    threshold: u32,
}

impl ReportTally {
    /// Reports needed before a target is expelled.
    pub const DEFAULT_THRESHOLD: u32 = 10;

    /// Creates a tally with the default threshold.
    pub fn new() -> Self {
        Self::with_threshold(Self::DEFAULT_THRESHOLD)
    }

    /// Creates a tally with a custom threshold.
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            counts: HashMap::new(),
            threshold,
        }
    }

    /// Records one report against `target`.
    ///
    /// Returns `Some(target)` exactly when this report crosses the
    /// threshold; the entry is removed at the same moment.
    pub fn record(&mut self, target: PeerId) -> Option<PeerId> {
        let count = self.counts.entry(target).or_insert(0);
        *count += 1;
        debug!(%target, count = *count, threshold = self.threshold, "report recorded");
        if *count >= self.threshold {
            self.counts.remove(&target);
            Some(target)
        } else {
            None
        }
    }

    /// Current count for `target` (absent means zero).
    pub fn count(&self, target: PeerId) -> u32 {
        self.counts.get(&target).copied().unwrap_or(0)
    }
}

impl Default for ReportTally {
    fn default() -> Self {
        Self::new()
    }
}

/// How a threshold crossing is enforced. Production sends SIGKILL; tests
/// record the target instead.
pub trait ProcessTerminator: Send {
    /// Forcefully stops the process behind `target`.
    fn terminate(&mut self, target: PeerId) -> io::Result<()>;
}

/// Production terminator: `kill(pid, SIGKILL)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SigkillTerminator;

impl ProcessTerminator for SigkillTerminator {
    fn terminate(&mut self, target: PeerId) -> io::Result<()> {
        kill(Pid::from_raw(target.raw() as i32), Signal::SIGKILL)
            .map_err(|errno| io::Error::from_raw_os_error(errno as i32))
    }
}

/// The moderation process loop.
///
/// Reads bare-integer report lines from its FIFO, tallies them, and issues a
/// termination request when a target crosses the threshold. Runs standalone
/// with a lifecycle independent from the broker.
pub struct Moderator {
    layout: ChannelLayout,
    tally: ReportTally,
    terminator: Box<dyn ProcessTerminator>,
    shutdown: Shutdown,
}

impl Moderator {
    /// Creates a moderator with the given enforcement backend.
    pub fn new(
        layout: ChannelLayout,
        tally: ReportTally,
        terminator: Box<dyn ProcessTerminator>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            layout,
            tally,
            terminator,
            shutdown,
        }
    }

    /// Runs until shutdown is requested.
    ///
    /// Owns the report FIFO end to end: creates it, holds a keep-alive
    /// writer so broker restarts never surface as end-of-stream, and reopens
    /// on EOF as a fallback. Malformed lines are logged and ignored.
    pub async fn run(&mut self) -> Result<()> {
        let path = self.layout.reports_path();
        ensure_fifo(&path)?;
        let mut reports = open_receiver(&path)?;
        let _keep_alive = open_sender(&path)?;

        info!(path = %path.display(), "moderator serving");

        let mut shutdown = self.shutdown.clone();
        let mut lines = LineBuffer::new();
        let mut chunk = [0u8; 512];

        loop {
            tokio::select! {
                _ = shutdown.requested() => break,
                res = reports.read(&mut chunk) => match res {
                    Ok(0) => {
                        debug!("report channel hit end-of-stream, reopening");
                        reports = open_receiver(&path)?;
                    }
                    Ok(n) => {
                        lines.push(&chunk[..n]);
                        for line in lines.drain_lines() {
                            self.handle_report_line(&line);
                        }
                    }
                    Err(source) => {
                        return Err(Error::ReadChannel {
                            path: path.clone(),
                            source,
                        });
                    }
                },
            }
        }

        info!("moderator stopped");
        Ok(())
    }

    fn handle_report_line(&mut self, line: &str) {
        let target = match decode_report(line) {
            Ok(target) => target,
            Err(e) => {
                warn!(line, error = %e, "ignoring malformed report line");
                return;
            }
        };

        info!(%target, count = self.tally.count(target) + 1, "report received");
        if let Some(expelled) = self.tally.record(target) {
            match self.terminator.terminate(expelled) {
                Ok(()) => info!(target = %expelled, "threshold reached, peer expelled"),
                Err(e) => warn!(target = %expelled, error = %e, "termination request failed"),
            }
        }
    }
}
