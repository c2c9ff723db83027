//! # fifochat-cli
//!
//! Binary entry point for the fifochat relay.
//!
//! One executable, three roles:
//! - `fifochat broker` — the central relay; spawns the moderator as a child
//! - `fifochat moderator` — the report tally process, standalone
//! - `fifochat peer` — an interactive chat client

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fifochat_core::shutdown;
use fifochat_core::{
    Broker, ChannelLayout, DeliveryRegistry, FifoOpener, FifoReportSink, Moderator, Peer,
    PeerConfig, ReportTally, SigkillTerminator,
};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// fifochat - FIFO-backed multi-process chat relay
#[derive(Parser)]
#[command(name = "fifochat", version, about)]
struct Cli {
    /// Directory holding the relay's FIFOs
    #[arg(long, global = true, default_value = "/tmp")]
    dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the central relay (spawns the moderator as a child process)
    Broker {
        /// Do not spawn the moderator; run it separately
        #[arg(long)]
        no_moderator: bool,
    },
    /// Run the moderation process standalone
    Moderator,
    /// Join the chat as an interactive peer
    Peer,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let layout = ChannelLayout::new(&cli.dir);
    match cli.command {
        Commands::Broker { no_moderator } => broker_command(layout, &cli.dir, no_moderator).await,
        Commands::Moderator => moderator_command(layout).await,
        Commands::Peer => peer_command(layout, &cli.dir).await,
    }
}

async fn broker_command(layout: ChannelLayout, dir: &Path, no_moderator: bool) -> Result<()> {
    let mut sd = shutdown::on_signal().context("failed to install signal handlers")?;

    let moderator = if no_moderator {
        info!("running without a moderator child; reports wait for an external one");
        None
    } else {
        Some(spawn_moderator(dir).context("failed to spawn the moderator")?)
    };

    // Blocks until the moderator opens the read end of the report channel,
    // bounded by the shutdown flag.
    let sink = FifoReportSink::connect(&layout, &mut sd)
        .await
        .context("failed to open the report channel")?;
    let registry = DeliveryRegistry::new(Box::new(FifoOpener::new(layout.clone())));
    let mut broker = Broker::new(layout, registry, Box::new(sink), sd);

    let result = broker.run().await.context("broker failed");

    if let Some(mut child) = moderator {
        stop_moderator(&mut child).await;
    }
    result
}

async fn moderator_command(layout: ChannelLayout) -> Result<()> {
    let sd = shutdown::on_signal().context("failed to install signal handlers")?;
    let mut moderator = Moderator::new(
        layout,
        ReportTally::new(),
        Box::new(SigkillTerminator),
        sd,
    );
    moderator.run().await.context("moderator failed")
}

async fn peer_command(layout: ChannelLayout, dir: &Path) -> Result<()> {
    let sd = shutdown::on_signal().context("failed to install signal handlers")?;
    let config = PeerConfig {
        layout,
        clone_args: vec![
            "peer".to_string(),
            "--dir".to_string(),
            dir.display().to_string(),
        ],
    };
    let mut peer = Peer::new(config, sd);
    info!(id = %peer.id(), "joining chat");
    peer.run().await.context("peer session failed")
}

/// Spawns `fifochat moderator --dir <dir>` from the same executable.
fn spawn_moderator(dir: &Path) -> Result<tokio::process::Child> {
    let exe = std::env::current_exe().context("cannot resolve own executable")?;
    let child = tokio::process::Command::new(exe)
        .arg("moderator")
        .arg("--dir")
        .arg(dir)
        .spawn()?;
    info!(pid = child.id(), "moderator spawned");
    Ok(child)
}

/// Asks the moderator child to stop (SIGTERM) and reaps it.
async fn stop_moderator(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!(error = %e, "failed to signal the moderator");
        }
    }
    match child.wait().await {
        Ok(status) => info!(%status, "moderator exited"),
        Err(e) => warn!(error = %e, "failed to reap the moderator"),
    }
}
