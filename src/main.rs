//! Entry point for `udp-file-transfer`.
//!
//! Parses CLI arguments and dispatches into either **send** or **receive**
//! mode.  All actual protocol work is delegated to library modules; `main.rs`
//! owns only process setup (logging, argument parsing, flag validation).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use udp_file_transfer::{
    Deadline, Endpoint, NoFaults, RandomCorruption, ReceiveConfig, SendConfig,
};

/// Reliable file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a file to a listening peer.
    Send {
        /// Peer address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        peer: SocketAddr,

        /// File to transfer.
        #[arg(short, long)]
        file: PathBuf,

        /// Local address to bind (port 0 = ephemeral).
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,

        /// Percentage of data transmissions to corrupt on the wire.
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
        error_percent: u8,

        /// Milliseconds after which an unacknowledged segment is resent.
        #[arg(long, default_value_t = 3000, value_parser = clap::value_parser!(u64).range(0..=10_000))]
        resend_ms: u64,

        /// Abort the transfer after this many seconds (omit to retry forever).
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Listen for inbound transfers and write each to disk.
    Receive {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,

        /// Directory for `received<N>` output files.
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Abort a transfer after this many seconds (omit to wait forever).
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Number of transfers to accept before exiting.
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}

fn deadline_from(secs: Option<u64>) -> Deadline {
    match secs {
        Some(secs) => Deadline::after(Duration::from_secs(secs)),
        None => Deadline::none(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Send {
            peer,
            file,
            bind,
            error_percent,
            resend_ms,
            deadline_secs,
        } => {
            let endpoint = Endpoint::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            let config = SendConfig {
                resend_after: Duration::from_millis(resend_ms),
                faults: if error_percent == 0 {
                    Box::new(NoFaults)
                } else {
                    Box::new(RandomCorruption::new(error_percent))
                },
                deadline: deadline_from(deadline_secs),
            };
            let report = endpoint
                .send_file(peer, &file, config)
                .await
                .with_context(|| format!("sending {} to {peer}", file.display()))?;
            log::info!(
                "sent {} bytes in {} segment(s) with {} resend(s) in {:.2?}",
                report.bytes,
                report.segments,
                report.retransmissions,
                report.elapsed
            );
        }
        Command::Receive {
            bind,
            output_dir,
            deadline_secs,
            count,
        } => {
            let mut endpoint = Endpoint::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            for _ in 0..count {
                let config = ReceiveConfig {
                    output_dir: output_dir.clone(),
                    deadline: deadline_from(deadline_secs),
                    ..ReceiveConfig::default()
                };
                let report = endpoint
                    .receive_file(config)
                    .await
                    .context("receiving transfer")?;
                log::info!(
                    "received {} bytes in {} segment(s) from {} in {:.2?}",
                    report.bytes,
                    report.segments,
                    report.peer,
                    report.elapsed
                );
            }
        }
    }

    Ok(())
}
