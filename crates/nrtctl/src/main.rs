//! Node Resource Topology cache CLI
//!
//! Replays a recorded trace of topology reports and scheduler placements into
//! the cache and shows what the scheduler would see: availability with
//! pending reservations subtracted, fingerprint verdicts and flush results.

mod commands;
mod config;
mod output;
mod trace;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{check, fingerprint, flush, overlay};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Node Resource Topology cache CLI
#[derive(Parser)]
#[command(name = "nrtctl")]
#[command(author, version, about = "Inspect the Node Resource Topology cache", long_about = None)]
pub struct Cli {
    /// Cache configuration file (defaults to NRT_CACHE_* environment variables)
    #[arg(long, env = "NRTCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show zone availability with pending reservations subtracted
    Overlay {
        /// Trace file to replay
        trace: PathBuf,

        /// Only show this node
        #[arg(long, short)]
        node: Option<String>,
    },

    /// Compare published fingerprints with the replayed workloads
    Check {
        /// Trace file to replay
        trace: PathBuf,

        /// Check the trace's later reports instead of its initial snapshots
        #[arg(long)]
        reports: bool,
    },

    /// Print the fingerprint of the workloads replayed onto a node
    Fingerprint {
        /// Trace file to replay
        trace: PathBuf,

        /// Node name
        #[arg(long, short)]
        node: String,
    },

    /// Offer the trace's later reports to the cache for flushing
    Flush {
        /// Trace file to replay
        trace: PathBuf,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let cache_config = config::load(cli.config.as_deref())?;
    info!(zone_type = %cache_config.zone_type, "Cache configured");

    match cli.command {
        Commands::Overlay { trace: path, node } => {
            let trace = trace::Trace::load(&path).await?;
            let cache = trace.replay(cache_config)?;
            overlay::show_overlay(&cache, node.as_deref(), cli.format)?;
        }
        Commands::Check {
            trace: path,
            reports,
        } => {
            let trace = trace::Trace::load(&path).await?;
            let cache = trace.replay(cache_config)?;
            let snapshots = if reports {
                &trace.reports
            } else {
                &trace.snapshots
            };
            check::check_snapshots(&cache, snapshots, cli.format)?;
        }
        Commands::Fingerprint { trace: path, node } => {
            let trace = trace::Trace::load(&path).await?;
            let cache = trace.replay(cache_config)?;
            fingerprint::show_fingerprint(&cache, &node, cli.format)?;
        }
        Commands::Flush { trace: path } => {
            let trace = trace::Trace::load(&path).await?;
            let cache = trace.replay(cache_config)?;
            flush::flush_reports(&cache, &trace.reports, cli.format)?;
        }
    }

    Ok(())
}
