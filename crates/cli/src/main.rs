//! Capacity profiler CLI
//!
//! Builds per-core capacity profiles from recorded telemetry, recorded
//! sweeps, or live probe-driven searches.

mod commands;
mod config;
mod output;
mod probe;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{analyze, calibrate, long_term, short_term, sweep, CommandContext};
use profiler_lib::observability::{ProfilerMetrics, StructuredLogger};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Capacity profiler CLI
#[derive(Parser)]
#[command(name = "capprof")]
#[command(author, version, about = "Capacity profiling for packet-processing cores", long_about = None)]
pub struct Cli {
    /// Configuration file (any format the config loader understands)
    #[arg(long, short, global = true, env = "CAPPROF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Directory profile artifacts are written to
    #[arg(long, short, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Override the latency SLO in nanoseconds
    #[arg(long, global = true)]
    pub slo_ns: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Write the Prometheus text exposition here on exit
    #[arg(long, global = true)]
    pub dump_metrics: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify epochs and summarise SLO violation events
    Analyze {
        /// Telemetry logs
        #[arg(required = true)]
        logs: Vec<PathBuf>,

        /// Cluster snapshot log to summarise alongside
        #[arg(long)]
        cluster: Option<PathBuf>,
    },

    /// Build the short-term envelope profile from violating epochs
    ShortTerm {
        /// Telemetry logs
        #[arg(required = true)]
        logs: Vec<PathBuf>,

        /// Restrict to one core (all cores are merged otherwise)
        #[arg(long)]
        core: Option<u32>,
    },

    /// Build long-term profiles from recorded sweep results
    Sweep {
        /// Sweep result file
        results: PathBuf,

        /// Packet size to select rows for
        #[arg(long)]
        pkt_size: u32,
    },

    /// Calibrate the short-term profile by probing the live system
    Calibrate {
        /// Offered rate for every probe (defaults to the first candidate rate)
        #[arg(long)]
        rate: Option<u64>,
    },

    /// Binary-search the sustainable rate per flow count with the live probe
    LongTerm,
}

fn init_tracing(json: bool, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr so JSON output on stdout stays parseable
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.verbose);

    let mut config = config::ProfilerConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(slo_ns) = cli.slo_ns {
        config.slo_ns = slo_ns;
    }
    config.validate()?;

    let run_label = format!("capprof-{}", std::process::id());
    info!(run = %run_label, slo_ns = config.slo_ns, "Starting capprof");

    let ctx = CommandContext {
        config,
        format: cli.format,
        logger: StructuredLogger::new(run_label),
    };
    // Metrics exist before the first command touches them
    ProfilerMetrics::new();

    let result = match cli.command {
        Commands::Analyze { logs, cluster } => analyze::run(&ctx, logs, cluster).await,
        Commands::ShortTerm { logs, core } => short_term::run(&ctx, logs, core).await,
        Commands::Sweep { results, pkt_size } => sweep::run(&ctx, results, pkt_size).await,
        Commands::Calibrate { rate } => calibrate::run(&ctx, rate).await,
        Commands::LongTerm => long_term::run(&ctx).await,
    };

    if let Some(path) = cli.dump_metrics {
        tokio::fs::write(&path, ProfilerMetrics::render())
            .await
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    result
}
