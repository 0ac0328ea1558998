//! Command-line runner for single runs, fixed batches and parameter sweeps.
//!
//! Results are printed as JSON on stdout (or written to `--output`); logs go
//! to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;
use serde_json::json;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use cluster_tracker::{BatchRunner, BatchSummary, SimulationConfig, SweepVariable, run_single};

#[derive(Parser)]
#[command(name = "cluster-tracker")]
#[command(about = "Monte-Carlo runs of an adaptive view field tracking a blinking point cluster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file; missing fields take their defaults
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Master random seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Output file for results (JSON)
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one simulation.
    Single {
        /// Include the per-step time series
        #[arg(long)]
        series: bool,
    },

    /// Run a fixed number of independent simulations.
    Batch {
        /// Number of runs (default: batch_runs from the configuration)
        #[arg(short, long)]
        runs: Option<usize>,
        /// Worker threads (default: cores - 1)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Scan one configuration field over a range.
    Sweep {
        /// radius, Omax, Vmax, Tmax, vmax, tmax, TmaxVisible or TmaxInvisible
        #[arg(long)]
        variable: SweepVariable,
        #[arg(long)]
        from: f64,
        #[arg(long)]
        to: f64,
        #[arg(long)]
        step: f64,
        /// Repetitions per value (default: sweep_runs_per_value from the configuration)
        #[arg(short, long)]
        runs: Option<usize>,
        /// Worker threads (default: cores - 1)
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let report = match cli.command {
        Commands::Single { series } => {
            let seed = config.seed.unwrap_or_else(|| rand::rng().random());
            info!(seed, shape = %config.shape, "running single simulation");
            let stats = run_single(&config, seed)?;
            if series {
                json!({ "seed": seed, "summary": stats.summary(), "statistics": stats })
            } else {
                json!({ "seed": seed, "summary": stats.summary() })
            }
        }

        Commands::Batch { runs, workers } => {
            if let Some(runs) = runs {
                config.batch_runs = runs;
            }
            let runner = workers.map(BatchRunner::with_workers).unwrap_or_default();
            let results = runner.run_batch(&config).await?;
            runner.shutdown().await;
            serde_json::to_value(BatchSummary::from_runs(&results))?
        }

        Commands::Sweep { variable, from, to, step, runs, workers } => {
            if let Some(runs) = runs {
                config.sweep_runs_per_value = runs;
            }
            let runner = workers.map(BatchRunner::with_workers).unwrap_or_default();
            let rows = runner.run_sweep(&config, variable, from, to, step).await?;
            runner.shutdown().await;
            serde_json::to_value(rows)?
        }
    };

    emit(&report, cli.output.as_deref())
}

fn emit(report: &serde_json::Value, output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "results written");
        }
        None => println!("{text}"),
    }
    Ok(())
}
