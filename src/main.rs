mod aggregate;
mod artifacts;
mod classifier;
mod command;
mod compare;
mod compress;
mod config;
mod events;
mod results;
mod runner;
mod session;
mod signals;
mod tailer;
mod usage;
mod variant;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Benchmark runner for a headless AI coding agent: run the agent against a
/// fixed task under each plugin variant, record per-run metrics, and compare
/// variants. Also analyzes token usage of a recorded session.
#[derive(Parser, Debug)]
#[command(name = "agent-bench", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "bench.toml")]
    config: PathBuf,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run benchmark iterations for one variant
    Run {
        /// native, optimized, baseline, or lite
        #[arg(value_name = "VARIANT")]
        variant: Option<String>,

        /// Number of runs
        #[arg(value_name = "ITERATIONS", default_value_t = 1)]
        iterations: u32,

        /// Compare saved results across variants instead of running
        #[arg(long)]
        compare: bool,
    },
    /// Summarize token usage and cost of a recorded session log
    Analyze {
        /// Session event logs (.jsonl or .jsonl.zst), folded in order
        #[arg(required = true)]
        session_files: Vec<PathBuf>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Price with Opus rates instead of Sonnet
        #[arg(long)]
        opus: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    match cli.command {
        Commands::Run {
            variant,
            iterations,
            compare,
        } => {
            let config = match config::BenchConfig::load(&cli.config) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return ExitCode::FAILURE;
                }
            };
            if compare {
                return run_compare(&config);
            }
            let Some(name) = variant else {
                eprintln!("Error: a variant is required unless --compare is given");
                eprintln!("Usage: agent-bench run <VARIANT> [ITERATIONS]");
                return ExitCode::FAILURE;
            };
            let variant = match name.parse::<variant::Variant>() {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return ExitCode::FAILURE;
                }
            };
            run_benchmark(config, variant, iterations).await
        }
        Commands::Analyze {
            session_files,
            json,
            opus,
        } => run_analyze(&session_files, json, opus),
    }
}

async fn run_benchmark(
    config: config::BenchConfig,
    variant: variant::Variant,
    iterations: u32,
) -> ExitCode {
    let signals = match signals::SignalHandler::install() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to install signal handlers: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runner = runner::BenchmarkRunner::new(config, variant, iterations, signals.flag());
    match runner.run().await {
        Ok(results) => {
            tracing::info!(
                variant = %variant,
                timestamp = runner.timestamp(),
                completed = results.len(),
                requested = iterations,
                "benchmark finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "benchmark aborted");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_compare(config: &config::BenchConfig) -> ExitCode {
    let baseline = match config.compare.baseline.parse::<variant::Variant>() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: invalid compare.baseline: {e}");
            return ExitCode::FAILURE;
        }
    };
    let runs = results::ResultsDir::new(&config.run.results_dir).load_all();
    print!("{}", compare::compare(&runs, baseline).render());
    ExitCode::SUCCESS
}

fn run_analyze(paths: &[PathBuf], json: bool, opus: bool) -> ExitCode {
    if let Some(missing) = paths.iter().find(|p| !p.exists()) {
        eprintln!("Error: Session file not found: {}", missing.display());
        return ExitCode::FAILURE;
    }
    let tier = if opus {
        usage::PricingTier::Opus
    } else {
        usage::PricingTier::Sonnet
    };

    let mut report = aggregate::UsageReport::default();
    for path in paths {
        match aggregate::UsageReport::from_file(path) {
            Ok(part) => report.merge(part),
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if json {
        match serde_json::to_string_pretty(&report.to_json(tier)) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error: failed to encode report: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{}", report.render_table(tier));
    }
    ExitCode::SUCCESS
}
