//! bpt-cycle - bootstrap parser trainer
//!
//! `run` drives the training cycle; `analyse`, `examples` and `init` are
//! one-shot helpers over trace and config files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bpt_common::config::{default_config_path, load_toml_config, resolve_working_dir, TomlConfig};
use bpt_common::{CycleEvent, EventBus};
use bpt_cycle::commands;
use bpt_cycle::{Collaborators, CycleSettings, TrainingCycle};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for bpt-cycle
#[derive(Parser, Debug)]
#[command(name = "bpt-cycle")]
#[command(about = "Self-training curriculum for a transition-based dependency parser")]
#[command(version)]
struct Cli {
    /// TOML config file (default: ~/.config/bpt/config.toml)
    #[arg(short, long, global = true, env = "BPT_CONFIG")]
    config: Option<PathBuf>,

    /// Working directory holding the model and per-iteration files
    #[arg(short, long, global = true, env = "BPT_WORKING_DIR")]
    working_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the training cycle
    Run {
        /// Corpus to parse each iteration
        #[arg(long, env = "BPT_CORPUS")]
        corpus: Option<PathBuf>,

        /// Stop after this many iterations
        #[arg(long, env = "BPT_MAX_ITERATIONS")]
        max_iterations: Option<u32>,

        /// Times a bigram may be targeted before it is retired
        #[arg(long, env = "BPT_PASS_LIMIT")]
        pass_limit: Option<u32>,

        /// Scheduler rounds per iteration
        #[arg(long, env = "BPT_MAX_PASSES")]
        max_passes: Option<u32>,
    },

    /// Guide a trace with the arc heuristic and append training examples
    Analyse {
        #[arg(long)]
        trace: PathBuf,

        /// Tagged corpus merged into the bigram counts
        #[arg(long)]
        corpus: Option<PathBuf>,

        #[arg(long)]
        out_dir: PathBuf,
    },

    /// Write labelled training examples for a trace
    Examples {
        #[arg(long)]
        trace: PathBuf,

        #[arg(long)]
        out: PathBuf,

        /// Dependency label (repeatable), replaces the default set
        #[arg(long = "label")]
        labels: Vec<String>,
    },

    /// Write a starter config file
    Init {
        /// Destination (default: the config path)
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(default_config_path);
    let config = match &config_path {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(&config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "bpt-cycle starting"
    );
    if let Some(path) = &config_path {
        debug!(config = %path.display(), found = path.exists(), "Configuration source");
    }

    match cli.command {
        Command::Run {
            corpus,
            max_iterations,
            pass_limit,
            max_passes,
        } => {
            let mut config = config;
            if let Some(corpus) = corpus {
                config.cycle.corpus = corpus;
            }
            if max_iterations.is_some() {
                config.cycle.max_iterations = max_iterations;
            }
            if let Some(pass_limit) = pass_limit {
                config.curriculum.pass_limit = pass_limit;
            }
            if let Some(max_passes) = max_passes {
                config.curriculum.max_passes = max_passes;
            }
            config
                .curriculum
                .validate()
                .context("Invalid curriculum settings")?;

            run_cycle(config, cli.working_dir).await
        }

        Command::Analyse {
            trace,
            corpus,
            out_dir,
        } => {
            let summary = commands::analyse(&trace, corpus.as_deref(), &out_dir, &config.curriculum)
                .with_context(|| format!("Failed to analyse {}", trace.display()))?;
            println!(
                "{} entries, {} bigrams, {} transitions rewritten",
                summary.entries, summary.bigrams, summary.changed
            );
            Ok(())
        }

        Command::Examples { trace, out, labels } => {
            let written = commands::export_examples(&trace, &out, &labels)
                .with_context(|| format!("Failed to export examples from {}", trace.display()))?;
            println!("{} examples written to {}", written, out.display());
            Ok(())
        }

        Command::Init { out, force } => {
            let out = out
                .or(config_path)
                .context("No config path given and no default config directory")?;
            commands::init_config(&out, force)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Wrote {}", out.display());
            Ok(())
        }
    }
}

fn default_filter(level: &str) -> String {
    format!("bpt_cycle={level},bpt_curriculum={level},bpt_common={level}")
}

async fn run_cycle(config: TomlConfig, working_dir: Option<PathBuf>) -> Result<()> {
    let working_dir = resolve_working_dir(working_dir.as_deref(), &config);
    info!(working_dir = %working_dir.display(), "Working directory");

    let event_bus = EventBus::new(256);
    tokio::spawn(log_events(event_bus.subscribe()));

    let settings = CycleSettings::from_config(&config, working_dir);
    let collaborators = Collaborators::from_config(&config.external);
    let mut cycle = TrainingCycle::new(settings, collaborators, event_bus);

    tokio::select! {
        result = cycle.run() => {
            let report = result.context("Training cycle aborted")?;
            println!(
                "Finished after {} iteration(s): {:?}, {} target(s) taught",
                report.iterations,
                report.reason,
                report.targets.len()
            );
        }
        _ = shutdown_signal() => {
            warn!("Interrupted, the last committed model is kept");
        }
    }

    Ok(())
}

/// Mirror cycle events into the log
async fn log_events(mut rx: broadcast::Receiver<CycleEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => debug!(target: "bpt_cycle::events", "{}", json),
                Err(e) => warn!(error = %e, "Failed to serialize event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Ctrl+C / SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
