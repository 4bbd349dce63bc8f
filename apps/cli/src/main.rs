//! Phaseforge CLI - resumable multi-phase fine-tuning
//!
//! Exit codes: 0 on success, 1 when orchestration or training fails, 2 when
//! the arguments cannot be parsed.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{journal, train};

/// Phaseforge - phase-by-phase fine-tuning that survives crashes
///
/// Runs a knowledge phase and a skills phase on a training backend, records
/// each completed phase in a journal, and resumes from the first unfinished
/// phase when re-run.
#[derive(Parser, Debug)]
#[command(name = "phaseforge", author, version, about = "Phaseforge - resumable multi-phase fine-tuning")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Configuration file (merged over ~/.phaseforge/config.toml and ./.phaseforge.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run (or resume) a multi-phase training
    Train(train::TrainCommand),

    /// Inspect the phase journal of a run
    #[command(subcommand)]
    Journal(journal::JournalCommand),
}

fn parse_level(level: &str) -> Level {
    match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::load_config(args.config.as_deref())?;

    let level = args.log_level.as_deref().or(config.log_level.as_deref()).unwrap_or("warn");
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Train(cmd) => train::execute(cmd, &config).await?,
        Command::Journal(cmd) => journal::execute(cmd, &config)?,
    }

    Ok(())
}
