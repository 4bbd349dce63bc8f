//! Journal inspection.

use super::resolve_output_dir;
use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use phaseforge_training::{OrchestratorConfig, Phase, PhaseJournal, PhaseStatus, RunLayout};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum JournalCommand {
    /// Show which phases of a run are complete
    Show {
        /// Run directory (defaults to output_dir in config)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn execute(command: JournalCommand, config: &OrchestratorConfig) -> Result<()> {
    match command {
        JournalCommand::Show { output_dir, json } => show(resolve_output_dir(output_dir.as_deref(), config), json),
    }
}

fn show(output_dir: PathBuf, json_output: bool) -> Result<()> {
    let path = RunLayout::new(output_dir).journal_path();
    let journal = PhaseJournal::load(&path, &[Phase::Knowledge, Phase::Skills])
        .with_context(|| format!("Failed to read journal {}", path.display()))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(journal.records())?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Phase Journal ({})", journal.path().display()).bold().cyan());
    println!("{}", format!("Last updated: {}", journal.updated_at().to_rfc3339()).dimmed());
    println!();
    println!("{:<12} {:<10} {:<26} {}", "Phase", "Status", "Completed", "Checkpoint");
    println!("{}", "─".repeat(90));
    for record in journal.records() {
        let status = match record.status {
            PhaseStatus::Complete => "complete".green(),
            PhaseStatus::Pending => "pending".yellow(),
        };
        let completed = record.completed_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string());
        let checkpoint = record
            .checkpoint
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<12} {:<10} {:<26} {}", record.phase.as_str(), status, completed, checkpoint.dimmed());
    }
    println!();
    Ok(())
}
