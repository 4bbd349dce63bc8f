//! Training command implementation.

use super::resolve_output_dir;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use phaseforge_training::{
    CommandEvaluator, Device, HostCapabilities, NullProgressSink, OrchestratorConfig, Orchestrator, Phase, PhaseData,
    Pipeline, ProgressSink, StdoutProgressSink, Strategy, TrainArgs, TrainingRequest,
};
use serde_json::json;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct TrainCommand {
    /// Training pipeline (simple, full, accelerated)
    #[arg(long)]
    pub pipeline: Pipeline,

    /// Training strategy (lab-multiphase, lab-skills-only)
    #[arg(long)]
    pub strategy: Strategy,

    /// Device to train on (cpu, cuda, hpu, mps)
    #[arg(long, default_value = "cpu")]
    pub device: Device,

    /// Base model the first phase starts from (overrides base_model in config)
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// Run directory holding the journal and phase checkpoints
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Knowledge data for phase 1
    #[arg(long)]
    pub phased_phase1_data: Option<PathBuf>,

    /// Skills data for phase 2
    #[arg(long)]
    pub phased_phase2_data: Option<PathBuf>,

    /// Epochs for phase 1 (defaults to knowledge_epochs in config)
    #[arg(long)]
    pub phased_phase1_num_epochs: Option<u32>,

    /// Epochs for phase 2 (defaults to skills_epochs in config)
    #[arg(long)]
    pub phased_phase2_num_epochs: Option<u32>,

    /// Judge model used to pick the best final-phase checkpoint
    #[arg(long)]
    pub phased_mt_bench_judge: Option<String>,

    /// Skip saving full optimizer and model state at every epoch
    #[arg(long)]
    pub disable_checkpoint_full_state: bool,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub learning_rate: Option<f64>,

    #[arg(long)]
    pub effective_batch_size: Option<u32>,

    #[arg(long)]
    pub max_seq_len: Option<u32>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

impl TrainCommand {
    fn train_args(&self) -> TrainArgs {
        let defaults = TrainArgs::default();
        TrainArgs {
            checkpoint_full_state: !self.disable_checkpoint_full_state,
            seed: self.seed.unwrap_or(defaults.seed),
            learning_rate: self.learning_rate.unwrap_or(defaults.learning_rate),
            effective_batch_size: self.effective_batch_size.unwrap_or(defaults.effective_batch_size),
            max_seq_len: self.max_seq_len.unwrap_or(defaults.max_seq_len),
        }
    }

    fn into_request(self, config: &OrchestratorConfig) -> Result<TrainingRequest> {
        let base_model = self
            .model_path
            .clone()
            .or_else(|| config.base_model.clone())
            .context("No base model given. Pass --model-path or set base_model in the configuration.")?;
        let output_dir = resolve_output_dir(self.output_dir.as_deref(), config);

        let mut request = TrainingRequest::new(self.pipeline, self.strategy, self.device, base_model, output_dir)
            .with_train_args(self.train_args());

        if let Some(path) = &self.phased_phase1_data {
            let epochs = self.phased_phase1_num_epochs.unwrap_or(config.knowledge_epochs);
            request = request.with_phase_data(Phase::Knowledge, PhaseData::new(config.resolve_data_path(path), epochs));
        }
        if let Some(path) = &self.phased_phase2_data {
            let epochs = self.phased_phase2_num_epochs.unwrap_or(config.skills_epochs);
            request = request.with_phase_data(Phase::Skills, PhaseData::new(config.resolve_data_path(path), epochs));
        }
        if let Some(judge) = self.phased_mt_bench_judge {
            request = request.with_judge(judge);
        }
        Ok(request)
    }
}

pub async fn execute(command: TrainCommand, config: &OrchestratorConfig) -> Result<()> {
    let json_output = command.json;
    let request = command.into_request(config)?;

    let trainers = config.trainer_set();
    let evaluator = config.evaluator.clone().map(CommandEvaluator::new);
    // JSON output owns stdout.
    let sink: Box<dyn ProgressSink> =
        if json_output { Box::new(NullProgressSink) } else { Box::new(StdoutProgressSink) };

    let mut orchestrator = Orchestrator::new(&trainers, HostCapabilities::probe(), &*sink);
    match &evaluator {
        Some(evaluator) => orchestrator = orchestrator.with_evaluator(evaluator),
        None if request.judge.is_some() => {
            tracing::warn!("a judge was given but no evaluator command is configured; using the latest checkpoint");
        }
        None => {}
    }

    let outcome = orchestrator.run(&request).await?;

    if json_output {
        let out = json!({
            "backend": outcome.backend.as_str(),
            "final_checkpoint": outcome.final_checkpoint,
            "executed": outcome.executed,
            "skipped": outcome.skipped,
            "journal": phaseforge_training::RunLayout::new(request.output_dir.clone()).journal_path(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", "Multi-phase training complete".bold().green());
    println!("  Strategy: {}", request.strategy.as_str().cyan());
    println!("  Backend: {}", outcome.backend.as_str().cyan());
    println!("  Final checkpoint: {}", outcome.final_checkpoint.display().to_string().cyan());
    if !outcome.skipped.is_empty() {
        let skipped: Vec<&str> = outcome.skipped.iter().map(|p| p.as_str()).collect();
        println!("  {}", format!("Resumed past: {}", skipped.join(", ")).dimmed());
    }
    println!();
    Ok(())
}
