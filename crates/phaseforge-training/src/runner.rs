use crate::checkpoint::{self, Checkpoint};
use crate::error::{TrainingError, TrainingResult};
use crate::layout::RunLayout;
use crate::phase::PhasePosition;
use crate::request::TrainingRequest;
use crate::trainer::{Trainer, TrainerInvocation};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of one successful phase: every checkpoint it saved, plus the
/// directory they were found in.
#[derive(Debug, Clone)]
pub struct PhaseOutput {
    pub output_dir: PathBuf,
    pub checkpoints: Vec<Checkpoint>,
}

/// Runs exactly one phase against the selected trainer. Never retries.
pub struct PhaseRunner {
    trainer: Arc<dyn Trainer>,
    layout: RunLayout,
}

impl PhaseRunner {
    #[must_use]
    pub fn new(trainer: Arc<dyn Trainer>, layout: RunLayout) -> Self {
        Self { trainer, layout }
    }

    #[must_use]
    pub fn trainer_id(&self) -> &str {
        self.trainer.id()
    }

    /// Runs the phase and returns its highest-ordinal checkpoint.
    pub async fn run(
        &self,
        position: PhasePosition,
        request: &TrainingRequest,
        starting_point: &Path,
    ) -> TrainingResult<Checkpoint> {
        let output_dir = self.invoke(position, request, starting_point).await?;
        let best = checkpoint::best(&output_dir).map_err(|e| attribute_to_phase(position, e))?;
        tracing::debug!(phase = %position.phase, checkpoint = %best.path.display(), "selected latest checkpoint");
        Ok(best)
    }

    /// Runs the phase and returns every checkpoint it saved, for callers that
    /// choose among them. Fails with `NoCheckpointsProduced` when the trainer
    /// saved nothing.
    pub async fn execute(
        &self,
        position: PhasePosition,
        request: &TrainingRequest,
        starting_point: &Path,
    ) -> TrainingResult<PhaseOutput> {
        let output_dir = self.invoke(position, request, starting_point).await?;
        let checkpoints =
            checkpoint::list_checkpoints(&output_dir).map_err(|e| attribute_to_phase(position, e))?;
        if checkpoints.is_empty() {
            return Err(TrainingError::NoCheckpointsProduced { phase_index: Some(position.index), directory: output_dir });
        }

        tracing::debug!(phase = %position.phase, count = checkpoints.len(), "phase produced checkpoints");
        Ok(PhaseOutput { output_dir, checkpoints })
    }

    /// Invokes the trainer on a fresh results directory and returns the
    /// directory it reports.
    async fn invoke(
        &self,
        position: PhasePosition,
        request: &TrainingRequest,
        starting_point: &Path,
    ) -> TrainingResult<PathBuf> {
        let phase = position.phase;
        let data = request.phase_data(phase).ok_or_else(|| TrainingError::InputData {
            phase,
            path: PathBuf::new(),
            reason: "no data path was provided".to_string(),
        })?;

        let output_dir = self.layout.reset_results_dir(phase)?;
        let invocation = TrainerInvocation {
            phase,
            data_path: data.data_path.clone(),
            epochs: data.epochs,
            device: request.device,
            starting_point: starting_point.to_path_buf(),
            output_dir,
            train_args: request.train_args.clone(),
        };

        tracing::info!(
            %phase,
            trainer = self.trainer.id(),
            epochs = invocation.epochs,
            data = %invocation.data_path.display(),
            start = %invocation.starting_point.display(),
            "invoking trainer"
        );

        self.trainer
            .train(&invocation)
            .await
            .map_err(|err| classify_trainer_error(position, &invocation, err))
    }
}

/// Names the phase in scan failures.
fn attribute_to_phase(position: PhasePosition, err: TrainingError) -> TrainingError {
    match err {
        TrainingError::NoCheckpointsProduced { directory, .. } => {
            TrainingError::NoCheckpointsProduced { phase_index: Some(position.index), directory }
        }
        // The trainer never created its output directory: nothing was saved.
        TrainingError::CheckpointDirectory { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
            TrainingError::NoCheckpointsProduced { phase_index: Some(position.index), directory: path }
        }
        other => other,
    }
}

/// Separates missing-input failures from genuine training failures.
fn classify_trainer_error(position: PhasePosition, invocation: &TrainerInvocation, err: anyhow::Error) -> TrainingError {
    let err = match err.downcast::<TrainingError>() {
        Ok(input @ TrainingError::InputData { .. }) => return input,
        Ok(other) => anyhow::Error::new(other),
        Err(err) => err,
    };

    let missing_file = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(|io| io.kind() == std::io::ErrorKind::NotFound);
    if missing_file {
        return TrainingError::InputData {
            phase: position.phase,
            path: invocation.data_path.clone(),
            reason: format!("{err:#}"),
        };
    }

    TrainingError::TrainingExecution {
        phase: position.phase,
        index: position.index,
        total: position.total,
        cause: format!("{err:#}"),
    }
}
