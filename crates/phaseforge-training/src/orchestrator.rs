//! Phase orchestration.
//!
//! Drives a strategy's phases in order. Completed phases (per the journal) are
//! skipped and their checkpoint is carried forward; pending phases are run and
//! recorded only once a checkpoint is confirmed. The first failure ends the
//! run and leaves the journal as it was.

use crate::backend::{select_backend, BackendKind, HostCapabilities};
use crate::checkpoint::Checkpoint;
use crate::error::{TrainingError, TrainingResult};
use crate::evaluate::{select_best, CheckpointEvaluator};
use crate::journal::PhaseJournal;
use crate::layout::RunLayout;
use crate::phase::{positions, Phase, PhasePosition};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::request::TrainingRequest;
use crate::runner::PhaseRunner;
use crate::trainer::TrainerSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationOutcome {
    pub backend: BackendKind,
    pub final_checkpoint: PathBuf,
    pub executed: Vec<Phase>,
    pub skipped: Vec<Phase>,
}

pub struct Orchestrator<'a> {
    trainers: &'a TrainerSet,
    host: HostCapabilities,
    progress: &'a dyn ProgressSink,
    evaluator: Option<&'a dyn CheckpointEvaluator>,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(trainers: &'a TrainerSet, host: HostCapabilities, progress: &'a dyn ProgressSink) -> Self {
        Self { trainers, host, progress, evaluator: None }
    }

    /// Judges the final phase's checkpoints when the request names a judge.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: &'a dyn CheckpointEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub async fn run(&self, request: &TrainingRequest) -> TrainingResult<OrchestrationOutcome> {
        let (runner, mut journal, backend) = self.preflight(request)?;
        let total = request.strategy.phases().len();

        self.progress.on_event(ProgressEvent::RunStarted {
            backend,
            trainer: runner.trainer_id().to_string(),
            total,
        });

        let mut carry = request.base_model.clone();
        let mut executed = Vec::new();
        let mut skipped = Vec::new();

        for position in positions(request.strategy) {
            let phase = position.phase;

            if let Some(checkpoint) = journal.checkpoint_for(phase) {
                let checkpoint = checkpoint.to_path_buf();
                tracing::info!(%phase, "skipping phase already recorded in journal");
                self.progress.on_event(ProgressEvent::PhaseSkipped { position, checkpoint: checkpoint.clone() });
                carry = checkpoint;
                skipped.push(phase);
                continue;
            }

            tracing::info!(%phase, index = position.index, total, "starting phase");
            self.progress.on_event(ProgressEvent::PhaseStarted { position });

            let (checkpoint, score) = match self.run_phase(&runner, position, request, &carry).await {
                Ok(selected) => selected,
                Err(e) => {
                    tracing::debug!(%phase, error = %e, "phase failed; journal left unchanged");
                    return Err(e);
                }
            };

            journal.record_complete(phase, &carry, &checkpoint.path, score)?;
            self.progress.on_event(ProgressEvent::PhaseCompleted { position, checkpoint: checkpoint.path.clone() });
            carry = checkpoint.path;
            executed.push(phase);
        }

        self.progress.on_event(ProgressEvent::RunFinished { checkpoint: carry.clone() });
        Ok(OrchestrationOutcome { backend, final_checkpoint: carry, executed, skipped })
    }

    /// Everything that must hold before any phase starts. Writes nothing.
    fn preflight(&self, request: &TrainingRequest) -> TrainingResult<(PhaseRunner, PhaseJournal, BackendKind)> {
        request.validate()?;
        let backend = select_backend(request.pipeline, request.strategy, request.device, self.host)?;
        let trainer = self.trainers.resolve(backend)?;

        let layout = RunLayout::new(request.output_dir.clone());
        let journal = PhaseJournal::load(layout.journal_path(), request.strategy.phases())?;

        check_resume_chain(request, &journal)?;
        for phase in request.strategy.phases() {
            if !journal.is_complete(*phase) {
                request.check_input_data(*phase)?;
            }
        }

        Ok((PhaseRunner::new(trainer, layout), journal, backend))
    }

    async fn run_phase(
        &self,
        runner: &PhaseRunner,
        position: PhasePosition,
        request: &TrainingRequest,
        starting_point: &Path,
    ) -> TrainingResult<(Checkpoint, Option<f64>)> {
        match (self.evaluator, request.judge.as_deref()) {
            (Some(evaluator), Some(judge)) if position.is_last() => {
                let output = runner.execute(position, request, starting_point).await?;
                let best = select_best(evaluator, position.phase, &output.checkpoints, judge).await?;
                Ok((best.checkpoint, Some(best.score)))
            }
            _ => Ok((runner.run(position, request, starting_point).await?, None)),
        }
    }
}

/// A completed phase is only reusable if its checkpoint is still on disk and it
/// trained from exactly what this run would hand it.
fn check_resume_chain(request: &TrainingRequest, journal: &PhaseJournal) -> TrainingResult<()> {
    // `None` once an earlier phase is going to be retrained.
    let mut carry = Some(request.base_model.clone());

    for &phase in request.strategy.phases() {
        if !journal.is_complete(phase) {
            carry = None;
            continue;
        }

        let checkpoint = journal.checkpoint_for(phase).ok_or_else(|| {
            TrainingError::Journal(format!("phase {phase} is complete but has no recorded checkpoint"))
        })?;
        if !checkpoint.exists() {
            return Err(TrainingError::Journal(format!(
                "phase {phase} is recorded complete but its checkpoint {} no longer exists; remove {} to retrain",
                checkpoint.display(),
                journal.path().display()
            )));
        }

        match (&carry, journal.starting_point_for(phase)) {
            (None, _) => {
                return Err(TrainingError::Journal(format!(
                    "phase {phase} is recorded complete, but an earlier phase of this run has not; \
                     its checkpoint would not build on the retrained output. Remove {} to retrain",
                    journal.path().display()
                )));
            }
            (Some(expected), Some(recorded)) if recorded != expected.as_path() => {
                return Err(TrainingError::Journal(format!(
                    "phase {phase} was trained from {} but this run would start it from {}",
                    recorded.display(),
                    expected.display()
                )));
            }
            _ => {}
        }
        carry = Some(checkpoint.to_path_buf());
    }
    Ok(())
}
