//! Phaseforge Training
//!
//! Resumable multi-phase fine-tuning orchestration:
//! - Selecting a training backend for a (pipeline, strategy, device) triple
//! - Recording completed phases in a crash-safe journal (`PhaseJournal`)
//! - Discovering the checkpoints a phase produced
//! - Running phases in order through an external `Trainer`

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod journal;
pub mod layout;
pub mod orchestrator;
pub mod phase;
pub mod progress;
pub mod request;
pub mod runner;
pub mod trainer;

pub use backend::{select_backend, BackendKind, HostCapabilities};
pub use checkpoint::{best, list_checkpoints, Checkpoint};
pub use config::{BackendCommands, OrchestratorConfig};
pub use error::{TrainingError, TrainingResult};
pub use evaluate::{select_best, CheckpointEvaluator, CommandEvaluator, ScoredCheckpoint};
pub use journal::{PhaseJournal, PhaseRecord, PhaseStatus};
pub use layout::RunLayout;
pub use orchestrator::{OrchestrationOutcome, Orchestrator};
pub use phase::{positions, Phase, PhasePosition, Strategy};
pub use progress::{NullProgressSink, ProgressEvent, ProgressSink, StdoutProgressSink};
pub use request::{Device, PhaseData, Pipeline, TrainArgs, TrainingRequest};
pub use runner::{PhaseOutput, PhaseRunner};
pub use trainer::{CommandSpec, CommandTrainer, Trainer, TrainerInvocation, TrainerSet};
