use crate::phase::Phase;
use std::path::PathBuf;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    /// The (pipeline, strategy, device) triple cannot be served by any backend.
    #[error("unsupported configuration: device '{device}' cannot be used with pipeline '{pipeline}': {reason}")]
    UnsupportedConfiguration { pipeline: String, device: String, reason: String },

    #[error("invalid training request: {0}")]
    InvalidRequest(String),

    #[error("input data for phase {phase} is unusable ({}): {reason}", .path.display())]
    InputData { phase: Phase, path: PathBuf, reason: String },

    #[error("Failed during training loop: {cause} (Training Phase {index}/{total}, {phase})")]
    TrainingExecution { phase: Phase, index: usize, total: usize, cause: String },

    #[error("{}", no_checkpoints_message(.phase_index, .directory))]
    NoCheckpointsProduced { phase_index: Option<usize>, directory: PathBuf },

    #[error("cannot read checkpoint directory {}: {source}", .path.display())]
    CheckpointDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("evaluation of phase {phase} checkpoints failed: {cause}")]
    Evaluation { phase: Phase, cause: String },

    #[error("journal error: {0}")]
    Journal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn no_checkpoints_message(phase_index: &Option<usize>, directory: &PathBuf) -> String {
    let origin = match phase_index {
        Some(index) => format!("from phase {index}"),
        None => "by training".to_string(),
    };
    format!(
        "no checkpoints were saved {origin} (searched {}); training likely did not persist any checkpoint for this phase",
        directory.display()
    )
}

impl TrainingError {
    /// Whether the error was raised before any phase could start.
    #[must_use]
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedConfiguration { .. } | Self::InvalidRequest(_) | Self::InputData { .. } | Self::Config(_)
        )
    }
}
