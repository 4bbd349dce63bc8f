use crate::error::{TrainingError, TrainingResult};
use crate::phase::{Phase, Strategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    /// Lightweight adapter training (Apple silicon) or a Linux single-process fallback.
    Simple,
    /// Full fine-tuning on a single CPU/MPS process.
    Full,
    /// Multi-GPU distributed training.
    Accelerated,
}

impl Pipeline {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Full => "full",
            Self::Accelerated => "accelerated",
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pipeline {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "full" => Ok(Self::Full),
            "accelerated" => Ok(Self::Accelerated),
            other => Err(TrainingError::InvalidRequest(format!(
                "unknown pipeline '{other}' (expected simple, full or accelerated)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Cuda,
    Hpu,
    Mps,
}

impl Device {
    /// Accelerator-class devices usable by the distributed backend.
    #[must_use]
    pub fn is_accelerator(self) -> bool {
        matches!(self, Self::Cuda | Self::Hpu)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Hpu => "hpu",
            Self::Mps => "mps",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "hpu" => Ok(Self::Hpu),
            "mps" => Ok(Self::Mps),
            other => Err(TrainingError::InvalidRequest(format!(
                "unknown device '{other}' (expected cpu, cuda, hpu or mps)"
            ))),
        }
    }
}

/// Data and epoch count for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseData {
    pub data_path: PathBuf,
    pub epochs: u32,
}

impl PhaseData {
    #[must_use]
    pub fn new(data_path: impl Into<PathBuf>, epochs: u32) -> Self {
        Self { data_path: data_path.into(), epochs }
    }
}

/// Knobs forwarded verbatim to the trainer.
///
/// `checkpoint_full_state` (on by default) has the trainer save full optimizer
/// and model state at every epoch; the orchestrator does not interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainArgs {
    pub checkpoint_full_state: bool,
    pub seed: u64,
    pub learning_rate: f64,
    pub effective_batch_size: u32,
    pub max_seq_len: u32,
}

impl Default for TrainArgs {
    fn default() -> Self {
        Self {
            checkpoint_full_state: true,
            seed: 42,
            learning_rate: 2e-5,
            effective_batch_size: 128,
            max_seq_len: 4096,
        }
    }
}

impl TrainArgs {
    pub fn validate(&self) -> TrainingResult<()> {
        if !(self.learning_rate.is_finite()) || self.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidRequest("learning_rate must be > 0".to_string()));
        }
        if self.effective_batch_size == 0 {
            return Err(TrainingError::InvalidRequest("effective_batch_size must be >= 1".to_string()));
        }
        if self.max_seq_len == 0 {
            return Err(TrainingError::InvalidRequest("max_seq_len must be >= 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub pipeline: Pipeline,
    pub strategy: Strategy,
    pub device: Device,
    /// Starting point of the first phase.
    pub base_model: PathBuf,
    /// Run scope: the journal and every phase's results live below it.
    pub output_dir: PathBuf,
    pub knowledge: Option<PhaseData>,
    pub skills: Option<PhaseData>,
    /// Judge model reference used to score final-phase checkpoints.
    pub judge: Option<String>,
    pub train_args: TrainArgs,
}

impl TrainingRequest {
    #[must_use]
    pub fn new(
        pipeline: Pipeline,
        strategy: Strategy,
        device: Device,
        base_model: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline,
            strategy,
            device,
            base_model: base_model.into(),
            output_dir: output_dir.into(),
            knowledge: None,
            skills: None,
            judge: None,
            train_args: TrainArgs::default(),
        }
    }

    #[must_use]
    pub fn with_phase_data(mut self, phase: Phase, data: PhaseData) -> Self {
        match phase {
            Phase::Knowledge => self.knowledge = Some(data),
            Phase::Skills => self.skills = Some(data),
        }
        self
    }

    #[must_use]
    pub fn with_judge(mut self, judge: impl Into<String>) -> Self {
        self.judge = Some(judge.into());
        self
    }

    #[must_use]
    pub fn with_train_args(mut self, train_args: TrainArgs) -> Self {
        self.train_args = train_args;
        self
    }

    #[must_use]
    pub fn phase_data(&self, phase: Phase) -> Option<&PhaseData> {
        match phase {
            Phase::Knowledge => self.knowledge.as_ref(),
            Phase::Skills => self.skills.as_ref(),
        }
    }

    /// Structural checks; performs no filesystem access.
    pub fn validate(&self) -> TrainingResult<()> {
        for phase in self.strategy.phases() {
            let data = self.phase_data(*phase).ok_or_else(|| {
                TrainingError::InvalidRequest(format!(
                    "strategy {} requires data for the {phase} phase",
                    self.strategy
                ))
            })?;
            if data.epochs == 0 {
                return Err(TrainingError::InvalidRequest(format!("{phase} epochs must be >= 1")));
            }
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(TrainingError::InvalidRequest("output_dir is required".to_string()));
        }
        if self.base_model.as_os_str().is_empty() {
            return Err(TrainingError::InvalidRequest("base_model is required".to_string()));
        }
        if let Some(judge) = &self.judge {
            if judge.trim().is_empty() {
                return Err(TrainingError::InvalidRequest("judge must not be blank".to_string()));
            }
        }
        self.train_args.validate()
    }

    /// Confirms the phase's data file exists and is non-empty.
    pub fn check_input_data(&self, phase: Phase) -> TrainingResult<()> {
        let data = self.phase_data(phase).ok_or_else(|| TrainingError::InputData {
            phase,
            path: PathBuf::new(),
            reason: "no data path was provided".to_string(),
        })?;
        check_data_file(phase, &data.data_path)
    }
}

fn check_data_file(phase: Phase, path: &Path) -> TrainingResult<()> {
    let unusable = |reason: String| TrainingError::InputData { phase, path: path.to_path_buf(), reason };

    let metadata = match std::fs::metadata(path) {
        Ok(md) => md,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(unusable("file does not exist".to_string()));
        }
        Err(e) => return Err(unusable(e.to_string())),
    };
    if !metadata.is_file() {
        return Err(unusable("not a regular file".to_string()));
    }
    if metadata.len() == 0 {
        return Err(unusable("file is empty".to_string()));
    }
    Ok(())
}
