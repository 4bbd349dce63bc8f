use crate::backend::BackendKind;
use crate::error::{TrainingError, TrainingResult};
use crate::phase::Phase;
use crate::request::{Device, TrainArgs};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a trainer needs to run one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerInvocation {
    pub phase: Phase,
    pub data_path: PathBuf,
    pub epochs: u32,
    pub device: Device,
    /// Base model for the first phase, the previous phase's checkpoint otherwise.
    pub starting_point: PathBuf,
    /// Where checkpoints are expected to appear.
    pub output_dir: PathBuf,
    pub train_args: TrainArgs,
}

/// External training collaborator.
///
/// `train` blocks (asynchronously) until the trainer finishes and returns the
/// directory it wrote checkpoints into. It may write zero checkpoints; the
/// caller checks.
#[async_trait]
pub trait Trainer: Send + Sync {
    fn id(&self) -> &str;

    async fn train(&self, invocation: &TrainerInvocation) -> anyhow::Result<PathBuf>;
}

/// Trainers available to this process, one per backend.
#[derive(Clone, Default)]
pub struct TrainerSet {
    trainers: HashMap<BackendKind, Arc<dyn Trainer>>,
}

impl TrainerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, backend: BackendKind, trainer: Arc<dyn Trainer>) -> Self {
        self.trainers.insert(backend, trainer);
        self
    }

    pub fn insert(&mut self, backend: BackendKind, trainer: Arc<dyn Trainer>) {
        self.trainers.insert(backend, trainer);
    }

    pub fn resolve(&self, backend: BackendKind) -> TrainingResult<Arc<dyn Trainer>> {
        self.trainers.get(&backend).cloned().ok_or_else(|| {
            TrainingError::Config(format!(
                "no trainer is configured for the {backend} backend; add a [backends.{backend}] command"
            ))
        })
    }
}

impl std::fmt::Debug for TrainerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.trainers.iter().map(|(k, t)| (*k, t.id().to_string())).collect();
        ids.sort();
        f.debug_struct("TrainerSet").field("trainers", &ids).finish()
    }
}

/// External program launched for every phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Runs a configured command as the trainer.
///
/// The invocation is passed both as trailing flags and as `PHASEFORGE_*`
/// environment variables. A non-zero exit is reported with the tail of the
/// command's stderr.
#[derive(Debug, Clone)]
pub struct CommandTrainer {
    id: String,
    spec: CommandSpec,
}

const STDERR_TAIL_LINES: usize = 20;

impl CommandTrainer {
    #[must_use]
    pub fn new(id: impl Into<String>, spec: CommandSpec) -> Self {
        Self { id: id.into(), spec }
    }

    fn command(&self, invocation: &TrainerInvocation) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .arg("--phase")
            .arg(invocation.phase.as_str())
            .arg("--data-path")
            .arg(&invocation.data_path)
            .arg("--num-epochs")
            .arg(invocation.epochs.to_string())
            .arg("--device")
            .arg(invocation.device.as_str())
            .arg("--model-path")
            .arg(&invocation.starting_point)
            .arg("--output-dir")
            .arg(&invocation.output_dir);
        if invocation.train_args.checkpoint_full_state {
            cmd.arg("--checkpoint-full-state");
        }

        let args = &invocation.train_args;
        cmd.envs(&self.spec.env)
            .env("PHASEFORGE_PHASE", invocation.phase.as_str())
            .env("PHASEFORGE_DATA_PATH", &invocation.data_path)
            .env("PHASEFORGE_NUM_EPOCHS", invocation.epochs.to_string())
            .env("PHASEFORGE_DEVICE", invocation.device.as_str())
            .env("PHASEFORGE_MODEL_PATH", &invocation.starting_point)
            .env("PHASEFORGE_OUTPUT_DIR", &invocation.output_dir)
            .env("PHASEFORGE_CHECKPOINT_FULL_STATE", if args.checkpoint_full_state { "1" } else { "0" })
            .env("PHASEFORGE_SEED", args.seed.to_string())
            .env("PHASEFORGE_LEARNING_RATE", args.learning_rate.to_string())
            .env("PHASEFORGE_EFFECTIVE_BATCH_SIZE", args.effective_batch_size.to_string())
            .env("PHASEFORGE_MAX_SEQ_LEN", args.max_seq_len.to_string())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::piped());
        cmd
    }
}

#[async_trait]
impl Trainer for CommandTrainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn train(&self, invocation: &TrainerInvocation) -> anyhow::Result<PathBuf> {
        tracing::debug!(trainer = %self.id, program = %self.spec.program, phase = %invocation.phase, "launching trainer");

        let output = self.command(invocation).output().await.map_err(|e| {
            anyhow::anyhow!("failed to launch trainer command '{}': {e}", self.spec.program)
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            tracing::debug!(trainer = %self.id, "{line}");
        }

        if !output.status.success() {
            let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            if tail.is_empty() {
                anyhow::bail!("trainer command '{}' exited with {}", self.spec.program, output.status);
            }
            anyhow::bail!("{tail}");
        }

        Ok(invocation.output_dir.clone())
    }
}
