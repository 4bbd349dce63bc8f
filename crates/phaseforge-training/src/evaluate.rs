use crate::checkpoint::Checkpoint;
use crate::error::{TrainingError, TrainingResult};
use crate::phase::Phase;
use crate::trainer::CommandSpec;
use async_trait::async_trait;

/// Scores a checkpoint with a judge model; higher is better.
#[async_trait]
pub trait CheckpointEvaluator: Send + Sync {
    async fn score(&self, checkpoint: &Checkpoint, judge: &str) -> anyhow::Result<f64>;
}

/// A checkpoint chosen by evaluation, with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCheckpoint {
    pub checkpoint: Checkpoint,
    pub score: f64,
}

/// Scores every candidate and keeps the best; on equal scores the later
/// (higher-ordinal) checkpoint wins.
pub async fn select_best(
    evaluator: &dyn CheckpointEvaluator,
    phase: Phase,
    candidates: &[Checkpoint],
    judge: &str,
) -> TrainingResult<ScoredCheckpoint> {
    let mut best: Option<ScoredCheckpoint> = None;

    for checkpoint in candidates {
        let score = evaluator.score(checkpoint, judge).await.map_err(|e| TrainingError::Evaluation {
            phase,
            cause: format!("{}: {e:#}", checkpoint.path.display()),
        })?;
        if !score.is_finite() {
            return Err(TrainingError::Evaluation {
                phase,
                cause: format!("{}: judge returned a non-finite score", checkpoint.path.display()),
            });
        }
        tracing::info!(%phase, checkpoint = %checkpoint.path.display(), score, "evaluated checkpoint");

        if best.as_ref().is_none_or(|b| score >= b.score) {
            best = Some(ScoredCheckpoint { checkpoint: checkpoint.clone(), score });
        }
    }

    best.ok_or_else(|| TrainingError::Evaluation { phase, cause: "no checkpoints to evaluate".to_string() })
}

/// Runs a configured command per checkpoint; the last non-empty stdout line
/// must be the score.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    spec: CommandSpec,
}

impl CommandEvaluator {
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl CheckpointEvaluator for CommandEvaluator {
    async fn score(&self, checkpoint: &Checkpoint, judge: &str) -> anyhow::Result<f64> {
        let output = tokio::process::Command::new(&self.spec.program)
            .args(&self.spec.args)
            .arg("--checkpoint")
            .arg(&checkpoint.path)
            .arg("--judge")
            .arg(judge)
            .envs(&self.spec.env)
            .env("PHASEFORGE_CHECKPOINT", &checkpoint.path)
            .env("PHASEFORGE_JUDGE", judge)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("failed to launch evaluator '{}': {e}", self.spec.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("evaluator exited with {}: {}", output.status, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let last = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("evaluator printed no score"))?;
        last.trim()
            .parse::<f64>()
            .map_err(|e| anyhow::anyhow!("evaluator printed '{}', not a score: {e}", last.trim()))
    }
}
