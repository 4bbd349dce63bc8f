//! Durable record of completed phases.
//!
//! The journal is the only state that survives between invocations. It is
//! written once per completed phase, by writing a sibling temp file and
//! renaming it over the journal, so a crash mid-write leaves the previous
//! journal intact.

use crate::error::{TrainingError, TrainingResult};
use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<PathBuf>,
    /// Model the phase trained from: the base model or the previous phase's checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_point: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Judge score of the selected checkpoint, when the phase was evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl PhaseRecord {
    #[must_use]
    pub fn pending(phase: Phase) -> Self {
        Self { phase, status: PhaseStatus::Pending, checkpoint: None, starting_point: None, completed_at: None, score: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalFile {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    phases: Vec<PhaseRecord>,
}

#[derive(Debug, Clone)]
pub struct PhaseJournal {
    path: PathBuf,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    records: Vec<PhaseRecord>,
}

impl PhaseJournal {
    /// Loads the journal at `path`, adding a pending record for each requested
    /// phase the file does not mention. A missing file is a first run.
    pub fn load(path: impl AsRef<Path>, phases: &[Phase]) -> TrainingResult<Self> {
        let path = path.as_ref().to_path_buf();

        let (created_at, updated_at, mut records) = match std::fs::read_to_string(&path) {
            Ok(json) => {
                let file: JournalFile = serde_json::from_str(&json).map_err(|e| {
                    TrainingError::Journal(format!("failed to parse journal {}: {e}", path.display()))
                })?;
                (file.created_at, file.updated_at, file.phases)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let now = Utc::now();
                (now, now, Vec::new())
            }
            Err(e) => return Err(e.into()),
        };

        for phase in phases {
            if !records.iter().any(|r| r.phase == *phase) {
                records.push(PhaseRecord::pending(*phase));
            }
        }
        records.sort_by_key(|r| r.phase);

        tracing::debug!(
            path = %path.display(),
            complete = records.iter().filter(|r| r.status == PhaseStatus::Complete).count(),
            "loaded phase journal"
        );

        Ok(Self { path, created_at, updated_at, records })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn records(&self) -> &[PhaseRecord] {
        &self.records
    }

    #[must_use]
    pub fn record(&self, phase: Phase) -> Option<&PhaseRecord> {
        self.records.iter().find(|r| r.phase == phase)
    }

    #[must_use]
    pub fn is_complete(&self, phase: Phase) -> bool {
        self.record(phase).is_some_and(|r| r.status == PhaseStatus::Complete)
    }

    #[must_use]
    pub fn checkpoint_for(&self, phase: Phase) -> Option<&Path> {
        self.record(phase)
            .filter(|r| r.status == PhaseStatus::Complete)
            .and_then(|r| r.checkpoint.as_deref())
    }

    /// Model a completed phase trained from, when the journal recorded it.
    #[must_use]
    pub fn starting_point_for(&self, phase: Phase) -> Option<&Path> {
        self.record(phase)
            .filter(|r| r.status == PhaseStatus::Complete)
            .and_then(|r| r.starting_point.as_deref())
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Marks `phase` complete and persists the journal before returning.
    ///
    /// The in-memory record is only updated once the write has landed.
    pub fn record_complete(
        &mut self,
        phase: Phase,
        starting_point: &Path,
        checkpoint: &Path,
        score: Option<f64>,
    ) -> TrainingResult<()> {
        let index = self
            .records
            .iter()
            .position(|r| r.phase == phase)
            .ok_or_else(|| TrainingError::Journal(format!("phase {phase} is not tracked by this journal")))?;
        if self.records[index].status == PhaseStatus::Complete {
            return Err(TrainingError::Journal(format!("phase {phase} is already complete")));
        }

        let now = Utc::now();
        let mut records = self.records.clone();
        records[index] = PhaseRecord {
            phase,
            status: PhaseStatus::Complete,
            checkpoint: Some(checkpoint.to_path_buf()),
            starting_point: Some(starting_point.to_path_buf()),
            completed_at: Some(now),
            score,
        };

        let file = JournalFile { created_at: self.created_at, updated_at: now, phases: records };
        write_atomic(&self.path, &file)?;

        self.records = file.phases;
        self.updated_at = now;
        tracing::info!(%phase, checkpoint = %checkpoint.display(), "recorded phase in journal");
        Ok(())
    }
}

fn write_atomic(path: &Path, file: &JournalFile) -> TrainingResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(file)?;

    let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    {
        let mut out = std::fs::File::create(&temp_path)?;
        out.write_all(json.as_bytes())?;
        out.sync_all()?;
    }
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
