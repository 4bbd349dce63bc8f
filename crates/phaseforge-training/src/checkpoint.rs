//! Checkpoint discovery.
//!
//! Trainers write one subdirectory per saved checkpoint into their output
//! directory, named `checkpoint-<N>` (or `samples_<N>`), where `N` is an
//! epoch or step marker.

use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub path: PathBuf,
    pub ordinal: u64,
}

const PREFIXES: &[&str] = &["checkpoint-", "samples_"];

fn parse_ordinal(name: &str) -> Option<u64> {
    PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(*prefix))
        .and_then(|rest| rest.parse::<u64>().ok())
}

/// Lists checkpoints in `directory`, ascending by ordinal.
pub fn list_checkpoints(directory: &Path) -> TrainingResult<Vec<Checkpoint>> {
    let entries = std::fs::read_dir(directory).map_err(|source| TrainingError::CheckpointDirectory {
        path: directory.to_path_buf(),
        source,
    })?;

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| TrainingError::CheckpointDirectory {
            path: directory.to_path_buf(),
            source,
        })?;
        if !entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
            continue;
        }
        let Some(ordinal) = entry.file_name().to_str().and_then(parse_ordinal) else {
            continue;
        };
        out.push(Checkpoint { path: entry.path(), ordinal });
    }

    out.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.path.cmp(&b.path)));
    Ok(out)
}

/// Highest-ordinal checkpoint in `directory`.
pub fn best(directory: &Path) -> TrainingResult<Checkpoint> {
    list_checkpoints(directory)?
        .pop()
        .ok_or_else(|| TrainingError::NoCheckpointsProduced { phase_index: None, directory: directory.to_path_buf() })
}
