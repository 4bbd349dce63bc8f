//! Command implementations for the Phaseforge CLI.

pub mod journal;
pub mod train;

use phaseforge_training::OrchestratorConfig;
use std::path::{Path, PathBuf};

/// Run scope used when neither `--output-dir` nor the configuration names one.
const DEFAULT_OUTPUT_DIR: &str = "phased";

fn resolve_output_dir(flag: Option<&Path>, config: &OrchestratorConfig) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}
