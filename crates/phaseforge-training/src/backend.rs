//! Backend selection.
//!
//! Resolves a (pipeline, strategy, device) triple to one of the executable
//! backends. Selection is pure so it can run before anything is written.

use crate::error::{TrainingError, TrainingResult};
use crate::phase::Strategy;
use crate::request::{Device, Pipeline};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Lightweight adapter training on Apple silicon.
    LocalAdapter,
    /// One CPU/GPU process.
    SingleProcess,
    /// Multi-accelerator distributed training.
    Distributed,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalAdapter => "local_adapter",
            Self::SingleProcess => "single_process",
            Self::Distributed => "distributed",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostCapabilities {
    pub apple_silicon: bool,
}

impl HostCapabilities {
    #[must_use]
    pub fn probe() -> Self {
        Self { apple_silicon: cfg!(all(target_os = "macos", target_arch = "aarch64")) }
    }
}

pub fn select_backend(
    pipeline: Pipeline,
    strategy: Strategy,
    device: Device,
    host: HostCapabilities,
) -> TrainingResult<BackendKind> {
    let reject = |reason: &str| TrainingError::UnsupportedConfiguration {
        pipeline: pipeline.to_string(),
        device: device.to_string(),
        reason: reason.to_string(),
    };

    let backend = match pipeline {
        Pipeline::Accelerated => {
            if !device.is_accelerator() {
                return Err(reject(
                    "the accelerated pipeline trains on multiple accelerators; use --device cuda or hpu, or pick the simple/full pipeline",
                ));
            }
            BackendKind::Distributed
        }
        Pipeline::Simple if host.apple_silicon => {
            if device.is_accelerator() {
                return Err(reject("adapter training on Apple silicon runs on cpu or mps"));
            }
            BackendKind::LocalAdapter
        }
        Pipeline::Simple => BackendKind::SingleProcess,
        Pipeline::Full => {
            if device.is_accelerator() {
                return Err(reject("the full pipeline runs on cpu or mps; use --pipeline accelerated for GPU training"));
            }
            BackendKind::SingleProcess
        }
    };

    tracing::debug!(%pipeline, %strategy, %device, %backend, "selected training backend");
    Ok(backend)
}
