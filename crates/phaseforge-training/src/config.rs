//! Configuration file support.
//!
//! The configuration is read once at the process boundary and handed to
//! components by reference.

use crate::backend::BackendKind;
use crate::error::{TrainingError, TrainingResult};
use crate::trainer::{CommandSpec, CommandTrainer, TrainerSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-backend trainer commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCommands {
    #[serde(default)]
    pub local_adapter: Option<CommandSpec>,
    #[serde(default)]
    pub single_process: Option<CommandSpec>,
    #[serde(default)]
    pub distributed: Option<CommandSpec>,
}

impl BackendCommands {
    fn merge(&mut self, other: &Self) {
        if other.local_adapter.is_some() {
            self.local_adapter.clone_from(&other.local_adapter);
        }
        if other.single_process.is_some() {
            self.single_process.clone_from(&other.single_process);
        }
        if other.distributed.is_some() {
            self.distributed.clone_from(&other.distributed);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Base model (and tokenizer) the first phase starts from.
    #[serde(default)]
    pub base_model: Option<PathBuf>,

    /// Where phase data files are looked up when given as bare names.
    #[serde(default)]
    pub datasets_dir: Option<PathBuf>,

    /// Default run scope.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default = "default_knowledge_epochs")]
    pub knowledge_epochs: u32,

    #[serde(default = "default_skills_epochs")]
    pub skills_epochs: u32,

    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub backends: BackendCommands,

    /// Command that scores a checkpoint against a judge model.
    #[serde(default)]
    pub evaluator: Option<CommandSpec>,
}

/// One configuration file. Only the keys a file actually sets override the
/// layers below it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    base_model: Option<PathBuf>,
    datasets_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    knowledge_epochs: Option<u32>,
    skills_epochs: Option<u32>,
    log_level: Option<String>,
    backends: BackendCommands,
    evaluator: Option<CommandSpec>,
}

impl ConfigLayer {
    fn read(path: &Path) -> TrainingResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TrainingError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| TrainingError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

fn default_knowledge_epochs() -> u32 {
    7
}

fn default_skills_epochs() -> u32 {
    10
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_model: None,
            datasets_dir: None,
            output_dir: None,
            knowledge_epochs: default_knowledge_epochs(),
            skills_epochs: default_skills_epochs(),
            log_level: None,
            backends: BackendCommands::default(),
            evaluator: None,
        }
    }
}

impl OrchestratorConfig {
    /// `~/.phaseforge/config.toml`
    #[must_use]
    pub fn default_global_path(home: Option<&Path>) -> Option<PathBuf> {
        home.map(|h| h.join(".phaseforge").join("config.toml"))
    }

    /// `./.phaseforge.toml`
    #[must_use]
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".phaseforge.toml")
    }

    /// Loads and merges, in increasing precedence: defaults, global file,
    /// local file, then `explicit` (which must exist if given).
    pub fn discover_and_load(home: Option<&Path>, explicit: Option<&Path>) -> TrainingResult<Self> {
        let mut config = Self::default();

        if let Some(global) = Self::default_global_path(home) {
            if global.exists() {
                config.apply_layer(ConfigLayer::read(&global)?);
            }
        }

        let local = Self::default_local_path();
        if local.exists() {
            config.apply_layer(ConfigLayer::read(&local)?);
        }

        if let Some(path) = explicit {
            config.apply_layer(ConfigLayer::read(path)?);
        }

        Ok(config)
    }

    fn apply_layer(&mut self, layer: ConfigLayer) {
        if layer.base_model.is_some() {
            self.base_model = layer.base_model;
        }
        if layer.datasets_dir.is_some() {
            self.datasets_dir = layer.datasets_dir;
        }
        if layer.output_dir.is_some() {
            self.output_dir = layer.output_dir;
        }
        if layer.log_level.is_some() {
            self.log_level = layer.log_level;
        }
        if let Some(n) = layer.knowledge_epochs {
            self.knowledge_epochs = n;
        }
        if let Some(n) = layer.skills_epochs {
            self.skills_epochs = n;
        }
        self.backends.merge(&layer.backends);
        if layer.evaluator.is_some() {
            self.evaluator = layer.evaluator;
        }
    }

    /// Applies `PHASEFORGE_*` overrides from an already captured environment.
    pub fn apply_env(&mut self, vars: &HashMap<String, String>) -> TrainingResult<()> {
        let path = |key: &str| vars.get(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        let epochs = |key: &str| -> TrainingResult<Option<u32>> {
            vars.get(key)
                .map(|v| {
                    v.parse::<u32>()
                        .map_err(|e| TrainingError::Config(format!("{key}={v} is not a valid epoch count: {e}")))
                })
                .transpose()
        };

        if let Some(p) = path("PHASEFORGE_BASE_MODEL") {
            self.base_model = Some(p);
        }
        if let Some(p) = path("PHASEFORGE_DATASETS_DIR") {
            self.datasets_dir = Some(p);
        }
        if let Some(p) = path("PHASEFORGE_OUTPUT_DIR") {
            self.output_dir = Some(p);
        }
        if let Some(n) = epochs("PHASEFORGE_KNOWLEDGE_EPOCHS")? {
            self.knowledge_epochs = n;
        }
        if let Some(n) = epochs("PHASEFORGE_SKILLS_EPOCHS")? {
            self.skills_epochs = n;
        }
        if let Some(level) = vars.get("PHASEFORGE_LOG_LEVEL") {
            self.log_level = Some(level.clone());
        }
        Ok(())
    }

    /// Resolves a data path: relative paths that do not exist as given are
    /// looked up under `datasets_dir`.
    #[must_use]
    pub fn resolve_data_path(&self, path: &Path) -> PathBuf {
        match &self.datasets_dir {
            Some(dir) if path.is_relative() && !path.exists() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Builds one `CommandTrainer` per configured backend.
    #[must_use]
    pub fn trainer_set(&self) -> TrainerSet {
        let mut set = TrainerSet::new();
        let configured = [
            (BackendKind::LocalAdapter, &self.backends.local_adapter),
            (BackendKind::SingleProcess, &self.backends.single_process),
            (BackendKind::Distributed, &self.backends.distributed),
        ];
        for (kind, spec) in configured {
            if let Some(spec) = spec {
                set.insert(kind, Arc::new(CommandTrainer::new(kind.as_str(), spec.clone())));
            }
        }
        set
    }
}
