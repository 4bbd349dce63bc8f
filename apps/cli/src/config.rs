//! CLI configuration loading and merging.

use anyhow::Context;
use phaseforge_training::OrchestratorConfig;
use std::collections::HashMap;
use std::path::Path;

/// Load and merge CLI configuration.
///
/// Configuration precedence:
/// 1. CLI arguments (handled by clap, applied by each command)
/// 2. `PHASEFORGE_*` environment variables
/// 3. Explicit `--config` file
/// 4. Local config file (./.phaseforge.toml)
/// 5. Global config file (~/.phaseforge/config.toml)
/// 6. Defaults
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<OrchestratorConfig> {
    let home = dirs::home_dir();
    let mut config = OrchestratorConfig::discover_and_load(home.as_deref(), explicit)
        .context("Failed to load configuration")?;

    let vars: HashMap<String, String> = std::env::vars().filter(|(k, _)| k.starts_with("PHASEFORGE_")).collect();
    config.apply_env(&vars).context("Invalid PHASEFORGE_* environment override")?;

    Ok(config)
}
