use crate::error::TrainingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One stage of the fine-tuning curriculum.
///
/// Variants are declared in curriculum order; `Ord` follows that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Knowledge,
    Skills,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Skills => "skills",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Training strategy; decides which phases run and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    LabMultiphase,
    LabSkillsOnly,
}

impl Strategy {
    #[must_use]
    pub fn phases(self) -> &'static [Phase] {
        match self {
            Self::LabMultiphase => &[Phase::Knowledge, Phase::Skills],
            Self::LabSkillsOnly => &[Phase::Skills],
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LabMultiphase => "lab-multiphase",
            Self::LabSkillsOnly => "lab-skills-only",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lab-multiphase" => Ok(Self::LabMultiphase),
            "lab-skills-only" => Ok(Self::LabSkillsOnly),
            other => Err(TrainingError::InvalidRequest(format!(
                "unknown strategy '{other}' (expected lab-multiphase or lab-skills-only)"
            ))),
        }
    }
}

/// Position of a phase within a strategy's phase list (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhasePosition {
    pub phase: Phase,
    pub index: usize,
    pub total: usize,
}

impl PhasePosition {
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.index == 1
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.index == self.total
    }
}

impl fmt::Display for PhasePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Training Phase {}/{}", self.index, self.total)
    }
}

/// Enumerates the strategy's phases with their 1-based positions.
pub fn positions(strategy: Strategy) -> impl Iterator<Item = PhasePosition> {
    let phases = strategy.phases();
    let total = phases.len();
    phases
        .iter()
        .enumerate()
        .map(move |(i, phase)| PhasePosition { phase: *phase, index: i + 1, total })
}
