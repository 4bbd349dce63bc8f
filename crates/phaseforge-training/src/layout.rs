use crate::phase::Phase;
use std::path::PathBuf;

/// Filesystem layout of a training run.
///
/// Everything lives under the run's output directory:
/// `<root>/phase_journal.json` and `<root>/phases/<phase>/checkpoints/...`
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.root.join("phase_journal.json")
    }

    #[must_use]
    pub fn phase_dir(&self, phase: Phase) -> PathBuf {
        self.root.join("phases").join(phase.as_str())
    }

    /// Directory handed to the trainer as its output directory.
    #[must_use]
    pub fn results_dir(&self, phase: Phase) -> PathBuf {
        self.phase_dir(phase).join("checkpoints")
    }

    /// Gives a pending phase an empty results directory, dropping leftovers
    /// of an earlier failed attempt.
    pub fn reset_results_dir(&self, phase: Phase) -> std::io::Result<PathBuf> {
        let dir = self.results_dir(phase);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => tracing::debug!(path = %dir.display(), "removed stale phase results"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = RunLayout::new(temp.path().to_path_buf());

        assert_eq!(layout.journal_path(), temp.path().join("phase_journal.json"));
        assert!(layout.results_dir(Phase::Skills).to_string_lossy().contains("skills"));
    }

    #[test]
    fn test_reset_results_dir_clears_leftovers() {
        let temp = TempDir::new().unwrap();
        let layout = RunLayout::new(temp.path().to_path_buf());
        let stale = layout.results_dir(Phase::Knowledge).join("checkpoint-3");
        std::fs::create_dir_all(&stale).unwrap();

        let dir = layout.reset_results_dir(Phase::Knowledge).unwrap();
        assert!(dir.exists());
        assert!(!stale.exists());
    }
}
