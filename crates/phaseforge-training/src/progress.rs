use crate::backend::BackendKind;
use crate::phase::PhasePosition;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    RunStarted { backend: BackendKind, trainer: String, total: usize },
    PhaseSkipped { position: PhasePosition, checkpoint: PathBuf },
    PhaseStarted { position: PhasePosition },
    PhaseCompleted { position: PhasePosition, checkpoint: PathBuf },
    RunFinished { checkpoint: PathBuf },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { backend, trainer, total } => {
                println!("Running {total} training phase(s) on the {backend} backend ({trainer})");
            }
            ProgressEvent::PhaseSkipped { position, .. } => {
                println!("SKIPPING: {position}; already in Journal");
            }
            ProgressEvent::PhaseStarted { position } => {
                println!("{position}...");
            }
            ProgressEvent::PhaseCompleted { position, checkpoint } => {
                println!("{position} complete: {}", checkpoint.display());
            }
            ProgressEvent::RunFinished { checkpoint } => {
                println!("Training finished. Final checkpoint: {}", checkpoint.display());
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: ProgressEvent) {}
}
