//! End-to-end orchestration tests against a scripted in-process trainer.

use async_trait::async_trait;
use phaseforge_training::{
    BackendKind, Checkpoint, CheckpointEvaluator, Device, HostCapabilities, Orchestrator, Phase, PhaseData,
    PhaseJournal, Pipeline, ProgressEvent, ProgressSink, RunLayout, Strategy, TrainArgs, Trainer, TrainerInvocation,
    TrainerSet, TrainingError, TrainingRequest,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// What the scripted trainer does for a phase.
#[derive(Clone)]
enum Behavior {
    Fail(&'static str),
    Save(Vec<u64>),
    SaveNothing,
}

#[derive(Default)]
struct ScriptedTrainer {
    behaviors: Mutex<HashMap<Phase, Behavior>>,
    calls: Mutex<Vec<TrainerInvocation>>,
}

impl ScriptedTrainer {
    fn with(self, phase: Phase, behavior: Behavior) -> Self {
        self.behaviors.lock().unwrap().insert(phase, behavior);
        self
    }

    fn calls(&self) -> Vec<TrainerInvocation> {
        self.calls.lock().unwrap().clone()
    }

    fn called_phases(&self) -> Vec<Phase> {
        self.calls().into_iter().map(|c| c.phase).collect()
    }
}

#[async_trait]
impl Trainer for ScriptedTrainer {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn train(&self, invocation: &TrainerInvocation) -> anyhow::Result<PathBuf> {
        self.calls.lock().unwrap().push(invocation.clone());
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&invocation.phase)
            .cloned()
            .unwrap_or(Behavior::Save(vec![1]));

        match behavior {
            Behavior::Fail(msg) => anyhow::bail!("{msg}"),
            Behavior::SaveNothing => {}
            Behavior::Save(ordinals) => {
                for n in ordinals {
                    std::fs::create_dir_all(invocation.output_dir.join(format!("checkpoint-{n}")))?;
                }
            }
        }
        Ok(invocation.output_dir.clone())
    }
}

#[derive(Default)]
struct RecordingSink(Mutex<Vec<ProgressEvent>>);

impl RecordingSink {
    fn skipped(&self) -> Vec<Phase> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::PhaseSkipped { position, .. } => Some(position.phase),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn on_event(&self, event: ProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}

struct Fixture {
    temp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("knowledge.jsonl"), "{\"text\":\"k\"}\n").unwrap();
        std::fs::write(temp.path().join("skills.jsonl"), "{\"text\":\"s\"}\n").unwrap();
        Self { temp }
    }

    fn out(&self) -> PathBuf {
        self.temp.path().join("out")
    }

    fn request(&self, strategy: Strategy) -> TrainingRequest {
        TrainingRequest::new(Pipeline::Accelerated, strategy, Device::Cuda, self.temp.path().join("base"), self.out())
            .with_phase_data(Phase::Knowledge, PhaseData::new(self.temp.path().join("knowledge.jsonl"), 7))
            .with_phase_data(Phase::Skills, PhaseData::new(self.temp.path().join("skills.jsonl"), 10))
    }

    fn journal(&self) -> PhaseJournal {
        PhaseJournal::load(RunLayout::new(self.out()).journal_path(), &[Phase::Knowledge, Phase::Skills]).unwrap()
    }
}

const HOST: HostCapabilities = HostCapabilities { apple_silicon: false };

fn trainers(trainer: &Arc<ScriptedTrainer>) -> TrainerSet {
    TrainerSet::new().with(BackendKind::Distributed, trainer.clone())
}

#[tokio::test]
async fn test_multiphase_runs_both_phases_in_order() {
    let fx = Fixture::new();
    let trainer = Arc::new(ScriptedTrainer::default().with(Phase::Knowledge, Behavior::Save(vec![1, 2])));
    let set = trainers(&trainer);
    let sink = RecordingSink::default();

    let outcome = Orchestrator::new(&set, HOST, &sink).run(&fx.request(Strategy::LabMultiphase)).await.unwrap();

    assert_eq!(outcome.backend, BackendKind::Distributed);
    assert_eq!(outcome.executed, vec![Phase::Knowledge, Phase::Skills]);
    assert!(outcome.skipped.is_empty());

    let calls = trainer.calls();
    assert_eq!(trainer.called_phases(), vec![Phase::Knowledge, Phase::Skills]);
    assert_eq!(calls[0].starting_point, fx.temp.path().join("base"));
    assert_eq!(calls[0].epochs, 7);
    // Phase 2 starts from phase 1's highest checkpoint.
    assert!(calls[1].starting_point.ends_with("checkpoint-2"));
    assert_eq!(calls[1].epochs, 10);

    let journal = fx.journal();
    assert!(journal.is_complete(Phase::Knowledge));
    assert!(journal.is_complete(Phase::Skills));
    assert_eq!(journal.checkpoint_for(Phase::Skills), Some(outcome.final_checkpoint.as_path()));
}

#[tokio::test]
async fn test_skills_only_never_touches_knowledge() {
    let fx = Fixture::new();
    let trainer = Arc::new(ScriptedTrainer::default());
    let set = trainers(&trainer);
    let sink = RecordingSink::default();
    let mut request = fx.request(Strategy::LabSkillsOnly);
    request.knowledge = None;

    let outcome = Orchestrator::new(&set, HOST, &sink).run(&request).await.unwrap();

    assert_eq!(trainer.called_phases(), vec![Phase::Skills]);
    assert_eq!(trainer.calls()[0].starting_point, fx.temp.path().join("base"));
    assert_eq!(outcome.executed, vec![Phase::Skills]);
    assert!(!fx.journal().is_complete(Phase::Knowledge));
}

#[tokio::test]
async fn test_resume_skips_completed_phase() {
    let fx = Fixture::new();
    let first = Arc::new(ScriptedTrainer::default().with(Phase::Skills, Behavior::Fail("GPU fell over")));
    let set = trainers(&first);
    let sink = RecordingSink::default();

    let err = Orchestrator::new(&set, HOST, &sink).run(&fx.request(Strategy::LabMultiphase)).await.unwrap_err();
    assert!(matches!(err, TrainingError::TrainingExecution { phase: Phase::Skills, index: 2, total: 2, .. }));
    let knowledge_ckpt = fx.journal().checkpoint_for(Phase::Knowledge).unwrap().to_path_buf();

    let second = Arc::new(ScriptedTrainer::default());
    let set = trainers(&second);
    let sink = RecordingSink::default();
    let outcome = Orchestrator::new(&set, HOST, &sink).run(&fx.request(Strategy::LabMultiphase)).await.unwrap();

    assert_eq!(second.called_phases(), vec![Phase::Skills]);
    assert_eq!(second.calls()[0].starting_point, knowledge_ckpt);
    assert_eq!(sink.skipped(), vec![Phase::Knowledge]);
    assert_eq!(outcome.skipped, vec![Phase::Knowledge]);
    assert_eq!(outcome.executed, vec![Phase::Skills]);
}

#[tokio::test]
async fn test_failed_phase_is_not_recorded_and_reruns_from_scratch() {
    let fx = Fixture::new();
    let failing = Arc::new(ScriptedTrainer::default().with(Phase::Knowledge, Behavior::Fail("INTENTIONAL FAILURE")));
    let set = trainers(&failing);
    let sink = RecordingSink::default();

    let err = Orchestrator::new(&set, HOST, &sink).run(&fx.request(Strategy::LabMultiphase)).await.unwrap_err();
    assert!(err.to_string().contains("Failed during training loop: INTENTIONAL FAILURE"));
    assert_eq!(failing.called_phases(), vec![Phase::Knowledge]);
    assert!(!fx.journal().is_complete(Phase::Knowledge));

    let healthy = Arc::new(ScriptedTrainer::default());
    let set = trainers(&healthy);
    Orchestrator::new(&set, HOST, &sink).run(&fx.request(Strategy::LabMultiphase)).await.unwrap();
    assert_eq!(healthy.called_phases(), vec![Phase::Knowledge, Phase::Skills]);
}

#[tokio::test]
async fn test_no_checkpoint_guard_keeps_journal() {
    let fx = Fixture::new();
    let trainer = Arc::new(ScriptedTrainer::default().with(Phase::Knowledge, Behavior::SaveNothing));
    let set = trainers(&trainer);
    let sink = RecordingSink::default();

    let err = Orchestrator::new(&set, HOST, &sink).run(&fx.request(Strategy::LabMultiphase)).await.unwrap_err();

    assert!(matches!(err, TrainingError::NoCheckpointsProduced { phase_index: Some(1), .. }));
    assert!(err.to_string().contains("no checkpoints were saved from phase 1"));
    assert_eq!(trainer.called_phases(), vec![Phase::Knowledge]);
    assert!(!fx.journal().is_complete(Phase::Knowledge));
}

#[tokio::test]
async fn test_cpu_with_accelerated_is_rejected_before_training() {
    let fx = Fixture::new();
    let trainer = Arc::new(ScriptedTrainer::default());
    let set = trainers(&trainer);
    let sink = RecordingSink::default();
    let mut request = fx.request(Strategy::LabMultiphase);
    request.device = Device::Cpu;

    let err = Orchestrator::new(&set, HOST, &sink).run(&request).await.unwrap_err();

    assert!(matches!(err, TrainingError::UnsupportedConfiguration { .. }));
    assert!(err.is_preflight());
    assert!(trainer.calls().is_empty());
    assert!(sink.0.lock().unwrap().is_empty());
    assert!(!fx.out().exists());
}

#[tokio::test]
async fn test_missing_data_is_rejected_before_training() {
    let fx = Fixture::new();
    std::fs::write(fx.temp.path().join("skills.jsonl"), "").unwrap();
    let trainer = Arc::new(ScriptedTrainer::default());
    let set = trainers(&trainer);
    let sink = RecordingSink::default();

    let err = Orchestrator::new(&set, HOST, &sink).run(&fx.request(Strategy::LabMultiphase)).await.unwrap_err();

    assert!(matches!(err, TrainingError::InputData { phase: Phase::Skills, .. }));
    assert!(trainer.calls().is_empty());
    assert!(!fx.out().exists());
}

#[tokio::test]
async fn test_train_args_reach_the_trainer() {
    let fx = Fixture::new();
    let trainer = Arc::new(ScriptedTrainer::default());
    let set = trainers(&trainer);
    let sink = RecordingSink::default();
    let args = TrainArgs { checkpoint_full_state: false, seed: 7, ..TrainArgs::default() };

    Orchestrator::new(&set, HOST, &sink)
        .run(&fx.request(Strategy::LabSkillsOnly).with_train_args(args))
        .await
        .unwrap();

    let call = &trainer.calls()[0];
    assert!(!call.train_args.checkpoint_full_state);
    assert_eq!(call.train_args.seed, 7);
    assert_eq!(call.device, Device::Cuda);
}

struct PreferOrdinal(u64);

#[async_trait]
impl CheckpointEvaluator for PreferOrdinal {
    async fn score(&self, checkpoint: &Checkpoint, judge: &str) -> anyhow::Result<f64> {
        assert_eq!(judge, "prometheus");
        Ok(if checkpoint.ordinal == self.0 { 9.0 } else { 1.0 })
    }
}

#[tokio::test]
async fn test_judge_selects_final_checkpoint() {
    let fx = Fixture::new();
    let trainer = Arc::new(ScriptedTrainer::default().with(Phase::Skills, Behavior::Save(vec![1, 2, 3])));
    let set = trainers(&trainer);
    let sink = RecordingSink::default();
    let judge = PreferOrdinal(2);

    let outcome = Orchestrator::new(&set, HOST, &sink)
        .with_evaluator(&judge)
        .run(&fx.request(Strategy::LabMultiphase).with_judge("prometheus"))
        .await
        .unwrap();

    assert!(outcome.final_checkpoint.ends_with("checkpoint-2"));
    let journal = fx.journal();
    assert_eq!(journal.record(Phase::Skills).unwrap().score, Some(9.0));
    assert_eq!(journal.record(Phase::Knowledge).unwrap().score, None);
}

#[tokio::test]
async fn test_completed_run_is_a_no_op() {
    let fx = Fixture::new();
    let trainer = Arc::new(ScriptedTrainer::default());
    let set = trainers(&trainer);
    let sink = RecordingSink::default();
    let request = fx.request(Strategy::LabMultiphase);

    let first = Orchestrator::new(&set, HOST, &sink).run(&request).await.unwrap();
    let second = Orchestrator::new(&set, HOST, &sink).run(&request).await.unwrap();

    assert_eq!(trainer.calls().len(), 2);
    assert_eq!(second.skipped, vec![Phase::Knowledge, Phase::Skills]);
    assert_eq!(first.final_checkpoint, second.final_checkpoint);
    assert!(Path::new(&second.final_checkpoint).ends_with("checkpoint-1"));
}

#[tokio::test]
async fn test_completed_later_phase_is_not_reused_after_earlier_phase_retrains() {
    let fx = Fixture::new();
    let first = Arc::new(ScriptedTrainer::default());
    let set = trainers(&first);
    let sink = RecordingSink::default();
    Orchestrator::new(&set, HOST, &sink).run(&fx.request(Strategy::LabSkillsOnly)).await.unwrap();
    assert_eq!(fx.journal().starting_point_for(Phase::Skills), Some(fx.temp.path().join("base").as_path()));

    // Multiphase would retrain knowledge, so the base-trained skills checkpoint is stale.
    let second = Arc::new(ScriptedTrainer::default());
    let set = trainers(&second);
    let err = Orchestrator::new(&set, HOST, &sink).run(&fx.request(Strategy::LabMultiphase)).await.unwrap_err();

    assert!(matches!(err, TrainingError::Journal(_)));
    assert!(err.to_string().contains("skills"));
    assert!(second.calls().is_empty());
    assert!(!fx.journal().is_complete(Phase::Knowledge));
}

#[tokio::test]
async fn test_completed_phase_with_different_starting_point_is_rejected() {
    let fx = Fixture::new();
    let trainer = Arc::new(ScriptedTrainer::default().with(Phase::Skills, Behavior::Fail("later")));
    let set = trainers(&trainer);
    let sink = RecordingSink::default();
    Orchestrator::new(&set, HOST, &sink).run(&fx.request(Strategy::LabMultiphase)).await.unwrap_err();

    let mut request = fx.request(Strategy::LabMultiphase);
    request.base_model = fx.temp.path().join("other-base");
    let healthy = Arc::new(ScriptedTrainer::default());
    let set = trainers(&healthy);
    let err = Orchestrator::new(&set, HOST, &sink).run(&request).await.unwrap_err();

    assert!(matches!(err, TrainingError::Journal(_)));
    assert!(err.to_string().contains("other-base"));
    assert!(healthy.calls().is_empty());
}

#[tokio::test]
async fn test_missing_recorded_checkpoint_fails_before_training() {
    let fx = Fixture::new();
    let first = Arc::new(ScriptedTrainer::default().with(Phase::Skills, Behavior::Fail("GPU fell over")));
    let set = trainers(&first);
    let sink = RecordingSink::default();
    Orchestrator::new(&set, HOST, &sink).run(&fx.request(Strategy::LabMultiphase)).await.unwrap_err();

    let knowledge_ckpt = fx.journal().checkpoint_for(Phase::Knowledge).unwrap().to_path_buf();
    std::fs::remove_dir_all(&knowledge_ckpt).unwrap();

    let second = Arc::new(ScriptedTrainer::default());
    let set = trainers(&second);
    let err = Orchestrator::new(&set, HOST, &sink).run(&fx.request(Strategy::LabMultiphase)).await.unwrap_err();

    assert!(matches!(err, TrainingError::Journal(_)));
    assert!(err.to_string().contains("no longer exists"));
    assert!(second.calls().is_empty());
}
