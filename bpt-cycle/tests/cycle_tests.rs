//! Training cycle orchestration tests
//!
//! Runs the full state machine against in-memory collaborators that write
//! scripted traces and fake model files into a temporary working directory.

use async_trait::async_trait;
use bpt_common::config::{ExamplesScope, TomlConfig};
use bpt_common::events::StopReason;
use bpt_common::{CycleEvent, CycleState, Error, EventBus, Result};
use bpt_curriculum::store::load_entries;
use bpt_curriculum::{BigramKey, Transition};
use bpt_cycle::{
    Collaborators, CorpusParser, CycleSettings, IterationPaths, ModelTrainer, ParseRequest,
    ParsingService, ShutdownKind, TrainingCycle,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

fn record(stack: &[&str], transition: &str) -> String {
    serde_json::json!({
        "features": [1, 2, 3],
        "transition": transition,
        "stackWords": stack.iter().map(|t| t.to_lowercase()).collect::<Vec<_>>(),
        "stackPOS": stack,
        "bufferWords": [],
        "bufferPOS": [],
    })
    .to_string()
}

fn trace(records: &[String]) -> String {
    records.join("\n") + "\n"
}

#[derive(Default)]
struct Calls {
    starts: AtomicUsize,
    shutdowns: AtomicUsize,
    parses: AtomicUsize,
    evaluations: AtomicUsize,
    seeds: AtomicUsize,
    trainings: AtomicUsize,
}

impl Calls {
    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct FakeService {
    calls: Arc<Calls>,
    running: bool,
}

#[async_trait]
impl ParsingService for FakeService {
    async fn start(&mut self, _model: &Path) -> Result<()> {
        assert!(!self.running, "service started twice");
        self.running = true;
        self.calls.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&mut self, _grace: Duration) -> Result<ShutdownKind> {
        self.calls.shutdowns.fetch_add(1, Ordering::SeqCst);
        if std::mem::take(&mut self.running) {
            Ok(ShutdownKind::Graceful)
        } else {
            Ok(ShutdownKind::NotRunning)
        }
    }
}

/// Writes `traces[n]` on the n-th parse, repeating the last one
struct FakeParser {
    calls: Arc<Calls>,
    traces: Vec<String>,
    fail_evaluation: bool,
}

#[async_trait]
impl CorpusParser for FakeParser {
    async fn parse_corpus(&self, request: &ParseRequest) -> Result<()> {
        let n = self.calls.parses.fetch_add(1, Ordering::SeqCst);
        let content = self.traces[n.min(self.traces.len() - 1)].clone();
        std::fs::write(&request.trace, content).map_err(|e| Error::io(&request.trace, "write", e))?;
        std::fs::write(&request.output, "parsed").map_err(|e| Error::io(&request.output, "write", e))
    }

    async fn evaluate(&self, _model: &Path, _test_set: &Path, _output: &Path) -> Result<()> {
        self.calls.evaluations.fetch_add(1, Ordering::SeqCst);
        if self.fail_evaluation {
            return Err(Error::External {
                stage: "test",
                message: "evaluator crashed".to_string(),
            });
        }
        Ok(())
    }
}

struct FakeTrainer {
    calls: Arc<Calls>,
    fail: bool,
}

#[async_trait]
impl ModelTrainer for FakeTrainer {
    async fn train_seed(&self, _treebank: &Path, model_out: &Path) -> Result<()> {
        self.calls.seeds.fetch_add(1, Ordering::SeqCst);
        std::fs::write(model_out, "seed").map_err(|e| Error::io(model_out, "write", e))
    }

    async fn train(&self, examples: &Path, _base_model: &Path, model_out: &Path) -> Result<()> {
        let n = self.calls.trainings.fetch_add(1, Ordering::SeqCst) + 1;
        assert!(examples.exists(), "examples must be written before training");
        if self.fail {
            std::fs::write(model_out, "partial").map_err(|e| Error::io(model_out, "write", e))?;
            return Err(Error::External {
                stage: "train",
                message: "out of memory".to_string(),
            });
        }
        std::fs::write(model_out, format!("model-{n}")).map_err(|e| Error::io(model_out, "write", e))
    }
}

struct Harness {
    dir: TempDir,
    config: TomlConfig,
    calls: Arc<Calls>,
    traces: Vec<String>,
    fail_training: bool,
    fail_evaluation: bool,
}

impl Harness {
    fn new(traces: Vec<String>) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("model.txt.gz"), "base").unwrap();
        Self {
            dir,
            config: TomlConfig::default(),
            calls: Arc::new(Calls::default()),
            traces,
            fail_training: false,
            fail_evaluation: false,
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    fn model(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("model.txt.gz")).unwrap()
    }

    fn cycle(&self, event_bus: EventBus) -> TrainingCycle {
        let collaborators = Collaborators {
            service: Box::new(FakeService {
                calls: Arc::clone(&self.calls),
                running: false,
            }),
            parser: Box::new(FakeParser {
                calls: Arc::clone(&self.calls),
                traces: self.traces.clone(),
                fail_evaluation: self.fail_evaluation,
            }),
            trainer: Box::new(FakeTrainer {
                calls: Arc::clone(&self.calls),
                fail: self.fail_training,
            }),
        };
        TrainingCycle::new(
            CycleSettings::from_config(&self.config, self.path()),
            collaborators,
            event_bus,
        )
    }
}

fn drain(rx: &mut broadcast::Receiver<CycleEvent>) -> Vec<CycleEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn repeated_failure_retires_pattern_and_exhausts() {
    // The parser keeps failing on NN VB: taught once, then retired
    let harness = Harness::new(vec![trace(&[
        record(&["-ROOT-", "NN", "VB"], "S"),
        record(&["-ROOT-", "DT"], "S"),
    ])]);
    let bus = EventBus::new(256);
    let mut rx = bus.subscribe();

    let report = harness.cycle(bus).run().await.unwrap();

    assert_eq!(report.reason, StopReason::CurriculumExhausted);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.targets, vec![BigramKey::new("NN", "VB")]);
    assert_eq!(harness.model(), "model-1");

    let calls = &harness.calls;
    assert_eq!(Calls::get(&calls.parses), 2);
    assert_eq!(Calls::get(&calls.trainings), 1);
    assert_eq!(Calls::get(&calls.starts), 2);
    assert_eq!(Calls::get(&calls.shutdowns), 2);

    let first = IterationPaths::new(&harness.path(), 0);
    assert!(!first.trace.exists());
    let relabeled = load_entries(&first.relabeled).unwrap();
    assert_eq!(relabeled[0].transition(), &Transition::left("PARSED"));
    assert_eq!(relabeled[1].transition(), &Transition::Shift);
    assert!(!IterationPaths::new(&harness.path(), 1).trace.exists());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        CycleEvent::BigramRetired { iteration: 1, first, second, .. } if first == "NN" && second == "VB"
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, CycleEvent::CurriculumExhausted { iteration: 1, passes: 0, .. })));
    assert!(matches!(
        events.last(),
        Some(CycleEvent::CycleCompleted {
            reason: StopReason::CurriculumExhausted,
            ..
        })
    ));
}

#[tokio::test]
async fn iteration_cap_stops_before_exhaustion() {
    let mut harness = Harness::new(vec![
        trace(&[
            record(&["NN", "VB"], "S"),
            record(&["DT", "NN"], "S"),
            record(&["JJ", "NN"], "S"),
        ]),
        trace(&[record(&["DT", "NN"], "S"), record(&["JJ", "NN"], "S")]),
    ]);
    harness.config.cycle.max_iterations = Some(2);
    let mut cycle = harness.cycle(EventBus::new(64));

    let report = cycle.run().await.unwrap();

    assert_eq!(report.reason, StopReason::IterationCap);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.targets.len(), 2);
    assert_eq!(harness.model(), "model-2");
    assert_eq!(cycle.session().state, CycleState::Done);
    assert_eq!(cycle.history().len(), 2);

    // No restart after the final iteration
    assert_eq!(Calls::get(&harness.calls.starts), 2);
    assert_eq!(Calls::get(&harness.calls.shutdowns), 3);
}

#[tokio::test]
async fn corrupt_trace_aborts_without_touching_model() {
    let harness = Harness::new(vec![format!(
        "{}\n{{\"features\": [1]\n",
        record(&["NN", "VB"], "S")
    )]);
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();

    let err = harness.cycle(bus).run().await.unwrap_err();

    match err {
        Error::CorruptTrace { record, .. } => assert_eq!(record, 2),
        other => panic!("expected corrupt trace, got {other:?}"),
    }
    assert_eq!(harness.model(), "base");
    assert_eq!(Calls::get(&harness.calls.trainings), 0);
    assert_eq!(Calls::get(&harness.calls.shutdowns), 1);
    // Left for inspection
    assert!(IterationPaths::new(&harness.path(), 0).trace.exists());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        CycleEvent::IterationFailed {
            state: CycleState::AnalyzingTrace,
            ..
        }
    )));
    assert!(!events
        .iter()
        .any(|e| matches!(e, CycleEvent::CycleCompleted { .. })));
}

#[tokio::test]
async fn failed_training_keeps_committed_model() {
    let mut harness = Harness::new(vec![trace(&[record(&["NN", "VB"], "S")])]);
    harness.fail_training = true;

    let err = harness.cycle(EventBus::new(16)).run().await.unwrap_err();

    assert!(matches!(err, Error::External { stage: "train", .. }));
    assert_eq!(harness.model(), "base");
    assert!(!harness.dir.path().join("model.txt.gz.tmp").exists());
}

#[tokio::test]
async fn evaluation_failure_is_not_fatal() {
    let mut harness = Harness::new(vec![trace(&[record(&["NN", "VB"], "S")])]);
    harness.config.cycle.test_set = Some(PathBuf::from("test.conll"));
    harness.config.cycle.max_iterations = Some(1);
    harness.fail_evaluation = true;

    let report = harness.cycle(EventBus::new(16)).run().await.unwrap();

    assert_eq!(report.iterations, 1);
    assert_eq!(Calls::get(&harness.calls.evaluations), 1);
    assert_eq!(harness.model(), "model-1");
}

#[tokio::test]
async fn missing_model_is_seeded_from_treebank() {
    let mut harness = Harness::new(vec![trace(&[record(&["NN", "VB"], "S")])]);
    std::fs::remove_file(harness.dir.path().join("model.txt.gz")).unwrap();
    harness.config.cycle.seed_treebank = Some(PathBuf::from("seed.conll"));
    harness.config.cycle.max_iterations = Some(0);

    let report = harness.cycle(EventBus::new(16)).run().await.unwrap();

    assert_eq!(report.iterations, 0);
    assert_eq!(harness.model(), "seed");
    assert_eq!(Calls::get(&harness.calls.seeds), 1);
    assert_eq!(Calls::get(&harness.calls.parses), 0);
    assert_eq!(Calls::get(&harness.calls.starts), 0);
}

#[tokio::test]
async fn missing_model_without_seed_is_config_error() {
    let harness = Harness::new(vec![trace(&[record(&["NN", "VB"], "S")])]);
    std::fs::remove_file(harness.dir.path().join("model.txt.gz")).unwrap();

    let err = harness.cycle(EventBus::new(16)).run().await.unwrap_err();

    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn matched_scope_accumulates_examples_across_passes() {
    let mut harness = Harness::new(vec![trace(&[
        record(&["NN", "VB"], "S"),
        record(&["NN", "VB"], "R(OBJ)"),
        record(&["DT", "NN"], "S"),
        record(&["JJ", "NN"], "S"),
    ])]);
    harness.config.curriculum.max_passes = 2;
    harness.config.curriculum.examples_scope = ExamplesScope::Matched;
    harness.config.cycle.max_iterations = Some(1);

    let report = harness.cycle(EventBus::new(64)).run().await.unwrap();

    // NN VB (2) first, then DT NN and JJ NN tie at 1: DT sorts first
    assert_eq!(
        report.targets,
        vec![BigramKey::new("NN", "VB"), BigramKey::new("DT", "NN")]
    );

    let paths = IterationPaths::new(&harness.path(), 0);
    let examples = load_entries(&paths.examples).unwrap();
    assert_eq!(examples.len(), 3);
    assert!(examples
        .iter()
        .all(|e| e.transition() == &Transition::left("PARSED")));

    let relabeled = load_entries(&paths.relabeled).unwrap();
    assert_eq!(relabeled[3].transition(), &Transition::Shift);

    let histogram = std::fs::read_to_string(&paths.histogram).unwrap();
    assert_eq!(histogram.lines().next(), Some("2 NN VB"));
}

#[tokio::test]
async fn exhaustion_after_a_pass_still_trains_then_stops() {
    let mut harness = Harness::new(vec![trace(&[
        record(&["NN", "VB"], "S"),
        record(&["-ROOT-", "DT"], "S"),
    ])]);
    harness.config.curriculum.max_passes = 2;
    let bus = EventBus::new(128);
    let mut rx = bus.subscribe();

    let report = harness.cycle(bus).run().await.unwrap();

    assert_eq!(report.reason, StopReason::CurriculumExhausted);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.targets, vec![BigramKey::new("NN", "VB")]);
    assert_eq!(harness.model(), "model-1");

    let calls = &harness.calls;
    assert_eq!(Calls::get(&calls.parses), 1);
    assert_eq!(Calls::get(&calls.trainings), 1);
    // Final iteration: cleanup does not restart the service
    assert_eq!(Calls::get(&calls.starts), 1);

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, CycleEvent::CurriculumExhausted { iteration: 0, passes: 1, .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        CycleEvent::StateChanged {
            old_state: CycleState::AnalyzingTrace,
            new_state: CycleState::Training,
            ..
        }
    )));
}
