//! Training cycle orchestrator
//!
//! Drives [`CycleSession`] through its states, one phase method per state:
//! - INITIALIZING: base model + service start ([`phase_initializing`])
//! - PARSING_CORPUS: fresh decision trace ([`phase_parsing`])
//! - ANALYZING_TRACE: aggregation, target selection ([`phase_analyzing`])
//! - RELABELING: relabel + persist ([`phase_relabeling`])
//! - TRAINING / TESTING: model swap, diagnostics ([`phase_training`])
//! - CLEANING_UP: trace discard, service restart ([`phase_cleanup`])
//!
//! Iterations are strictly serial. Any error aborts the run after the
//! service has been stopped; the committed model is never touched by a
//! failed iteration.

mod phase_analyzing;
mod phase_cleanup;
mod phase_initializing;
mod phase_parsing;
mod phase_relabeling;
mod phase_training;

use crate::external::Collaborators;
use crate::session::{CycleSession, StepOutcome};
use bpt_common::config::{resolve_against, CurriculumConfig, TomlConfig};
use bpt_common::events::StopReason;
use bpt_common::{CycleEvent, CycleState, Error, EventBus, Result};
use bpt_curriculum::{BigramKey, BigramTable, CurriculumScheduler, PassHistory, TraceEntry};
use chrono::Utc;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Model file inside the working directory
pub const MODEL_FILE: &str = "model.txt.gz";

/// Everything the orchestrator reads from configuration, paths resolved
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub working_dir: PathBuf,
    pub corpus: PathBuf,
    pub tagged_corpus: Option<PathBuf>,
    pub test_set: Option<PathBuf>,
    pub seed_treebank: Option<PathBuf>,
    pub max_iterations: Option<u32>,
    pub shutdown_grace: Duration,
    pub curriculum: CurriculumConfig,
}

impl CycleSettings {
    /// Relative paths in `config` resolve against `working_dir`
    pub fn from_config(config: &TomlConfig, working_dir: PathBuf) -> Self {
        let cycle = &config.cycle;
        let resolve = |p: &PathBuf| resolve_against(&working_dir, p);
        Self {
            corpus: resolve(&cycle.corpus),
            tagged_corpus: cycle.tagged_corpus.as_ref().map(resolve),
            test_set: cycle.test_set.as_ref().map(resolve),
            seed_treebank: cycle.seed_treebank.as_ref().map(resolve),
            max_iterations: cycle.max_iterations,
            shutdown_grace: Duration::from_secs(cycle.shutdown_grace_secs),
            curriculum: config.curriculum.clone(),
            working_dir,
        }
    }

    pub fn model_path(&self) -> PathBuf {
        self.working_dir.join(MODEL_FILE)
    }
}

/// Files of one iteration, under `<working_dir>/iteration<N>/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationPaths {
    pub dir: PathBuf,
    /// Raw trace from the parser, discarded in CLEANING_UP
    pub trace: PathBuf,
    pub histogram: PathBuf,
    pub relabeled: PathBuf,
    pub examples: PathBuf,
    pub parse_output: PathBuf,
    pub test_output: PathBuf,
}

impl IterationPaths {
    pub fn new(working_dir: &Path, iteration: u32) -> Self {
        let dir = working_dir.join(format!("iteration{}", iteration));
        Self {
            trace: dir.join("parseLog.jsonl"),
            histogram: dir.join("bigrams.txt"),
            relabeled: dir.join("relabeledTrace.jsonl"),
            examples: dir.join("trainingExamples.jsonl"),
            parse_output: dir.join("parseOutput.txt"),
            test_output: dir.join("testOutput.txt"),
            dir,
        }
    }
}

/// Temporary sibling a new model is written to before it replaces `model`
pub fn staging_path(model: &Path) -> PathBuf {
    let mut name = OsString::from(model.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// State carried between the phases of one iteration
struct IterationContext {
    paths: IterationPaths,
    entries: Vec<TraceEntry>,
    table: BigramTable,
    /// Built on the first analysis pass, holds the lent pass history
    scheduler: Option<CurriculumScheduler>,
    matches: Vec<usize>,
}

/// Summary returned when a run ends normally
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub iterations: u32,
    pub reason: StopReason,
    /// Every target taught, in selection order
    pub targets: Vec<BigramKey>,
}

pub struct TrainingCycle {
    settings: CycleSettings,
    collaborators: Collaborators,
    event_bus: EventBus,
    history: PassHistory,
    session: CycleSession,
    current: Option<IterationContext>,
    targets: Vec<BigramKey>,
}

impl TrainingCycle {
    pub fn new(settings: CycleSettings, collaborators: Collaborators, event_bus: EventBus) -> Self {
        let session = CycleSession::new(settings.curriculum.max_passes, settings.max_iterations);
        Self {
            settings,
            collaborators,
            event_bus,
            history: PassHistory::new(),
            session,
            current: None,
            targets: Vec::new(),
        }
    }

    pub fn session(&self) -> &CycleSession {
        &self.session
    }

    pub fn history(&self) -> &PassHistory {
        &self.history
    }

    /// Run iterations until the curriculum is exhausted or the cap is reached
    pub async fn run(&mut self) -> Result<CycleReport> {
        tracing::info!(
            run_id = %self.session.run_id,
            working_dir = %self.settings.working_dir.display(),
            max_iterations = ?self.settings.max_iterations,
            pass_limit = self.settings.curriculum.pass_limit,
            max_passes = self.settings.curriculum.max_passes,
            "Starting training cycle"
        );

        while !self.session.is_terminal() {
            let state = self.session.state;
            match self.step(state).await {
                Ok(outcome) => self.transition(outcome),
                Err(e) => {
                    self.handle_failure(state, &e).await;
                    return Err(e);
                }
            }
        }

        self.finish().await?;

        let report = CycleReport {
            run_id: self.session.run_id,
            iterations: self.session.iteration,
            reason: self.session.stop_reason(),
            targets: self.targets.clone(),
        };

        tracing::info!(
            run_id = %report.run_id,
            iterations = report.iterations,
            reason = ?report.reason,
            targets = report.targets.len(),
            "Training cycle completed"
        );

        self.event_bus.emit_lossy(CycleEvent::CycleCompleted {
            run_id: report.run_id,
            iterations: report.iterations,
            reason: report.reason,
            timestamp: Utc::now(),
        });

        Ok(report)
    }

    async fn step(&mut self, state: CycleState) -> Result<StepOutcome> {
        match state {
            CycleState::Initializing => self.phase_initializing().await,
            CycleState::ParsingCorpus => self.phase_parsing().await,
            CycleState::AnalyzingTrace => self.phase_analyzing().await,
            CycleState::Relabeling => self.phase_relabeling().await,
            CycleState::Training => self.phase_training().await,
            CycleState::Testing => self.phase_testing().await,
            CycleState::CleaningUp => self.phase_cleanup().await,
            CycleState::Done => Ok(StepOutcome::Advance),
        }
    }

    fn transition(&mut self, outcome: StepOutcome) {
        let transition = self.session.advance(outcome);

        tracing::debug!(
            iteration = transition.iteration,
            from = %transition.old_state,
            to = %transition.new_state,
            "State transition"
        );

        self.event_bus.emit_lossy(CycleEvent::StateChanged {
            run_id: transition.run_id,
            iteration: transition.iteration,
            old_state: transition.old_state,
            new_state: transition.new_state,
            timestamp: transition.transitioned_at,
        });
    }

    /// Take the pass history back from this iteration's scheduler
    fn reclaim_history(&mut self) {
        if let Some(scheduler) = self.current.as_mut().and_then(|ctx| ctx.scheduler.take()) {
            self.history = scheduler.into_history();
        }
    }

    fn context(&mut self) -> Result<&mut IterationContext> {
        let state = self.session.state;
        self.current
            .as_mut()
            .ok_or_else(|| Error::InvalidInput(format!("{} without an iteration in progress", state)))
    }

    async fn finish(&mut self) -> Result<()> {
        self.reclaim_history();
        if let Some(ctx) = self.current.take() {
            phase_cleanup::discard_trace(&ctx.paths.trace).await?;
        }

        let kind = self
            .collaborators
            .service
            .shutdown(self.settings.shutdown_grace)
            .await?;
        tracing::debug!(?kind, "Parsing service shut down");
        Ok(())
    }

    /// Report an aborted iteration and stop the service
    ///
    /// The raw trace is left in place for inspection.
    async fn handle_failure(&mut self, state: CycleState, error: &Error) {
        tracing::error!(
            run_id = %self.session.run_id,
            iteration = self.session.iteration,
            state = %state,
            error = %error,
            "Training iteration failed"
        );

        self.event_bus.emit_lossy(CycleEvent::IterationFailed {
            run_id: self.session.run_id,
            iteration: self.session.iteration,
            state,
            error: error.to_string(),
            timestamp: Utc::now(),
        });

        self.reclaim_history();

        if let Err(e) = self
            .collaborators
            .service
            .shutdown(self.settings.shutdown_grace)
            .await
        {
            tracing::warn!(error = %e, "Failed to stop parsing service after failure");
        }
    }
}
