//! Training cycle events
//!
//! Provides the shared event definitions and the `EventBus` the orchestrator
//! publishes progress on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Training cycle state
///
/// Initializing → ParsingCorpus → AnalyzingTrace → Relabeling → Training →
/// Testing → CleaningUp → (ParsingCorpus | Done)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleState {
    /// Ensure a base model exists and start the external service
    Initializing,
    /// Run the corpus through the parser, producing a fresh trace
    ParsingCorpus,
    /// Aggregate bigrams, select a target and find matching entries
    AnalyzingTrace,
    /// Rewrite matched transitions and persist examples
    Relabeling,
    /// Retrain the model on the relabelled examples
    Training,
    /// Diagnostic evaluation against the held-out set
    Testing,
    /// Discard the raw trace and restart the external service
    CleaningUp,
    /// Curriculum exhausted or iteration cap reached
    Done,
}

impl CycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CycleState::Done)
    }
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CycleState::Initializing => "INITIALIZING",
            CycleState::ParsingCorpus => "PARSING_CORPUS",
            CycleState::AnalyzingTrace => "ANALYZING_TRACE",
            CycleState::Relabeling => "RELABELING",
            CycleState::Training => "TRAINING",
            CycleState::Testing => "TESTING",
            CycleState::CleaningUp => "CLEANING_UP",
            CycleState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Why a cycle run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    CurriculumExhausted,
    IterationCap,
}

/// Events published while a training cycle runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CycleEvent {
    /// A new iteration began
    IterationStarted {
        run_id: Uuid,
        iteration: u32,
        timestamp: DateTime<Utc>,
    },

    /// The orchestrator moved between states
    StateChanged {
        run_id: Uuid,
        iteration: u32,
        old_state: CycleState,
        new_state: CycleState,
        timestamp: DateTime<Utc>,
    },

    /// The scheduler picked a target bigram
    TargetSelected {
        run_id: Uuid,
        iteration: u32,
        first: String,
        second: String,
        frequency: u64,
        matches: usize,
        timestamp: DateTime<Utc>,
    },

    /// A bigram left the working set (over-selected or no matching entries)
    BigramRetired {
        run_id: Uuid,
        iteration: u32,
        first: String,
        second: String,
        timestamp: DateTime<Utc>,
    },

    /// The working set ran dry; the run stops after this iteration
    CurriculumExhausted {
        run_id: Uuid,
        iteration: u32,
        passes: u32,
        timestamp: DateTime<Utc>,
    },

    /// Iteration aborted; previously committed models are untouched
    IterationFailed {
        run_id: Uuid,
        iteration: u32,
        state: CycleState,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The run finished
    CycleCompleted {
        run_id: Uuid,
        iterations: u32,
        reason: StopReason,
        timestamp: DateTime<Utc>,
    },
}

/// Event distribution bus backed by `tokio::sync::broadcast`
///
/// Publishing never blocks; slow subscribers observe `Lagged` instead of
/// stalling the orchestrator.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CycleEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    ///
    /// ```
    /// use bpt_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CycleEvent,
    ) -> Result<usize, broadcast::error::SendError<CycleEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CycleEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
