//! Training cycle state machine
//!
//! INITIALIZING → PARSING_CORPUS → ANALYZING_TRACE ⇄ RELABELING → TRAINING →
//! TESTING → CLEANING_UP → (PARSING_CORPUS | DONE)
//!
//! [`CycleSession::advance`] is the only place the state changes.

use bpt_common::events::StopReason;
use bpt_common::CycleState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the step that just ran reports back to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Proceed to the natural successor
    Advance,
    /// Relabelling finished with scheduler passes still available
    AnotherPass,
    /// The scheduler found nothing left to teach
    Exhausted,
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub iteration: u32,
    pub old_state: CycleState,
    pub new_state: CycleState,
    pub transitioned_at: DateTime<Utc>,
}

/// In-memory state of one training cycle run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSession {
    pub run_id: Uuid,
    pub state: CycleState,
    /// Zero-based index of the current iteration
    pub iteration: u32,
    /// Relabelling passes completed in the current iteration
    pub passes: u32,
    pub max_passes: u32,
    pub max_iterations: Option<u32>,
    /// Set once the scheduler has signalled exhaustion
    pub curriculum_exhausted: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CycleSession {
    pub fn new(max_passes: u32, max_iterations: Option<u32>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: CycleState::Initializing,
            iteration: 0,
            passes: 0,
            max_passes: max_passes.max(1),
            max_iterations,
            curriculum_exhausted: false,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    fn iteration_cap_reached(&self) -> bool {
        self.max_iterations
            .is_some_and(|cap| self.iteration >= cap)
    }

    /// Successor of the current state for the given outcome
    pub fn next_state(&self, outcome: StepOutcome) -> CycleState {
        use CycleState::*;

        match (self.state, outcome) {
            (Initializing, _) => {
                if self.iteration_cap_reached() {
                    Done
                } else {
                    ParsingCorpus
                }
            }
            (ParsingCorpus, _) => AnalyzingTrace,
            // Nothing relabelled yet in this iteration: stop right here
            (AnalyzingTrace, StepOutcome::Exhausted) if self.passes == 0 => Done,
            // Earlier passes produced examples: train on them first
            (AnalyzingTrace, StepOutcome::Exhausted) => Training,
            (AnalyzingTrace, _) => Relabeling,
            (Relabeling, StepOutcome::AnotherPass) if self.passes < self.max_passes => {
                AnalyzingTrace
            }
            (Relabeling, _) => Training,
            (Training, _) => Testing,
            (Testing, _) => CleaningUp,
            (CleaningUp, _) => {
                if self.curriculum_exhausted || self.iteration_cap_reached() {
                    Done
                } else {
                    ParsingCorpus
                }
            }
            (Done, _) => Done,
        }
    }

    /// Apply the outcome of the current step
    pub fn advance(&mut self, outcome: StepOutcome) -> StateTransition {
        if outcome == StepOutcome::Exhausted {
            self.curriculum_exhausted = true;
        }
        match self.state {
            CycleState::Relabeling => self.passes += 1,
            CycleState::CleaningUp => self.iteration += 1,
            _ => {}
        }

        let new_state = self.next_state(outcome);
        let transition = StateTransition {
            run_id: self.run_id,
            iteration: self.iteration,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };

        if new_state == CycleState::ParsingCorpus {
            self.passes = 0;
        }
        if new_state == CycleState::Done && self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
        self.state = new_state;

        transition
    }

    /// True when the iteration in progress will be the last one
    pub fn is_final_iteration(&self) -> bool {
        self.curriculum_exhausted
            || self
                .max_iterations
                .is_some_and(|cap| self.iteration + 1 >= cap)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn stop_reason(&self) -> StopReason {
        if self.curriculum_exhausted {
            StopReason::CurriculumExhausted
        } else {
            StopReason::IterationCap
        }
    }
}
