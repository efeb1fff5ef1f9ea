//! # BPT Curriculum
//!
//! Core of the bootstrap parser trainer: turns a parser's own decision trace
//! into a training curriculum.
//!
//! - [`bigram`]: POS bigram statistics and their aggregation
//! - [`trace`] / [`transition`]: decision trace entries
//! - [`store`]: JSON Lines trace persistence
//! - [`scheduler`]: target selection, loop avoidance, relabelling
//! - [`arc`]: arc-direction heuristic and guided relabelling
//! - [`examples`]: labelled training examples
//! - [`histogram`]: bigram histogram output

pub mod arc;
pub mod bigram;
pub mod examples;
pub mod histogram;
pub mod scheduler;
pub mod store;
pub mod trace;
pub mod transition;

pub use arc::{arc_probabilities, decide_arc, guide_entries, ArcDecision, ArcPolicy};
pub use bigram::{rank_order, Bigram, BigramKey, BigramTable, Tag};
pub use examples::{extract_examples, TrainingExample, TransitionVocabulary};
pub use scheduler::{CurriculumScheduler, PassHistory, RoundOutcome, Selection};
pub use trace::{Configuration, TraceEntry};
pub use transition::Transition;
