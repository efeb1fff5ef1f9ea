//! # BPT Cycle
//!
//! Training cycle orchestrator for the bootstrap parser trainer: parses a
//! corpus with the current model, teaches the most frequent unresolved POS
//! pattern, retrains, and repeats until the curriculum runs dry.

pub mod commands;
pub mod cycle;
pub mod external;
pub mod session;

pub use cycle::{CycleReport, CycleSettings, IterationPaths, TrainingCycle};
pub use external::{Collaborators, CorpusParser, ModelTrainer, ParseRequest, ParsingService, ShutdownKind};
pub use session::{CycleSession, StepOutcome};
