//! # BPT Common Library
//!
//! Shared code for the bootstrap parser training crates:
//! - Error taxonomy (`Error`, `Result`)
//! - TOML configuration loading and atomic write-back
//! - Cycle event types (`CycleEvent`) and the `EventBus`

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{CycleEvent, CycleState, EventBus};
