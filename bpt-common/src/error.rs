//! Common error types for the bootstrap parser trainer

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Common result type for BPT operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the BPT crates
///
/// Curriculum exhaustion is deliberately absent: it is the loop's normal
/// termination path and is reported as a value, never as an `Error`.
#[derive(Error, Debug)]
pub enum Error {
    /// File read/write failure on a boundary file
    #[error("IO error during {operation} on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A trace record could not be deserialized into the expected shape
    #[error("Corrupt trace {} (record {record}): {reason}", path.display())]
    CorruptTrace {
        path: PathBuf,
        record: usize,
        reason: String,
    },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tagging, parsing or training collaborator failed
    #[error("External {stage} failure: {message}")]
    External { stage: &'static str, message: String },

    /// Invalid user input or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Wrap an `std::io::Error` with the path and operation that produced it
    pub fn io(path: impl AsRef<Path>, operation: &'static str, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            operation,
            source,
        }
    }

    /// True when the error came from a malformed trace file
    pub fn is_corrupt_trace(&self) -> bool {
        matches!(self, Error::CorruptTrace { .. })
    }
}
