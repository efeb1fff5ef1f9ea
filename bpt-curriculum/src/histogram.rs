//! Bigram histogram output
//!
//! Plain text, one statistic per line as `<frequency> <first> <second>`,
//! most frequent first.

use crate::bigram::{rank_order, Bigram};
use bpt_common::{Error, Result};
use std::path::Path;
use tracing::error;

pub fn render_histogram(bigrams: &[Bigram]) -> String {
    let mut ranked: Vec<&Bigram> = bigrams.iter().collect();
    ranked.sort_by(|a, b| rank_order(a, b));
    ranked
        .iter()
        .map(|b| format!("{} {} {}", b.frequency(), b.first(), b.second()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn write_histogram(bigrams: &[Bigram], path: &Path) -> Result<()> {
    std::fs::write(path, render_histogram(bigrams)).map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to write histogram");
        Error::io(path, "write", e)
    })
}
