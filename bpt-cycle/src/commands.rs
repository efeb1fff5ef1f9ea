//! One-shot subcommands that work on trace files without the full cycle

use bpt_common::config::{write_toml_config, CurriculumConfig, TomlConfig};
use bpt_common::{Error, Result};
use bpt_curriculum::histogram::write_histogram;
use bpt_curriculum::store::{load_entries, save_entries, save_records};
use bpt_curriculum::{extract_examples, guide_entries, ArcPolicy, BigramTable, TransitionVocabulary};
use std::path::Path;
use tracing::{info, warn};

/// Outcome of [`analyse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub entries: usize,
    pub bigrams: usize,
    pub changed: usize,
}

/// Aggregate, write the histogram, rewrite every entry to the arc heuristic's
/// choice and append the result to `trainingExamples.jsonl` in `out_dir`
pub fn analyse(
    trace: &Path,
    corpus: Option<&Path>,
    out_dir: &Path,
    config: &CurriculumConfig,
) -> Result<AnalysisSummary> {
    let mut entries = load_entries(trace)?;
    let corpus = corpus
        .map(|path| std::fs::read_to_string(path).map_err(|e| Error::io(path, "read", e)))
        .transpose()?;

    let table = BigramTable::aggregate(corpus.as_deref(), &entries);
    std::fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, "create_dir", e))?;
    write_histogram(&table.ranked(), &out_dir.join("bigrams.txt"))?;

    let policy = ArcPolicy::from_table(&table, config);
    let changed = guide_entries(&mut entries, &table, &policy, &config.resolved_label);
    save_entries(&entries, &out_dir.join("trainingExamples.jsonl"), true)?;

    let summary = AnalysisSummary {
        entries: entries.len(),
        bigrams: table.len(),
        changed,
    };
    info!(
        trace = %trace.display(),
        entries = summary.entries,
        bigrams = summary.bigrams,
        changed = summary.changed,
        threshold = policy.threshold,
        shift_mass = policy.shift_mass,
        "Trace analysed"
    );
    Ok(summary)
}

/// Write one labelled training example per trace entry, returning the count
///
/// `labels` replaces the default dependency label set.
pub fn export_examples(trace: &Path, out: &Path, labels: &[String]) -> Result<usize> {
    let entries = load_entries(trace)?;
    let vocabulary = if labels.is_empty() {
        TransitionVocabulary::default()
    } else {
        TransitionVocabulary::from_labels(labels)
    };

    let examples = extract_examples(&entries, &vocabulary);
    let unlabelled = examples
        .iter()
        .filter(|example| example.correct_index().is_none())
        .count();
    if unlabelled > 0 {
        warn!(
            unlabelled,
            "Transitions outside the vocabulary have no correct label"
        );
    }

    save_records(&examples, out, false)?;
    info!(out = %out.display(), examples = examples.len(), "Training examples written");
    Ok(examples.len())
}

/// Write a starter configuration, refusing to overwrite an existing file
pub fn init_config(out: &Path, force: bool) -> Result<()> {
    if out.exists() && !force {
        return Err(Error::InvalidInput(format!(
            "{} already exists (use --force to overwrite)",
            out.display()
        )));
    }
    write_toml_config(&TomlConfig::default(), out)?;
    info!(path = %out.display(), "Configuration written");
    Ok(())
}
