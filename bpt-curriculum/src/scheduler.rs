//! Curriculum scheduler
//!
//! Picks the next POS bigram to teach, finds the unresolved trace entries
//! sitting on that bigram and relabels them. Loop avoidance is carried by a
//! [`PassHistory`] that outlives the per-iteration working set.
//!
//! # Round
//! 1. Rank the working set (frequency desc, then tags), skipping root-anchored
//!    statistics.
//! 2. Count the pass; a candidate whose count exceeds `pass_limit` is retired
//!    and the ranking repeats.
//! 3. Collect entries whose top two stack tags equal the target and whose
//!    transition is not yet resolved. None found: retire the target and go
//!    back to step 1.
//! 4. An empty (or root-only) working set ends the curriculum.

use crate::bigram::{rank_order, Bigram, BigramKey, BigramTable};
use crate::trace::TraceEntry;
use crate::transition::Transition;
use bpt_common::config::CurriculumConfig;
use std::collections::HashMap;
use tracing::{debug, info};

/// Number of times each bigram has been targeted during one cycle run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassHistory {
    counts: HashMap<BigramKey, u32>,
}

impl PassHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the post-increment count
    pub fn record(&mut self, key: &BigramKey) -> u32 {
        let count = self.counts.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn count(&self, key: &BigramKey) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Result of target selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Target(Bigram),
    /// No eligible statistic remains
    Exhausted,
}

/// Result of one full scheduling round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// A target with at least one unresolved matching entry
    Target {
        bigram: Bigram,
        /// Indices into the entry slice handed to the round
        matches: Vec<usize>,
    },
    /// Curriculum exhausted: the designed termination path
    Exhausted,
}

impl RoundOutcome {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RoundOutcome::Exhausted)
    }
}

/// Per-iteration scheduler over a working set of bigram statistics
#[derive(Debug)]
pub struct CurriculumScheduler {
    working_set: Vec<Bigram>,
    history: PassHistory,
    pass_limit: u32,
    root_marker: String,
    resolved_label: String,
    retired: Vec<BigramKey>,
}

impl CurriculumScheduler {
    /// Build a working set from `table`, continuing the given pass history
    pub fn new(table: &BigramTable, history: PassHistory, config: &CurriculumConfig) -> Self {
        Self::from_bigrams(table.ranked(), history, config)
    }

    pub fn from_bigrams(
        working_set: Vec<Bigram>,
        history: PassHistory,
        config: &CurriculumConfig,
    ) -> Self {
        Self {
            working_set,
            history,
            pass_limit: config.pass_limit,
            root_marker: config.root_marker.clone(),
            resolved_label: config.resolved_label.clone(),
            retired: Vec::new(),
        }
    }

    /// Hand the pass history back for the next iteration's scheduler
    pub fn into_history(self) -> PassHistory {
        self.history
    }

    pub fn history(&self) -> &PassHistory {
        &self.history
    }

    /// Remaining statistics, ranked
    pub fn working_set(&self) -> Vec<Bigram> {
        let mut ranked = self.working_set.clone();
        ranked.sort_by(rank_order);
        ranked
    }

    pub fn contains(&self, key: &BigramKey) -> bool {
        self.working_set.iter().any(|b| &b.key == key)
    }

    /// Keys removed since the last call, in removal order
    pub fn take_retired(&mut self) -> Vec<BigramKey> {
        std::mem::take(&mut self.retired)
    }

    /// Label written over resolved transitions
    pub fn sentinel(&self) -> Transition {
        Transition::left(self.resolved_label.as_str())
    }

    fn is_root_anchored(&self, bigram: &Bigram) -> bool {
        bigram.first() == self.root_marker
    }

    fn top_candidate(&self) -> Option<&Bigram> {
        self.working_set
            .iter()
            .filter(|b| !self.is_root_anchored(b))
            .min_by(|a, b| rank_order(a, b))
    }

    /// Permanently drop a statistic from the working set
    pub fn retire(&mut self, key: &BigramKey) {
        let before = self.working_set.len();
        self.working_set.retain(|b| &b.key != key);
        if self.working_set.len() < before {
            debug!(bigram = %key, remaining = self.working_set.len(), "Bigram retired");
            self.retired.push(key.clone());
        }
    }

    /// Select the highest-ranked non-root statistic still within its pass limit
    ///
    /// Each candidate considered costs one pass; a candidate whose count
    /// exceeds `pass_limit` is retired on the spot.
    pub fn select_target(&mut self) -> Selection {
        loop {
            let Some(candidate) = self.top_candidate().cloned() else {
                return Selection::Exhausted;
            };

            let passes = self.history.record(&candidate.key);
            if passes > self.pass_limit {
                debug!(
                    bigram = %candidate.key,
                    passes,
                    pass_limit = self.pass_limit,
                    "Pass limit exceeded"
                );
                self.retire(&candidate.key);
                continue;
            }

            return Selection::Target(candidate);
        }
    }

    /// Indices of unresolved entries whose top two stack tags equal `target`
    pub fn find_matches(&self, target: &Bigram, entries: &[TraceEntry]) -> Vec<usize> {
        entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.transition().is_resolved(&self.resolved_label))
            .filter(|(_, entry)| {
                entry
                    .top_two_pos()
                    .is_some_and(|(a, b)| target.key.matches(a, b))
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Select a target and its matches, retiring targets with no matches
    pub fn next_round(&mut self, entries: &[TraceEntry]) -> RoundOutcome {
        loop {
            let target = match self.select_target() {
                Selection::Target(target) => target,
                Selection::Exhausted => {
                    info!("Curriculum exhausted");
                    return RoundOutcome::Exhausted;
                }
            };

            let matches = self.find_matches(&target, entries);
            if matches.is_empty() {
                debug!(bigram = %target.key, "No unresolved entries for target");
                self.retire(&target.key);
                continue;
            }

            info!(
                bigram = %target.key,
                frequency = target.frequency(),
                matches = matches.len(),
                "Curriculum target selected"
            );
            return RoundOutcome::Target {
                bigram: target,
                matches,
            };
        }
    }

    /// Overwrite the transition of every matched entry with the sentinel
    ///
    /// Entries are independent; the result does not depend on order and
    /// applying it twice equals applying it once.
    pub fn relabel(&self, entries: &mut [TraceEntry], matches: &[usize]) -> usize {
        relabel(entries, matches, &self.sentinel())
    }
}

/// Set `transition` on each indexed entry, returning how many were written
///
/// Out-of-range indices are ignored.
pub fn relabel(entries: &mut [TraceEntry], matches: &[usize], transition: &Transition) -> usize {
    let mut written = 0;
    for &index in matches {
        if let Some(entry) = entries.get_mut(index) {
            entry.set_transition(transition.clone());
            written += 1;
        }
    }
    written
}
