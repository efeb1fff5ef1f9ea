//! POS bigram statistics and the frequency table they are aggregated into

use crate::trace::TraceEntry;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Part-of-speech tag as emitted by the tagger
pub type Tag = String;

/// Ordered pair of adjacent POS tags
///
/// Derived `Ord` is lexical on `(first, second)` and serves as the
/// deterministic tie-break when two statistics share a frequency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BigramKey {
    pub first: Tag,
    pub second: Tag,
}

impl BigramKey {
    pub fn new(first: impl Into<Tag>, second: impl Into<Tag>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    /// Order-sensitive comparison against a tag pair
    pub fn matches(&self, first: &str, second: &str) -> bool {
        self.first == first && self.second == second
    }

    /// The same pair read in the opposite direction
    pub fn reversed(&self) -> Self {
        Self {
            first: self.second.clone(),
            second: self.first.clone(),
        }
    }
}

impl fmt::Display for BigramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first, self.second)
    }
}

/// A bigram together with its observed frequency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bigram {
    pub key: BigramKey,
    frequency: u64,
}

impl Bigram {
    /// First observation of a pair
    pub fn new(first: impl Into<Tag>, second: impl Into<Tag>) -> Self {
        Self::with_frequency(BigramKey::new(first, second), 1)
    }

    pub fn with_frequency(key: BigramKey, frequency: u64) -> Self {
        Self {
            key,
            frequency: frequency.max(1),
        }
    }

    pub fn first(&self) -> &str {
        &self.key.first
    }

    pub fn second(&self) -> &str {
        &self.key.second
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn increment(&mut self) {
        self.frequency = self.frequency.saturating_add(1);
    }
}

/// Ranking comparator: frequency descending, then `(first, second)` ascending
///
/// Passed explicitly wherever statistics are ranked so that no ordering is
/// implied by the type itself.
pub fn rank_order(a: &Bigram, b: &Bigram) -> Ordering {
    b.frequency
        .cmp(&a.frequency)
        .then_with(|| a.key.cmp(&b.key))
}

/// Frequency table of every adjacent tag pair observed
///
/// Accumulation is commutative: feeding the flat corpus and the trace
/// entries in any order produces identical frequencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BigramTable {
    counts: HashMap<BigramKey, u64>,
}

impl BigramTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a flat tagged corpus (whitespace/newline separated tags)
    pub fn from_corpus(text: &str) -> Self {
        let mut table = Self::new();
        table.observe_corpus(text);
        table
    }

    /// Build from the stack tags of a collection of trace entries
    pub fn from_entries(entries: &[TraceEntry]) -> Self {
        let mut table = Self::new();
        table.observe_entries(entries);
        table
    }

    /// Merge the flat corpus (if any) and the trace entries into one table
    pub fn aggregate(corpus: Option<&str>, entries: &[TraceEntry]) -> Self {
        let mut table = Self::new();
        if let Some(text) = corpus {
            table.observe_corpus(text);
        }
        table.observe_entries(entries);
        table
    }

    pub fn observe(&mut self, first: &str, second: &str) {
        *self
            .counts
            .entry(BigramKey::new(first, second))
            .or_insert(0) += 1;
    }

    /// Count every adjacent pair of a tag sequence
    pub fn observe_sequence<S: AsRef<str>>(&mut self, tags: &[S]) {
        for pair in tags.windows(2) {
            self.observe(pair[0].as_ref(), pair[1].as_ref());
        }
    }

    pub fn observe_corpus(&mut self, text: &str) {
        let tags: Vec<&str> = text.split_whitespace().collect();
        self.observe_sequence(&tags);
    }

    /// Entries whose stack holds fewer than two tags contribute nothing
    pub fn observe_entries(&mut self, entries: &[TraceEntry]) {
        for entry in entries {
            self.observe_sequence(entry.stack_pos());
        }
    }

    pub fn merge(&mut self, other: &BigramTable) {
        for (key, count) in &other.counts {
            *self.counts.entry(key.clone()).or_insert(0) += count;
        }
    }

    /// Frequency of the ordered pair, zero when never observed
    pub fn frequency(&self, first: &str, second: &str) -> u64 {
        self.counts
            .get(&BigramKey::new(first, second))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BigramKey, u64)> {
        self.counts.iter().map(|(k, v)| (k, *v))
    }

    /// All statistics ranked by [`rank_order`]
    pub fn ranked(&self) -> Vec<Bigram> {
        let mut bigrams: Vec<Bigram> = self
            .counts
            .iter()
            .map(|(key, count)| Bigram::with_frequency(key.clone(), *count))
            .collect();
        bigrams.sort_by(rank_order);
        bigrams
    }
}
