//! Arc-direction heuristic
//!
//! Decides, for a stack tag pair, whether the observed bigram statistics
//! favour attaching right, attaching left or shifting.

use crate::bigram::BigramTable;
use crate::trace::TraceEntry;
use crate::transition::Transition;
use bpt_common::config::{CurriculumConfig, TieBreak};
use serde::Serialize;
use tracing::debug;

/// Structural action suggested for a tag pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcDecision {
    Shift,
    AttachLeft,
    AttachRight,
}

impl ArcDecision {
    /// Transition token carrying the resolved label
    pub fn to_transition(self, resolved_label: &str) -> Transition {
        match self {
            ArcDecision::Shift => Transition::Shift,
            ArcDecision::AttachLeft => Transition::left(resolved_label),
            ArcDecision::AttachRight => Transition::right(resolved_label),
        }
    }
}

/// Core decision rule
///
/// Shift when the rare-pattern mass exceeds both readings; otherwise the
/// more frequent reading wins, with `tie_break` settling equal counts.
pub fn decide_arc(r_frequency: u64, l_frequency: u64, shift_mass: u64, tie_break: TieBreak) -> ArcDecision {
    if shift_mass > r_frequency.max(l_frequency) {
        ArcDecision::Shift
    } else if r_frequency > l_frequency {
        ArcDecision::AttachRight
    } else if l_frequency > r_frequency {
        ArcDecision::AttachLeft
    } else {
        match tie_break {
            TieBreak::Left => ArcDecision::AttachLeft,
            TieBreak::Right => ArcDecision::AttachRight,
        }
    }
}

/// Heuristic parameters derived from one bigram table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcPolicy {
    /// Bigrams rarer than this count towards the shift mass
    pub threshold: u64,
    /// Summed frequency of all rare bigrams
    pub shift_mass: u64,
    pub tie_break: TieBreak,
}

impl ArcPolicy {
    /// Threshold is total observed frequency over `threshold_divisor`
    pub fn from_table(table: &BigramTable, config: &CurriculumConfig) -> Self {
        let threshold = table.total() / config.threshold_divisor.max(1);
        let shift_mass = table
            .iter()
            .filter(|(key, _)| config.root_in_shift_mass || key.first != config.root_marker)
            .filter(|(_, count)| *count < threshold)
            .map(|(_, count)| count)
            .sum();

        debug!(threshold, shift_mass, "Arc policy derived");

        Self {
            threshold,
            shift_mass,
            tie_break: config.tie_break,
        }
    }

    /// Decide for the pair `(pos_a, pos_b)` as it sits on the stack
    pub fn decide(&self, table: &BigramTable, pos_a: &str, pos_b: &str) -> ArcDecision {
        let r_frequency = table.frequency(pos_a, pos_b);
        let l_frequency = table.frequency(pos_b, pos_a);
        decide_arc(r_frequency, l_frequency, self.shift_mass, self.tie_break)
    }
}

/// Normalised attach-right / attach-left shares for a tag pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArcProbabilities {
    pub right: f64,
    pub left: f64,
}

/// Both shares are zero when neither reading was observed
pub fn arc_probabilities(table: &BigramTable, pos_a: &str, pos_b: &str) -> ArcProbabilities {
    let r = table.frequency(pos_a, pos_b) as f64;
    let l = table.frequency(pos_b, pos_a) as f64;
    let total = r + l;
    if total == 0.0 {
        return ArcProbabilities { right: 0.0, left: 0.0 };
    }
    ArcProbabilities {
        right: r / total,
        left: l / total,
    }
}

/// Rewrite every entry with two or more stack tags to the heuristic's choice
///
/// Returns the number of entries whose transition changed.
pub fn guide_entries(
    entries: &mut [TraceEntry],
    table: &BigramTable,
    policy: &ArcPolicy,
    resolved_label: &str,
) -> usize {
    let mut changed = 0;
    for entry in entries.iter_mut() {
        let Some((a, b)) = entry.top_two_pos() else {
            continue;
        };
        let next = policy.decide(table, a, b).to_transition(resolved_label);
        if *entry.transition() != next {
            debug!(from = %entry.transition(), to = %next, "Guided transition");
            entry.set_transition(next);
            changed += 1;
        }
    }
    changed
}
