//! Training examples built from trace entries
//!
//! Each example pairs the entry's feature vector with one label per
//! transition in the vocabulary: `1` for the chosen transition, `0` for a
//! transition that was legal but not chosen, `-1` for an illegal one.

use crate::trace::TraceEntry;
use crate::transition::Transition;
use serde::{Deserialize, Serialize};

/// Dependency labels known to the default parser model
pub const DEFAULT_LABELS: [&str; 21] = [
    "ROOT", "NMOD", "DEP", "P", "ADV", "PMOD", "OBJ", "COORD", "VC", "PRD", "CONJ", "AMOD", "IM",
    "OPRD", "NAME", "SUB", "APPO", "PRT", "SUFFIX", "PRN", "TITLE",
];

pub const LABEL_CORRECT: i8 = 1;
pub const LABEL_LEGAL: i8 = 0;
pub const LABEL_ILLEGAL: i8 = -1;

/// Ordered set of transitions the classifier scores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionVocabulary {
    transitions: Vec<Transition>,
}

impl TransitionVocabulary {
    /// All `L(x)`, then all `R(x)`, then `S`
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut transitions: Vec<Transition> =
            labels.iter().map(|l| Transition::left(l.as_ref())).collect();
        transitions.extend(labels.iter().map(|l| Transition::right(l.as_ref())));
        transitions.push(Transition::Shift);
        Self { transitions }
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

impl Default for TransitionVocabulary {
    fn default() -> Self {
        Self::from_labels(&DEFAULT_LABELS)
    }
}

/// Whether `candidate` could be applied in the entry's configuration
pub fn can_apply(candidate: &Transition, entry: &TraceEntry) -> bool {
    let stack_size = entry.stack_words().len();
    let buffer_size = entry.buffer_words().len();

    match candidate {
        Transition::Shift => buffer_size > 0,
        // The dependent may not be the root
        Transition::Left(_) => stack_size > 2,
        Transition::Right(label) => {
            if stack_size == 2 && buffer_size == 0 && label == "ROOT" {
                return true;
            }
            stack_size >= 2
        }
    }
}

/// Feature vector plus per-transition label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub features: Vec<i32>,
    pub label: Vec<i8>,
}

impl TrainingExample {
    pub fn from_entry(entry: &TraceEntry, vocabulary: &TransitionVocabulary) -> Self {
        let label = vocabulary
            .transitions()
            .iter()
            .map(|candidate| {
                if candidate == entry.transition() {
                    LABEL_CORRECT
                } else if can_apply(candidate, entry) {
                    LABEL_LEGAL
                } else {
                    LABEL_ILLEGAL
                }
            })
            .collect();

        Self {
            features: entry.features().to_vec(),
            label,
        }
    }

    /// Index of the correct transition, if the entry's choice is in the vocabulary
    pub fn correct_index(&self) -> Option<usize> {
        self.label.iter().position(|&l| l == LABEL_CORRECT)
    }
}

/// Label every entry against the vocabulary
pub fn extract_examples(
    entries: &[TraceEntry],
    vocabulary: &TransitionVocabulary,
) -> Vec<TrainingExample> {
    entries
        .iter()
        .map(|entry| TrainingExample::from_entry(entry, vocabulary))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::tests::entry;

    #[test]
    fn default_vocabulary_has_43_transitions() {
        let vocab = TransitionVocabulary::default();
        assert_eq!(vocab.len(), 43);
        assert_eq!(vocab.transitions()[0], Transition::left("ROOT"));
        assert_eq!(vocab.transitions()[21], Transition::right("ROOT"));
        assert_eq!(vocab.transitions()[42], Transition::Shift);
    }

    #[test]
    fn labels_mark_correct_legal_and_illegal() {
        let vocab = TransitionVocabulary::from_labels(&["NMOD"]);
        // stack of 3, non-empty buffer: everything legal
        let e = entry(&["-ROOT-", "DT", "NN"], &["VB"], "L(NMOD)");
        let example = TrainingExample::from_entry(&e, &vocab);
        assert_eq!(example.label, vec![1, 0, 0]);
        assert_eq!(example.correct_index(), Some(0));
        assert_eq!(example.features, vec![1, 2, 3]);
    }

    #[test]
    fn left_arc_illegal_on_root_dependent() {
        let vocab = TransitionVocabulary::from_labels(&["NMOD"]);
        let e = entry(&["-ROOT-", "NN"], &[], "R(NMOD)");
        let example = TrainingExample::from_entry(&e, &vocab);
        // L illegal (stack 2), R chosen, S illegal (empty buffer)
        assert_eq!(example.label, vec![-1, 1, -1]);
    }

    #[test]
    fn root_attachment_legal_at_end_of_sentence() {
        let e = entry(&["-ROOT-", "VB"], &[], "S");
        assert!(can_apply(&Transition::right("ROOT"), &e));
        assert!(!can_apply(&Transition::Shift, &e));
    }

    #[test]
    fn resolved_transition_outside_vocabulary_has_no_correct_label() {
        let vocab = TransitionVocabulary::default();
        let e = entry(&["-ROOT-", "DT", "NN"], &["VB"], "L(PARSED)");
        let example = TrainingExample::from_entry(&e, &vocab);
        assert_eq!(example.correct_index(), None);
        assert!(example.label.iter().all(|&l| l == LABEL_LEGAL));
    }
}
