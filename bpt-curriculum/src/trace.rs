//! Decision trace entries
//!
//! One entry per parser decision point: the configuration the parser saw,
//! the feature vector it scored and the transition it chose. Entries are
//! immutable once produced by the parsing engine; the only writer of
//! `transition` afterwards is the relabelling step (see
//! [`crate::scheduler::relabel`] and [`crate::arc::guide_entries`]).

use crate::transition::Transition;
use bpt_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Record of one parser decision point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    features: Vec<i32>,
    transition: Transition,
    stack_words: Vec<String>,
    #[serde(rename = "stackPOS")]
    stack_pos: Vec<String>,
    buffer_words: Vec<String>,
    #[serde(rename = "bufferPOS")]
    buffer_pos: Vec<String>,
    #[serde(default)]
    arcs: Vec<String>,
    #[serde(default)]
    part_of_speech_arcs: Vec<String>,
}

/// Builder input for [`TraceEntry::new`]
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub stack_words: Vec<String>,
    pub stack_pos: Vec<String>,
    pub buffer_words: Vec<String>,
    pub buffer_pos: Vec<String>,
    pub arcs: Vec<String>,
    pub part_of_speech_arcs: Vec<String>,
}

impl TraceEntry {
    /// Create an entry, checking that parallel arrays agree in length
    pub fn new(
        configuration: Configuration,
        features: Vec<i32>,
        transition: Transition,
    ) -> Result<Self> {
        let entry = Self {
            features,
            transition,
            stack_words: configuration.stack_words,
            stack_pos: configuration.stack_pos,
            buffer_words: configuration.buffer_words,
            buffer_pos: configuration.buffer_pos,
            arcs: configuration.arcs,
            part_of_speech_arcs: configuration.part_of_speech_arcs,
        };
        entry.validate().map_err(Error::InvalidInput)?;
        Ok(entry)
    }

    /// Arity check between stack and buffer parallel arrays
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.stack_words.len() != self.stack_pos.len() {
            return Err(format!(
                "stackWords has {} elements but stackPOS has {}",
                self.stack_words.len(),
                self.stack_pos.len()
            ));
        }
        if self.buffer_words.len() != self.buffer_pos.len() {
            return Err(format!(
                "bufferWords has {} elements but bufferPOS has {}",
                self.buffer_words.len(),
                self.buffer_pos.len()
            ));
        }
        Ok(())
    }

    pub fn features(&self) -> &[i32] {
        &self.features
    }

    pub fn transition(&self) -> &Transition {
        &self.transition
    }

    pub fn stack_words(&self) -> &[String] {
        &self.stack_words
    }

    pub fn stack_pos(&self) -> &[String] {
        &self.stack_pos
    }

    pub fn buffer_words(&self) -> &[String] {
        &self.buffer_words
    }

    pub fn buffer_pos(&self) -> &[String] {
        &self.buffer_pos
    }

    pub fn arcs(&self) -> &[String] {
        &self.arcs
    }

    pub fn part_of_speech_arcs(&self) -> &[String] {
        &self.part_of_speech_arcs
    }

    /// The last two stack tags, `(second-from-top, top)`
    pub fn top_two_pos(&self) -> Option<(&str, &str)> {
        match self.stack_pos.as_slice() {
            [.., a, b] => Some((a.as_str(), b.as_str())),
            _ => None,
        }
    }

    /// A copy carrying a different transition
    pub fn with_transition(&self, transition: Transition) -> Self {
        Self {
            transition,
            ..self.clone()
        }
    }

    pub(crate) fn set_transition(&mut self, transition: Transition) {
        self.transition = transition;
    }
}
