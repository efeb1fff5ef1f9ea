//! Parser transition tokens
//!
//! Serialized in the parser's own notation: `S`, `L(<label>)`, `R(<label>)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One discrete parser action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Transition {
    /// Move the next buffer token onto the stack
    Shift,
    /// Attach the second stack element to the top as its dependent
    Left(String),
    /// Attach the top stack element to the second as its dependent
    Right(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognised transition token `{0}`")]
pub struct ParseTransitionError(pub String);

impl Transition {
    pub fn left(label: impl Into<String>) -> Self {
        Transition::Left(label.into())
    }

    pub fn right(label: impl Into<String>) -> Self {
        Transition::Right(label.into())
    }

    /// Dependency label, `None` for shift
    pub fn label(&self) -> Option<&str> {
        match self {
            Transition::Shift => None,
            Transition::Left(label) | Transition::Right(label) => Some(label),
        }
    }

    /// True when the curriculum has already resolved this decision
    pub fn is_resolved(&self, resolved_label: &str) -> bool {
        self.label() == Some(resolved_label)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Shift => f.write_str("S"),
            Transition::Left(label) => write!(f, "L({label})"),
            Transition::Right(label) => write!(f, "R({label})"),
        }
    }
}

impl FromStr for Transition {
    type Err = ParseTransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token == "S" {
            return Ok(Transition::Shift);
        }

        let labelled = |prefix: &str| {
            token
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(')'))
                .filter(|label| !label.is_empty())
                .map(str::to_string)
        };

        if let Some(label) = labelled("L(") {
            Ok(Transition::Left(label))
        } else if let Some(label) = labelled("R(") {
            Ok(Transition::Right(label))
        } else {
            Err(ParseTransitionError(s.to_string()))
        }
    }
}

impl TryFrom<String> for Transition {
    type Error = ParseTransitionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Transition> for String {
    fn from(value: Transition) -> Self {
        value.to_string()
    }
}
