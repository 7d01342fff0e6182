//! Shared deterministic types for the solve loop.
//!
//! These types define stable contracts between the executor, the repair loop,
//! and the batch scheduler. They carry no I/O and are immutable once built.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minimum length of a generated snippet accepted at the solver boundary.
pub const MIN_CODE_LEN: usize = 10;

/// Natural-language task text handed to the solver.
///
/// Refinement never mutates a statement; it derives a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProblemStatement(String);

impl ProblemStatement {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProblemStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProblemStatement {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Structured output produced by the solver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// Final answer as stated by the generator.
    pub answer: String,
    /// Human-readable derivation.
    #[serde(alias = "explanation", default)]
    pub step_by_step: String,
    /// Snippet that must bind the result variable.
    #[serde(alias = "python_code")]
    pub code: String,
}

/// Result of exactly one bounded execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success { value: Value },
    Failure { message: String },
    Timeout,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Text used when this outcome feeds the next repair attempt.
    ///
    /// `None` for successes.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { message } => Some(message),
            Self::Timeout => Some("execution timed out"),
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { value } => write!(f, "success: {value}"),
            Self::Failure { message } => write!(f, "failure: {message}"),
            Self::Timeout => f.write_str("execution timed out"),
        }
    }
}

/// One solver + executor round trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// 1-based attempt index.
    pub attempt: u32,
    pub problem: ProblemStatement,
    pub solution: Solution,
    pub outcome: ExecutionOutcome,
}
