//! Repair context: the templated text that steers the next solver call.

use crate::core::types::{ExecutionOutcome, ProblemStatement};

/// Derive the statement for the next attempt from the original problem.
///
/// Always built from `original`, never from a previously refined statement,
/// so repeated failures do not nest context.
pub fn refine(original: &ProblemStatement, outcome: &ExecutionOutcome) -> Option<ProblemStatement> {
    let reason = outcome.failure_reason()?;
    Some(ProblemStatement::new(format!(
        "The previous code failed to execute with the error: {reason}. \
         Please provide a corrected version that solves this problem: {}",
        original.text()
    )))
}
