//! Typed failures surfaced by the executor, the repair loop, and the batch scheduler.

use thiserror::Error;

use crate::core::types::ExecutionOutcome;

/// Malformed executor invocation. Never retried.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("result variable must not be empty")]
    EmptyResultVariable,

    #[error("result variable {0:?} is not a valid identifier")]
    InvalidResultVariable(String),

    #[error("failed to spawn execution thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// The external solver call itself failed.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver I/O failed: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("solver command could not run: {0}")]
    Command(String),

    #[error("solver timed out after {0} seconds")]
    TimedOut(u64),

    #[error("solver exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("solver output is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("solver output failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("solver prompt rendering failed: {0}")]
    Prompt(#[from] minijinja::Error),
}

/// Terminal failure of one repair loop.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("max_attempts must be at least 1")]
    InvalidBudget,

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error("solver failed on attempt {attempt}: {source}")]
    Solver {
        attempt: u32,
        #[source]
        source: SolverError,
    },

    #[error("attempts exhausted after {attempts} attempt(s); last outcome: {last}")]
    AttemptsExhausted { attempts: u32, last: ExecutionOutcome },
}

/// Failure of the batch call as a whole.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("worker_count must be at least 1")]
    InvalidWorkerCount,

    #[error("failed to spawn batch worker: {0}")]
    Spawn(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_message_carries_last_outcome() {
        let err = SolveError::AttemptsExhausted {
            attempts: 2,
            last: ExecutionOutcome::Failure {
                message: "division by zero".to_string(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("2 attempt(s)"));
        assert!(text.contains("division by zero"));
    }

    #[test]
    fn schema_errors_are_joined() {
        let err = SolverError::Schema(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            err.to_string(),
            "solver output failed schema validation: a; b"
        );
    }
}
