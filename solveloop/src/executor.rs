//! Bounded executor: run one snippet with a hard deadline on caller latency.
//!
//! Each call evaluates the snippet on its own named thread and waits on a
//! channel with `recv_timeout`. When the deadline elapses the call returns
//! [`ExecutionOutcome::Timeout`] immediately and requests cancellation
//! through a [`CancelToken`]; it never joins the worker. The shipped runtimes
//! honour the token, but a runtime that ignores it keeps its thread (and its
//! CPU and memory) until the snippet finishes on its own.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::core::cancel::CancelToken;
use crate::core::types::ExecutionOutcome;
use crate::error::InvocationError;
use crate::io::runtime::{Evaluation, ScriptRuntime, SnippetRuntime};

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Runs snippets through a [`SnippetRuntime`] under a wall-clock deadline.
///
/// Cloning is cheap; clones share the runtime but no per-call state.
#[derive(Clone)]
pub struct BoundedExecutor {
    runtime: Arc<dyn SnippetRuntime>,
}

impl BoundedExecutor {
    pub fn new(runtime: Arc<dyn SnippetRuntime>) -> Self {
        Self { runtime }
    }

    /// Executor backed by the in-process script runtime.
    pub fn script() -> Self {
        Self::new(Arc::new(ScriptRuntime))
    }

    pub fn runtime(&self) -> &dyn SnippetRuntime {
        self.runtime.as_ref()
    }

    /// Run `code` and read `result_variable`, waiting at most `timeout`.
    ///
    /// Snippet errors, missing bindings, runtime crashes, and deadlines are
    /// all reported as [`ExecutionOutcome`] values. Only a malformed call
    /// returns an error.
    #[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64, result_variable))]
    pub fn run(
        &self,
        code: &str,
        timeout: Duration,
        result_variable: &str,
    ) -> Result<ExecutionOutcome, InvocationError> {
        validate_invocation(timeout, result_variable)?;

        let cancel = CancelToken::new();
        let (tx, rx) = mpsc::channel();
        let runtime = Arc::clone(&self.runtime);
        let worker_cancel = cancel.clone();
        let code = code.to_string();
        let variable = result_variable.to_string();

        let started = Instant::now();
        thread::Builder::new()
            .name("snippet-exec".to_string())
            .spawn(move || {
                let evaluation = runtime.evaluate(&code, &variable, &worker_cancel);
                // The caller may have stopped listening after a timeout.
                let _ = tx.send(evaluation);
            })
            .map_err(InvocationError::Spawn)?;

        let outcome = match rx.recv_timeout(timeout) {
            Ok(Ok(evaluation)) => outcome_from(evaluation, result_variable),
            Ok(Err(err)) => {
                let message = format!("{err:#}");
                warn!(err = %message, "snippet runtime failed");
                ExecutionOutcome::Failure { message }
            }
            Err(RecvTimeoutError::Timeout) => {
                cancel.cancel();
                warn!("snippet exceeded deadline, abandoning execution thread");
                ExecutionOutcome::Timeout
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("snippet runtime thread exited without a result");
                ExecutionOutcome::Failure {
                    message: "snippet runtime panicked".to_string(),
                }
            }
        };

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = outcome.is_success(),
            "snippet finished"
        );
        Ok(outcome)
    }
}

fn validate_invocation(timeout: Duration, result_variable: &str) -> Result<(), InvocationError> {
    if timeout.is_zero() {
        return Err(InvocationError::ZeroTimeout);
    }
    if result_variable.is_empty() {
        return Err(InvocationError::EmptyResultVariable);
    }
    if !IDENTIFIER_RE.is_match(result_variable) {
        return Err(InvocationError::InvalidResultVariable(
            result_variable.to_string(),
        ));
    }
    Ok(())
}

fn outcome_from(evaluation: Evaluation, result_variable: &str) -> ExecutionOutcome {
    match evaluation {
        Evaluation::Bound(value) => ExecutionOutcome::Success { value },
        Evaluation::Unbound => ExecutionOutcome::Failure {
            message: format!("{result_variable} not set"),
        },
        Evaluation::Raised(message) => ExecutionOutcome::Failure { message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct PanickingRuntime;

    impl SnippetRuntime for PanickingRuntime {
        fn language(&self) -> &'static str {
            "panic"
        }

        fn guidelines(&self) -> &'static str {
            ""
        }

        fn evaluate(
            &self,
            _code: &str,
            _result_variable: &str,
            _cancel: &CancelToken,
        ) -> anyhow::Result<Evaluation> {
            panic!("runtime bug");
        }
    }

    /// Ignores cancellation entirely, like a non-cooperative embedded engine.
    struct StubbornRuntime;

    impl SnippetRuntime for StubbornRuntime {
        fn language(&self) -> &'static str {
            "stubborn"
        }

        fn guidelines(&self) -> &'static str {
            ""
        }

        fn evaluate(
            &self,
            _code: &str,
            _result_variable: &str,
            _cancel: &CancelToken,
        ) -> anyhow::Result<Evaluation> {
            thread::sleep(Duration::from_secs(3));
            Ok(Evaluation::Unbound)
        }
    }

    #[test]
    fn bound_variable_is_success() {
        let outcome = BoundedExecutor::script()
            .run("answer = 2 + 2", TIMEOUT, "answer")
            .expect("run");
        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                value: Value::from(4)
            }
        );
    }

    #[test]
    fn raised_error_is_failure_with_text() {
        let code = "a = 10\nb = 0\nanswer = a / b";
        let outcome = BoundedExecutor::script()
            .run(code, TIMEOUT, "answer")
            .expect("run");
        assert_eq!(
            outcome,
            ExecutionOutcome::Failure {
                message: "division by zero".to_string()
            }
        );
    }

    #[test]
    fn unbound_variable_names_the_slot() {
        let outcome = BoundedExecutor::script()
            .run("total = 3", TIMEOUT, "answer")
            .expect("run");
        assert_eq!(
            outcome,
            ExecutionOutcome::Failure {
                message: "answer not set".to_string()
            }
        );
    }

    #[test]
    fn infinite_loop_times_out_near_deadline() {
        let timeout = Duration::from_millis(150);
        let started = Instant::now();
        let outcome = BoundedExecutor::script()
            .run("while true { }", timeout, "answer")
            .expect("run");
        assert_eq!(outcome, ExecutionOutcome::Timeout);
        assert!(started.elapsed() < timeout + Duration::from_secs(1));
    }

    #[test]
    fn deeply_nested_snippets_fail_without_crashing() {
        let executor = BoundedExecutor::script();
        for code in [
            "(".repeat(100_000),
            format!("answer = {}1", "-".repeat(10_000)),
            format!("answer = 1{}", " + 1".repeat(50_000)),
        ] {
            let outcome = executor.run(&code, TIMEOUT, "answer").expect("run");
            let ExecutionOutcome::Failure { message } = outcome else {
                panic!("expected failure, got {outcome:?}");
            };
            assert!(message.contains("nested too deeply"), "{message}");
        }
    }

    #[test]
    fn non_cooperative_runtime_is_abandoned_at_deadline() {
        let executor = BoundedExecutor::new(Arc::new(StubbornRuntime));
        let started = Instant::now();
        let outcome = executor
            .run("anything", Duration::from_millis(100), "answer")
            .expect("run");
        assert_eq!(outcome, ExecutionOutcome::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn runtime_panic_is_failure() {
        let executor = BoundedExecutor::new(Arc::new(PanickingRuntime));
        let outcome = executor.run("x", TIMEOUT, "answer").expect("run");
        assert_eq!(
            outcome,
            ExecutionOutcome::Failure {
                message: "snippet runtime panicked".to_string()
            }
        );
    }

    #[test]
    fn malformed_invocations_are_rejected() {
        let executor = BoundedExecutor::script();
        assert!(matches!(
            executor.run("answer = 1", Duration::ZERO, "answer"),
            Err(InvocationError::ZeroTimeout)
        ));
        assert!(matches!(
            executor.run("answer = 1", TIMEOUT, ""),
            Err(InvocationError::EmptyResultVariable)
        ));
        assert!(matches!(
            executor.run("answer = 1", TIMEOUT, "1answer"),
            Err(InvocationError::InvalidResultVariable(_))
        ));
    }
}
