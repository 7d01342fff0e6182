//! End-to-end repair loop scenarios against the script runtime.

use std::time::Duration;

use serde_json::Value;
use solveloop::core::types::{ExecutionOutcome, ProblemStatement};
use solveloop::error::SolveError;
use solveloop::executor::BoundedExecutor;
use solveloop::repair::{RepairConfig, solve, solve_with};
use solveloop::test_support::{ScriptedSolver, solution};

fn repair_config(max_attempts: u32) -> RepairConfig {
    RepairConfig {
        max_attempts,
        timeout: Duration::from_secs(5),
        result_variable: "answer".to_string(),
    }
}

#[test]
fn two_plus_two_is_solved_on_first_attempt() {
    let solver = ScriptedSolver::new(vec![Ok(solution("4", "answer = 2 + 2"))]);
    let solved = solve(
        &solver,
        &BoundedExecutor::script(),
        &ProblemStatement::new("What is 2 + 2?"),
        &repair_config(2),
    )
    .expect("solve");

    assert_eq!(solved.solution.answer, "4");
    assert_eq!(solved.value, Value::from(4));
    assert_eq!(solved.attempts.len(), 1);
}

#[test]
fn division_by_zero_exhausts_with_diagnostic() {
    let solver = ScriptedSolver::repeating(solution("undefined", "answer = 5 / 0"));
    let err = solve(
        &solver,
        &BoundedExecutor::script(),
        &ProblemStatement::new("What is 5 / 0?"),
        &repair_config(2),
    )
    .unwrap_err();

    assert_eq!(solver.calls(), 2);
    assert!(err.to_string().contains("division by zero"));
    let SolveError::AttemptsExhausted { attempts, last } = err else {
        panic!("expected exhausted, got {err:?}");
    };
    assert_eq!(attempts, 2);
    assert!(matches!(last, ExecutionOutcome::Failure { .. }));
}

#[test]
fn missing_binding_is_repaired_with_context() {
    let solver = ScriptedSolver::new(vec![
        Ok(solution("16", "result = sqrt(256)")),
        Ok(solution("16", "answer = sqrt(256)")),
    ]);
    let mut outcomes = Vec::new();
    let solved = solve_with(
        &solver,
        &BoundedExecutor::script(),
        &ProblemStatement::new("Square root of 256?"),
        &repair_config(3),
        |record| outcomes.push(record.outcome.clone()),
    )
    .expect("solve");

    assert_eq!(solved.value, Value::from(16.0));
    assert_eq!(
        outcomes[0],
        ExecutionOutcome::Failure {
            message: "answer not set".to_string()
        }
    );
    let retry = &solver.problems()[1];
    assert!(retry.text().contains("answer not set"));
    assert!(retry.text().ends_with("Square root of 256?"));
}
