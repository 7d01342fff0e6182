//! Repair loop: solve one problem, feeding execution failures back to the solver.

use std::time::Duration;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::core::repair_context::refine;
use crate::core::types::{AttemptRecord, ExecutionOutcome, ProblemStatement, Solution};
use crate::error::SolveError;
use crate::executor::BoundedExecutor;
use crate::io::config::SolveConfig;
use crate::io::solver::Solver;

/// Per-problem loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairConfig {
    /// Hard cap on solver + executor round trips.
    pub max_attempts: u32,
    /// Deadline for each snippet run.
    pub timeout: Duration,
    /// Variable the snippet must bind.
    pub result_variable: String,
}

impl RepairConfig {
    pub fn from_config(cfg: &SolveConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            timeout: cfg.execution.timeout(),
            result_variable: cfg.result_variable.clone(),
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self::from_config(&SolveConfig::default())
    }
}

/// A validated solution together with the value its snippet computed.
#[derive(Debug, Clone, PartialEq)]
pub struct Solved {
    pub solution: Solution,
    pub value: Value,
    /// Every attempt in order; the last one is the successful attempt.
    pub attempts: Vec<AttemptRecord>,
}

/// Solve `problem`, retrying with repair context until a snippet succeeds
/// or the attempt budget runs out.
pub fn solve<S: Solver + ?Sized>(
    solver: &S,
    executor: &BoundedExecutor,
    problem: &ProblemStatement,
    config: &RepairConfig,
) -> Result<Solved, SolveError> {
    solve_with(solver, executor, problem, config, |_| {})
}

/// Like [`solve`], calling `on_attempt` after each attempt's outcome is known.
///
/// Attempts are strictly sequential. A solver error ends the loop at once;
/// execution failures and timeouts are retried.
#[instrument(skip_all, fields(max_attempts = config.max_attempts))]
pub fn solve_with<S: Solver + ?Sized, F: FnMut(&AttemptRecord)>(
    solver: &S,
    executor: &BoundedExecutor,
    problem: &ProblemStatement,
    config: &RepairConfig,
    mut on_attempt: F,
) -> Result<Solved, SolveError> {
    if config.max_attempts == 0 {
        return Err(SolveError::InvalidBudget);
    }

    let mut current = problem.clone();
    let mut history: Vec<AttemptRecord> = Vec::new();

    for attempt in 1..=config.max_attempts {
        info!(attempt, "requesting solution");
        let solution = solver
            .generate(&current)
            .map_err(|source| SolveError::Solver { attempt, source })?;

        let outcome = executor.run(&solution.code, config.timeout, &config.result_variable)?;
        let record = AttemptRecord {
            attempt,
            problem: current,
            solution,
            outcome,
        };
        on_attempt(&record);

        if let ExecutionOutcome::Success { value } = &record.outcome {
            info!(attempt, "snippet succeeded");
            let solution = record.solution.clone();
            let value = value.clone();
            history.push(record);
            return Ok(Solved {
                solution,
                value,
                attempts: history,
            });
        }

        warn!(
            attempt,
            reason = record.outcome.failure_reason().unwrap_or_default(),
            "attempt failed"
        );
        current = refine(problem, &record.outcome).unwrap_or_else(|| problem.clone());
        history.push(record);
    }

    match history.pop() {
        Some(last) => Err(SolveError::AttemptsExhausted {
            attempts: config.max_attempts,
            last: last.outcome,
        }),
        None => Err(SolveError::InvalidBudget),
    }
}
