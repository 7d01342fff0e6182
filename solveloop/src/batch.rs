//! Batch scheduler: many independent repair loops on a fixed worker pool.
//!
//! Workers are scoped threads that claim problem indices from a shared
//! counter, so each problem is claimed once and at most `worker_count` loops
//! run at a time. Finished problems are sent back over a channel and recorded
//! in completion order. A failed problem never affects its siblings.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::types::ProblemStatement;
use crate::error::{BatchError, SolveError};
use crate::executor::BoundedExecutor;
use crate::io::solver::Solver;
use crate::repair::{RepairConfig, Solved, solve};

/// One outcome per input index, plus the order in which they finished.
#[derive(Debug, Default)]
pub struct BatchResult {
    entries: BTreeMap<usize, Result<Solved, SolveError>>,
    completion_order: Vec<usize>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Result<Solved, SolveError>> {
        self.entries.get(&index)
    }

    /// Entries keyed by input index, in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Result<Solved, SolveError>)> {
        self.entries.iter().map(|(index, result)| (*index, result))
    }

    /// Input indices in the order their loops finished.
    pub fn completion_order(&self) -> &[usize] {
        &self.completion_order
    }

    pub fn into_entries(self) -> BTreeMap<usize, Result<Solved, SolveError>> {
        self.entries
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.entries.len(),
            ..BatchSummary::default()
        };
        for result in self.entries.values() {
            match result {
                Ok(_) => summary.solved += 1,
                Err(SolveError::AttemptsExhausted { .. }) => summary.exhausted += 1,
                Err(SolveError::Solver { .. }) => summary.solver_failed += 1,
                Err(SolveError::InvalidBudget | SolveError::Invocation(_)) => {
                    summary.invalid += 1;
                }
            }
        }
        summary
    }
}

/// Outcome counts for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub solved: usize,
    pub exhausted: usize,
    pub solver_failed: usize,
    pub invalid: usize,
}

impl BatchSummary {
    pub fn all_solved(&self) -> bool {
        self.solved == self.total
    }
}

/// Solve every problem with at most `worker_count` repair loops in flight.
///
/// `on_complete` runs on the calling thread, once per problem, in completion
/// order. Only pool setup failures are returned as errors; per-problem
/// failures live in the [`BatchResult`].
#[instrument(skip_all, fields(problems = problems.len(), worker_count))]
pub fn run_batch<S, F>(
    solver: &S,
    executor: &BoundedExecutor,
    problems: &[ProblemStatement],
    config: &RepairConfig,
    worker_count: usize,
    mut on_complete: F,
) -> Result<BatchResult, BatchError>
where
    S: Solver + ?Sized,
    F: FnMut(usize, &Result<Solved, SolveError>),
{
    if worker_count == 0 {
        return Err(BatchError::InvalidWorkerCount);
    }
    let mut batch = BatchResult::default();
    if problems.is_empty() {
        return Ok(batch);
    }

    let workers = worker_count.min(problems.len());
    let next = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<(usize, Result<Solved, SolveError>)>();
    info!(workers, "starting batch");

    let spawn_error = thread::scope(|scope| {
        let mut spawn_error = None;
        for worker in 0..workers {
            let tx = tx.clone();
            let next = &next;
            let abort = &abort;
            let spawned = thread::Builder::new()
                .name(format!("batch-worker-{worker}"))
                .spawn_scoped(scope, move || {
                    while !abort.load(Ordering::SeqCst) {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(problem) = problems.get(index) else {
                            break;
                        };
                        debug!(worker, index, "claimed problem");
                        let result = solve(solver, executor, problem, config);
                        if tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            if let Err(err) = spawned {
                warn!(worker, err = %err, "failed to spawn batch worker");
                abort.store(true, Ordering::SeqCst);
                spawn_error = Some(err);
                break;
            }
        }
        drop(tx);

        for (index, result) in rx {
            on_complete(index, &result);
            batch.completion_order.push(index);
            batch.entries.insert(index, result);
        }
        spawn_error
    });

    if let Some(err) = spawn_error {
        return Err(BatchError::Spawn(err));
    }

    let summary = batch.summary();
    info!(
        solved = summary.solved,
        exhausted = summary.exhausted,
        solver_failed = summary.solver_failed,
        "batch complete"
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::SolverError;
    use crate::test_support::{GaugedSolver, ScriptedSolver, solution};
    use serde_json::Value;

    fn config() -> RepairConfig {
        RepairConfig {
            max_attempts: 2,
            timeout: Duration::from_secs(5),
            result_variable: "answer".to_string(),
        }
    }

    fn problems(texts: &[&str]) -> Vec<ProblemStatement> {
        texts.iter().map(|t| ProblemStatement::new(*t)).collect()
    }

    #[test]
    fn every_index_appears_once_despite_failures() {
        let solver = GaugedSolver::new(Duration::from_millis(10), |problem| {
            match problem.text() {
                "boom" => Err(SolverError::TimedOut(1)),
                "bad" => Ok(solution("?", "answer = 1 / 0")),
                _ => Ok(solution("4", "answer = 2 + 2")),
            }
        });
        let inputs = problems(&["ok", "boom", "bad", "ok"]);
        let mut seen = Vec::new();
        let result = run_batch(
            &solver,
            &solver.executor(),
            &inputs,
            &config(),
            2,
            |index, _| seen.push(index),
        )
        .expect("batch");

        assert_eq!(result.len(), 4);
        assert_eq!(seen, result.completion_order());
        assert!(matches!(result.get(1), Some(Err(SolveError::Solver { .. }))));
        assert!(matches!(
            result.get(2),
            Some(Err(SolveError::AttemptsExhausted { .. }))
        ));
        let summary = result.summary();
        assert_eq!(summary.solved, 2);
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.solver_failed, 1);
        assert!(!summary.all_solved());
        assert_eq!(solver.gauge().active(), 0);
        assert!(solver.peak() <= 2);
    }

    #[test]
    fn results_stay_keyed_by_input_index() {
        let solver = GaugedSolver::new(Duration::from_millis(5), |problem| {
            let code = format!("answer = {}", problem.text());
            Ok(solution(problem.text(), &code))
        });
        let inputs = problems(&["1", "2", "3", "4", "5"]);
        let result = run_batch(
            &solver,
            &solver.executor(),
            &inputs,
            &config(),
            3,
            |_, _| {},
        )
        .expect("batch");

        for (index, entry) in result.iter() {
            let solved = entry.as_ref().expect("solved");
            assert_eq!(solved.value, Value::from(index as i64 + 1));
        }
    }

    #[test]
    fn zero_workers_is_rejected() {
        let solver = ScriptedSolver::repeating(solution("4", "answer = 4"));
        let err = run_batch(
            &solver,
            &BoundedExecutor::script(),
            &problems(&["p"]),
            &config(),
            0,
            |_, _| {},
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::InvalidWorkerCount));
        assert_eq!(solver.calls(), 0);
    }

    #[test]
    fn empty_batch_is_empty_result() {
        let solver = ScriptedSolver::repeating(solution("4", "answer = 4"));
        let result = run_batch(
            &solver,
            &BoundedExecutor::script(),
            &[],
            &config(),
            3,
            |_, _| {},
        )
        .expect("batch");
        assert!(result.is_empty());
    }
}
