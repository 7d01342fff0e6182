//! Test-only solvers and helpers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::core::cancel::CancelToken;
use crate::core::types::{ProblemStatement, Solution};
use crate::error::SolverError;
use crate::executor::BoundedExecutor;
use crate::io::runtime::{Evaluation, ScriptRuntime, SnippetRuntime};
use crate::io::solver::Solver;

/// Build a solution with a fixed explanation.
pub fn solution(answer: &str, code: &str) -> Solution {
    Solution {
        answer: answer.to_string(),
        step_by_step: format!("compute {answer}"),
        code: code.to_string(),
    }
}

enum Script {
    Queue(VecDeque<Result<Solution, SolverError>>),
    Repeat(Solution),
}

/// Solver that replays queued responses and records every problem it sees.
pub struct ScriptedSolver {
    script: Mutex<Script>,
    seen: Mutex<Vec<ProblemStatement>>,
}

impl ScriptedSolver {
    /// Replay `responses` in order; further calls fail.
    pub fn new(responses: Vec<Result<Solution, SolverError>>) -> Self {
        Self::with_script(Script::Queue(responses.into()))
    }

    /// Return `solution` for every call.
    pub fn repeating(solution: Solution) -> Self {
        Self::with_script(Script::Repeat(solution))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().expect("seen lock").len()
    }

    pub fn problems(&self) -> Vec<ProblemStatement> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl Solver for ScriptedSolver {
    fn generate(&self, problem: &ProblemStatement) -> Result<Solution, SolverError> {
        self.seen.lock().expect("seen lock").push(problem.clone());
        match &mut *self.script.lock().expect("script lock") {
            Script::Queue(queue) => queue.pop_front().unwrap_or_else(|| {
                Err(SolverError::Command("scripted solver exhausted".to_string()))
            }),
            Script::Repeat(solution) => Ok(solution.clone()),
        }
    }
}

/// Counts repair loops that are inside an attempt, and the highest count seen.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Solver keyed on problem text, paired with a [`GaugedRuntime`].
///
/// An attempt enters the shared gauge when `generate` starts and leaves it
/// when the paired runtime finishes the snippet, so the gauge spans the
/// solver and executor phases of every attempt. A solver error leaves
/// immediately since no snippet will run. Both phases sleep for `delay`.
pub struct GaugedSolver<F> {
    respond: F,
    delay: Duration,
    gauge: Arc<ConcurrencyGauge>,
}

impl<F> GaugedSolver<F>
where
    F: Fn(&ProblemStatement) -> Result<Solution, SolverError> + Send + Sync,
{
    pub fn new(delay: Duration, respond: F) -> Self {
        Self {
            respond,
            delay,
            gauge: Arc::new(ConcurrencyGauge::default()),
        }
    }

    /// Executor whose runtime closes the attempts this solver opens.
    pub fn executor(&self) -> BoundedExecutor {
        BoundedExecutor::new(Arc::new(GaugedRuntime {
            delay: self.delay,
            gauge: Arc::clone(&self.gauge),
        }))
    }

    pub fn gauge(&self) -> &ConcurrencyGauge {
        &self.gauge
    }

    /// Highest number of attempts observed in flight at once.
    pub fn peak(&self) -> usize {
        self.gauge.peak()
    }
}

impl<F> Solver for GaugedSolver<F>
where
    F: Fn(&ProblemStatement) -> Result<Solution, SolverError> + Send + Sync,
{
    fn generate(&self, problem: &ProblemStatement) -> Result<Solution, SolverError> {
        self.gauge.enter();
        thread::sleep(self.delay);
        let response = (self.respond)(problem);
        if response.is_err() {
            self.gauge.exit();
        }
        response
    }
}

/// Script runtime that closes a [`GaugedSolver`] attempt once the snippet ends.
pub struct GaugedRuntime {
    delay: Duration,
    gauge: Arc<ConcurrencyGauge>,
}

impl SnippetRuntime for GaugedRuntime {
    fn language(&self) -> &'static str {
        ScriptRuntime.language()
    }

    fn guidelines(&self) -> &'static str {
        ScriptRuntime.guidelines()
    }

    fn evaluate(
        &self,
        code: &str,
        result_variable: &str,
        cancel: &CancelToken,
    ) -> anyhow::Result<Evaluation> {
        thread::sleep(self.delay);
        let evaluation = ScriptRuntime.evaluate(code, result_variable, cancel);
        self.gauge.exit();
        evaluation
    }
}
