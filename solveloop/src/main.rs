//! Self-correcting solve loop CLI.
//!
//! `exec` runs one snippet under the bounded executor. `solve` and `batch`
//! drive the repair loop against the configured solver command. Results go to
//! stdout as JSON lines; diagnostics go to stderr.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;

use solveloop::batch::{BatchSummary, run_batch};
use solveloop::core::types::{ExecutionOutcome, ProblemStatement};
use solveloop::error::SolveError;
use solveloop::exit_codes;
use solveloop::io::config::{DEFAULT_CONFIG_FILE, RuntimeKind, SolveConfig, load_config};
use solveloop::io::solver::{CommandSolver, solution_schema};
use solveloop::logging;
use solveloop::repair::{RepairConfig, Solved, solve_with};

#[derive(Parser)]
#[command(
    name = "solveloop",
    version,
    about = "Generate, execute, and repair code solutions under a deadline"
)]
struct Cli {
    /// Config file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one snippet and print the value of its result variable.
    Exec {
        /// Snippet file, or `-` for stdin.
        path: String,
        /// Deadline in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Result variable to read.
        #[arg(long = "var")]
        result_variable: Option<String>,
        #[arg(long, value_enum)]
        runtime: Option<RuntimeArg>,
    },
    /// Solve one problem with the repair loop.
    Solve {
        problem: String,
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Solve every non-empty line of a file concurrently.
    Batch {
        path: PathBuf,
        /// Number of concurrent repair loops.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Print the JSON schema solver output must satisfy.
    Schema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RuntimeArg {
    Script,
    Python,
}

impl From<RuntimeArg> for RuntimeKind {
    fn from(value: RuntimeArg) -> Self {
        match value {
            RuntimeArg::Script => RuntimeKind::Script,
            RuntimeArg::Python => RuntimeKind::Python,
        }
    }
}

/// One JSON line per solved (or abandoned) problem.
#[derive(Debug, Serialize)]
struct Report<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
    problem: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let mut cfg = load_config(&cli.config)?;
    match cli.command {
        Command::Exec {
            path,
            timeout_ms,
            result_variable,
            runtime,
        } => {
            if let Some(timeout_ms) = timeout_ms {
                cfg.execution.timeout_ms = timeout_ms;
            }
            if let Some(result_variable) = result_variable {
                cfg.result_variable = result_variable;
            }
            if let Some(runtime) = runtime {
                cfg.execution.runtime = runtime.into();
            }
            cfg.validate()?;
            cmd_exec(&cfg, &path)
        }
        Command::Solve {
            problem,
            max_attempts,
        } => {
            if let Some(max_attempts) = max_attempts {
                cfg.max_attempts = max_attempts;
            }
            cfg.validate()?;
            cmd_solve(&cfg, &problem)
        }
        Command::Batch { path, workers } => {
            if let Some(workers) = workers {
                cfg.worker_count = workers;
            }
            cfg.validate()?;
            cmd_batch(&cfg, &path)
        }
        Command::Schema => {
            print!("{}", solution_schema());
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_exec(cfg: &SolveConfig, path: &str) -> Result<i32> {
    let code = read_source(path)?;
    let executor = cfg.execution.build_executor();
    let outcome = executor.run(&code, cfg.execution.timeout(), &cfg.result_variable)?;
    match outcome {
        ExecutionOutcome::Success { value } => {
            println!("{}", render_value(&value));
            Ok(exit_codes::OK)
        }
        ExecutionOutcome::Failure { message } => {
            eprintln!("error: {message}");
            Ok(exit_codes::FAILED)
        }
        ExecutionOutcome::Timeout => {
            eprintln!("error: execution timed out");
            Ok(exit_codes::TIMED_OUT)
        }
    }
}

fn cmd_solve(cfg: &SolveConfig, problem: &str) -> Result<i32> {
    if problem.trim().is_empty() {
        bail!("problem must not be empty");
    }
    let executor = cfg.execution.build_executor();
    let solver = CommandSolver::new(&cfg.solver, &cfg.result_variable, executor.runtime());
    let problem = ProblemStatement::new(problem);

    let result = solve_with(
        &solver,
        &executor,
        &problem,
        &RepairConfig::from_config(cfg),
        |record| {
            eprintln!("attempt {}: {}", record.attempt, record.outcome);
        },
    );
    print_json(&report(None, &problem, &result))?;
    Ok(exit_code_for(&result))
}

fn cmd_batch(cfg: &SolveConfig, path: &Path) -> Result<i32> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let problems = parse_problem_lines(&raw);
    if problems.is_empty() {
        bail!("no problems in {}", path.display());
    }

    let executor = cfg.execution.build_executor();
    let solver = CommandSolver::new(&cfg.solver, &cfg.result_variable, executor.runtime());
    let mut write_error = None;
    let batch = run_batch(
        &solver,
        &executor,
        &problems,
        &RepairConfig::from_config(cfg),
        cfg.worker_count,
        |index, result| {
            if let Err(err) = print_json(&report(Some(index), &problems[index], result))
                && write_error.is_none()
            {
                write_error = Some(err);
            }
        },
    )?;
    if let Some(err) = write_error {
        return Err(err);
    }

    let summary = batch.summary();
    eprintln!(
        "{}",
        serde_json::to_string(&summary).context("serialize batch summary")?
    );
    Ok(batch_exit_code(&summary))
}

fn read_source(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read snippet from stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("read {path}"))
}

fn parse_problem_lines(raw: &str) -> Vec<ProblemStatement> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ProblemStatement::new)
        .collect()
}

/// Strings print bare; everything else prints as JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value).context("serialize report")?;
    println!("{line}");
    Ok(())
}

fn status_of(result: &Result<Solved, SolveError>) -> &'static str {
    match result {
        Ok(_) => "solved",
        Err(SolveError::AttemptsExhausted { .. }) => "exhausted",
        Err(SolveError::Solver { .. }) => "solver_failed",
        Err(SolveError::InvalidBudget | SolveError::Invocation(_)) => "invalid",
    }
}

fn report<'a>(
    index: Option<usize>,
    problem: &'a ProblemStatement,
    result: &'a Result<Solved, SolveError>,
) -> Report<'a> {
    let mut report = Report {
        index,
        problem: problem.text(),
        status: status_of(result),
        answer: None,
        value: None,
        attempts: None,
        error: None,
    };
    match result {
        Ok(solved) => {
            report.answer = Some(solved.solution.answer.as_str());
            report.value = Some(&solved.value);
            report.attempts = Some(solved.attempts.len());
        }
        Err(err) => {
            if let SolveError::AttemptsExhausted { attempts, .. } = err {
                report.attempts = Some(*attempts as usize);
            }
            report.error = Some(err.to_string());
        }
    }
    report
}

fn exit_code_for(result: &Result<Solved, SolveError>) -> i32 {
    match result {
        Ok(_) => exit_codes::OK,
        Err(SolveError::AttemptsExhausted { .. }) => exit_codes::FAILED,
        Err(SolveError::Solver { .. }) => exit_codes::SOLVER_FAILED,
        Err(SolveError::InvalidBudget | SolveError::Invocation(_)) => exit_codes::INVALID,
    }
}

fn batch_exit_code(summary: &BatchSummary) -> i32 {
    if summary.invalid > 0 {
        exit_codes::INVALID
    } else if summary.exhausted > 0 {
        exit_codes::FAILED
    } else if summary.solver_failed > 0 {
        exit_codes::SOLVER_FAILED
    } else {
        exit_codes::OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solveloop::core::types::Solution;
    use solveloop::error::SolverError;

    #[test]
    fn parse_exec_with_overrides() {
        let cli = Cli::parse_from([
            "solveloop",
            "exec",
            "snippet.txt",
            "--timeout-ms",
            "250",
            "--var",
            "result",
            "--runtime",
            "python",
        ]);
        let Command::Exec {
            path,
            timeout_ms,
            result_variable,
            runtime,
        } = cli.command
        else {
            panic!("expected exec");
        };
        assert_eq!(path, "snippet.txt");
        assert_eq!(timeout_ms, Some(250));
        assert_eq!(result_variable.as_deref(), Some("result"));
        assert_eq!(runtime, Some(RuntimeArg::Python));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn parse_batch_with_global_config() {
        let cli = Cli::parse_from([
            "solveloop",
            "batch",
            "problems.txt",
            "--workers",
            "5",
            "--config",
            "custom.toml",
        ]);
        assert!(matches!(cli.command, Command::Batch { workers: Some(5), .. }));
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
    }

    #[test]
    fn problem_lines_skip_blanks() {
        let problems = parse_problem_lines("What is 2 + 2?\n\n   \n  Square root of 16  \n");
        assert_eq!(
            problems,
            vec![
                ProblemStatement::new("What is 2 + 2?"),
                ProblemStatement::new("Square root of 16"),
            ]
        );
    }

    #[test]
    fn strings_render_bare() {
        assert_eq!(render_value(&Value::from("ok")), "ok");
        assert_eq!(render_value(&Value::from(4)), "4");
        assert_eq!(render_value(&Value::from(2.5)), "2.5");
    }

    #[test]
    fn exit_codes_follow_failure_kind() {
        let exhausted: Result<Solved, SolveError> = Err(SolveError::AttemptsExhausted {
            attempts: 2,
            last: ExecutionOutcome::Timeout,
        });
        let solver_failed: Result<Solved, SolveError> = Err(SolveError::Solver {
            attempt: 1,
            source: SolverError::TimedOut(120),
        });
        let solved: Result<Solved, SolveError> = Ok(Solved {
            solution: Solution {
                answer: "4".to_string(),
                step_by_step: String::new(),
                code: "answer = 2 + 2".to_string(),
            },
            value: Value::from(4),
            attempts: Vec::new(),
        });
        assert_eq!(exit_code_for(&solved), exit_codes::OK);
        assert_eq!(exit_code_for(&exhausted), exit_codes::FAILED);
        assert_eq!(exit_code_for(&solver_failed), exit_codes::SOLVER_FAILED);
        assert_eq!(status_of(&exhausted), "exhausted");
    }

    #[test]
    fn batch_exit_code_prefers_exhaustion_over_solver_failure() {
        let summary = BatchSummary {
            total: 3,
            solved: 1,
            exhausted: 1,
            solver_failed: 1,
            invalid: 0,
        };
        assert_eq!(batch_exit_code(&summary), exit_codes::FAILED);
        let clean = BatchSummary {
            total: 2,
            solved: 2,
            ..BatchSummary::default()
        };
        assert_eq!(batch_exit_code(&clean), exit_codes::OK);
    }

    #[test]
    fn report_carries_exhausted_attempts() {
        let problem = ProblemStatement::new("5 / 0");
        let result: Result<Solved, SolveError> = Err(SolveError::AttemptsExhausted {
            attempts: 2,
            last: ExecutionOutcome::Failure {
                message: "division by zero".to_string(),
            },
        });
        let report = report(Some(3), &problem, &result);
        assert_eq!(report.status, "exhausted");
        assert_eq!(report.attempts, Some(2));
        assert!(report.error.as_deref().unwrap_or_default().contains("division by zero"));
    }
}
