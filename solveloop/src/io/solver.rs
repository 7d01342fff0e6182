//! Solver abstraction for solution generation.
//!
//! The [`Solver`] trait decouples the repair loop from the actual generator
//! backend (by default `codex exec` with an output schema). Tests use
//! scripted solvers that return predetermined solutions without spawning
//! processes.

use std::fs;
use std::process::Command;
use std::time::Duration;

use jsonschema::validator_for;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{ProblemStatement, Solution};
use crate::error::SolverError;
use crate::io::config::SolverConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::{PromptInputs, render_solver_prompt};
use crate::io::runtime::SnippetRuntime;

const SOLUTION_SCHEMA: &str = include_str!("schemas/solution.schema.json");

const SCHEMA_PLACEHOLDER: &str = "{schema}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// JSON Schema every solver response must satisfy.
pub fn solution_schema() -> &'static str {
    SOLUTION_SCHEMA
}

/// Abstraction over solution generators.
///
/// A returned error is terminal for the call; any retrying is the
/// implementation's own business.
pub trait Solver: Send + Sync {
    fn generate(&self, problem: &ProblemStatement) -> Result<Solution, SolverError>;
}

/// Solver that spawns an external generator command.
///
/// The rendered prompt is written to the command's stdin. The solution JSON
/// is read from the `{output}` file when the command has that placeholder,
/// otherwise from stdout.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    result_variable: String,
    language: &'static str,
    guidelines: &'static str,
}

impl CommandSolver {
    pub fn new(config: &SolverConfig, result_variable: &str, runtime: &dyn SnippetRuntime) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            result_variable: result_variable.to_string(),
            language: runtime.language(),
            guidelines: runtime.guidelines(),
        }
    }

    fn render_prompt(&self, problem: &ProblemStatement) -> Result<String, SolverError> {
        Ok(render_solver_prompt(&PromptInputs {
            problem,
            result_variable: &self.result_variable,
            language: self.language,
            guidelines: self.guidelines,
        })?)
    }
}

impl Solver for CommandSolver {
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    fn generate(&self, problem: &ProblemStatement) -> Result<Solution, SolverError> {
        let prompt = self.render_prompt(problem)?;

        let scratch = tempfile::tempdir().map_err(|source| SolverError::Io {
            context: "create solver scratch dir".to_string(),
            source,
        })?;
        let schema_path = scratch.path().join("solution.schema.json");
        let output_path = scratch.path().join("solution.json");
        fs::write(&schema_path, SOLUTION_SCHEMA).map_err(|source| SolverError::Io {
            context: format!("write schema {}", schema_path.display()),
            source,
        })?;

        let schema_arg = schema_path.to_string_lossy();
        let output_arg = output_path.to_string_lossy();
        let args = substitute_placeholders(&self.command, &schema_arg, &output_arg);
        let reads_output_file = self
            .command
            .iter()
            .any(|arg| arg.contains(OUTPUT_PLACEHOLDER));
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| SolverError::Command("solver command is empty".to_string()))?;

        info!(program = %program, "starting solver");
        let mut cmd = Command::new(program);
        cmd.args(rest).current_dir(scratch.path());

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
            None,
        )
        .map_err(|err| SolverError::Command(format!("{err:#}")))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "solver timed out");
            return Err(SolverError::TimedOut(self.timeout.as_secs()));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "solver failed");
            return Err(SolverError::Failed {
                code: output.status.code(),
                stderr: output.stderr_lossy().trim().to_string(),
            });
        }

        let raw = if reads_output_file {
            fs::read_to_string(&output_path).map_err(|source| SolverError::Io {
                context: format!("read solver output {}", output_path.display()),
                source,
            })?
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };

        let solution = parse_solution(&raw)?;
        debug!(code_len = solution.code.len(), "solver returned solution");
        Ok(solution)
    }
}

fn substitute_placeholders(command: &[String], schema: &str, output: &str) -> Vec<String> {
    command
        .iter()
        .map(|arg| {
            arg.replace(SCHEMA_PLACEHOLDER, schema)
                .replace(OUTPUT_PLACEHOLDER, output)
        })
        .collect()
}

/// Parse and validate a raw solver response.
///
/// The legacy field names `explanation` and `python_code` are accepted and
/// mapped onto the schema's names before validation.
pub fn parse_solution(raw: &str) -> Result<Solution, SolverError> {
    let mut value: Value = serde_json::from_str(raw.trim())?;
    if let Some(object) = value.as_object_mut() {
        for (legacy, current) in [("explanation", "step_by_step"), ("python_code", "code")] {
            if !object.contains_key(current)
                && let Some(moved) = object.remove(legacy)
            {
                object.insert(current.to_string(), moved);
            }
        }
    }

    let schema: Value = serde_json::from_str(SOLUTION_SCHEMA)?;
    let validator =
        validator_for(&schema).map_err(|err| SolverError::Schema(vec![err.to_string()]))?;
    let messages: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(SolverError::Schema(messages));
    }

    Ok(serde_json::from_value(value)?)
}
