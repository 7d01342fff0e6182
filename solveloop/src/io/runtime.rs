//! Snippet runtimes: the pluggable "run untrusted code" capability.
//!
//! The [`SnippetRuntime`] trait decouples the bounded executor from how a
//! snippet is actually evaluated. [`ScriptRuntime`] interprets the restricted
//! script language in-process; [`PythonRuntime`] runs an external interpreter
//! in a scratch directory. Neither provides isolation beyond a deadline.

use std::fs;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::cancel::CancelToken;
use crate::core::script::{self, ScriptError};
use crate::io::process::run_command_with_timeout;

const PYTHON_DRIVER: &str = include_str!("runtimes/driver.py");
const RESULT_MARKER: &str = "__SOLVELOOP_RESULT__";

const SCRIPT_GUIDELINES: &str = "\
- Statements are separated by newlines or `;`; `#` starts a comment.
- Assign with `name = expr`. Blocks use braces: `if cond { ... } else { ... }`, `while cond { ... }`.
- Operators: + - * / // % ** == != < <= > >= and or not. `/` always returns a float.
- Builtins: sqrt abs min max round floor ceil int float str.
- There are no functions, lists, or imports. Use `raise \"message\"` for invalid input.";

const PYTHON_GUIDELINES: &str = "\
- Use only Python's built-in functions and the math module.
- Include comments explaining each step.
- Handle potential edge cases or invalid inputs.
- Do not read input or print the answer; assign it instead.";

/// What a finished snippet left behind.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The result variable was bound to this value.
    Bound(Value),
    /// The snippet completed without binding the result variable.
    Unbound,
    /// The snippet raised an error; carries its text.
    Raised(String),
}

/// Abstraction over snippet evaluation backends.
pub trait SnippetRuntime: Send + Sync + 'static {
    /// Language name shown to the solver.
    fn language(&self) -> &'static str;

    /// Coding rules shown to the solver.
    fn guidelines(&self) -> &'static str;

    /// Evaluate `code` and read `result_variable` from its final state.
    ///
    /// Implementations should stop promptly once `cancel` fires. An `Err`
    /// means the runtime itself misbehaved, not the snippet.
    fn evaluate(
        &self,
        code: &str,
        result_variable: &str,
        cancel: &CancelToken,
    ) -> Result<Evaluation>;
}

/// In-process interpreter for the restricted script language.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptRuntime;

impl SnippetRuntime for ScriptRuntime {
    fn language(&self) -> &'static str {
        "solveloop script"
    }

    fn guidelines(&self) -> &'static str {
        SCRIPT_GUIDELINES
    }

    fn evaluate(
        &self,
        code: &str,
        result_variable: &str,
        cancel: &CancelToken,
    ) -> Result<Evaluation> {
        let evaluation = match script::execute(code, &|| cancel.is_cancelled()) {
            Ok(env) => match env.get(result_variable) {
                Some(value) => Evaluation::Bound(value.to_json()),
                None => Evaluation::Unbound,
            },
            Err(ScriptError::Cancelled) => {
                debug!("script cancelled");
                Evaluation::Raised(ScriptError::Cancelled.to_string())
            }
            Err(err) => Evaluation::Raised(err.to_string()),
        };
        Ok(evaluation)
    }
}

/// Runs snippets with an external Python interpreter.
///
/// The snippet and a small driver are written to a temp directory; the driver
/// executes the snippet and prints the result slot as JSON on a marker line.
/// The child is killed when the cancel token fires.
#[derive(Debug, Clone)]
pub struct PythonRuntime {
    /// Interpreter argv prefix, e.g. `["python3", "-B", "-S"]`.
    pub interpreter: Vec<String>,
    /// Backstop deadline for the child process.
    pub timeout: Duration,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum DriverReport {
    Bound { value: Value },
    Unbound,
    Raised { message: String },
}

impl SnippetRuntime for PythonRuntime {
    fn language(&self) -> &'static str {
        "Python 3"
    }

    fn guidelines(&self) -> &'static str {
        PYTHON_GUIDELINES
    }

    #[instrument(skip_all, fields(result_variable))]
    fn evaluate(
        &self,
        code: &str,
        result_variable: &str,
        cancel: &CancelToken,
    ) -> Result<Evaluation> {
        let (program, args) = self
            .interpreter
            .split_first()
            .ok_or_else(|| anyhow!("python interpreter command is empty"))?;

        let scratch = tempfile::tempdir().context("create snippet scratch dir")?;
        let snippet_path = scratch.path().join("snippet.py");
        let driver_path = scratch.path().join("driver.py");
        fs::write(&snippet_path, code)
            .with_context(|| format!("write snippet {}", snippet_path.display()))?;
        fs::write(&driver_path, PYTHON_DRIVER)
            .with_context(|| format!("write driver {}", driver_path.display()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(&driver_path)
            .arg(&snippet_path)
            .arg(result_variable)
            .arg(RESULT_MARKER)
            .current_dir(scratch.path());

        let output = run_command_with_timeout(
            cmd,
            None,
            self.timeout,
            self.output_limit_bytes,
            Some(cancel),
        )
        .context("run python snippet")?;

        if output.cancelled {
            return Ok(Evaluation::Raised("execution cancelled".to_string()));
        }
        if output.timed_out {
            return Ok(Evaluation::Raised(format!(
                "python process exceeded {:?}",
                self.timeout
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(report) = parse_driver_report(&stdout)? else {
            return Err(anyhow!(
                "python driver produced no result (exit {:?}): {}",
                output.status.code(),
                output.stderr_lossy().trim()
            ));
        };

        Ok(match report {
            DriverReport::Bound { value } => Evaluation::Bound(value),
            DriverReport::Unbound => Evaluation::Unbound,
            DriverReport::Raised { message } => Evaluation::Raised(message),
        })
    }
}

/// Find the last marker line printed by the driver.
fn parse_driver_report(stdout: &str) -> Result<Option<DriverReport>> {
    let Some(line) = stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(RESULT_MARKER))
    else {
        return Ok(None);
    };
    let report = serde_json::from_str(line).context("parse python driver report")?;
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_runtime_reads_result_slot() {
        let runtime = ScriptRuntime;
        let evaluation = runtime
            .evaluate("width = 5\nanswer = width + 3", "answer", &CancelToken::new())
            .expect("evaluate");
        assert_eq!(evaluation, Evaluation::Bound(Value::from(8)));
    }

    #[test]
    fn script_runtime_reports_unbound_slot() {
        let evaluation = ScriptRuntime
            .evaluate("result = 1", "answer", &CancelToken::new())
            .expect("evaluate");
        assert_eq!(evaluation, Evaluation::Unbound);
    }

    #[test]
    fn script_runtime_reports_syntax_errors_as_raised() {
        let evaluation = ScriptRuntime
            .evaluate("answer = (1 + ", "answer", &CancelToken::new())
            .expect("evaluate");
        let Evaluation::Raised(message) = evaluation else {
            panic!("expected raised, got {evaluation:?}");
        };
        assert!(message.starts_with("syntax error on line 1"));
    }

    #[test]
    fn driver_report_uses_last_marker_line() {
        let stdout = format!(
            "noise\n{RESULT_MARKER}{{\"status\":\"unbound\"}}\n{RESULT_MARKER}{{\"status\":\"bound\",\"value\":[8,5]}}\n"
        );
        let report = parse_driver_report(&stdout).expect("parse").expect("report");
        assert!(matches!(report, DriverReport::Bound { value } if value == serde_json::json!([8, 5])));
    }

    #[test]
    fn driver_report_missing_is_none() {
        assert!(parse_driver_report("Traceback ...").expect("parse").is_none());
    }

    /// Stand-in interpreter: `$1` driver, `$2` snippet, `$3` variable, `$4` marker.
    #[cfg(unix)]
    fn shell_runtime(script: &str) -> PythonRuntime {
        PythonRuntime {
            interpreter: vec![
                "sh".to_string(),
                "-c".to_string(),
                script.to_string(),
                "sh".to_string(),
            ],
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        }
    }

    #[cfg(unix)]
    #[test]
    fn python_runtime_passes_snippet_and_reads_marker() {
        let runtime = shell_runtime(
            r#"test -f "$1" && printf '%s{"status":"bound","value":%s}\n' "$4" "$(cat "$2")""#,
        );
        let evaluation = runtime
            .evaluate("42", "answer", &CancelToken::new())
            .expect("evaluate");
        assert_eq!(evaluation, Evaluation::Bound(Value::from(42)));
    }

    #[cfg(unix)]
    #[test]
    fn python_runtime_without_report_is_runtime_error() {
        let runtime = shell_runtime("echo 'SyntaxError: bad' >&2; exit 1");
        let err = runtime
            .evaluate("x = (", "answer", &CancelToken::new())
            .unwrap_err();
        assert!(format!("{err:#}").contains("SyntaxError: bad"));
    }

    #[cfg(unix)]
    #[test]
    fn python_runtime_stops_on_cancel() {
        let token = CancelToken::new();
        token.cancel();
        let evaluation = shell_runtime("exec sleep 10")
            .evaluate("answer = 1", "answer", &token)
            .expect("evaluate");
        assert_eq!(
            evaluation,
            Evaluation::Raised("execution cancelled".to_string())
        );
    }
}
