//! Solve loop configuration stored in `solveloop.toml`.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::executor::BoundedExecutor;
use crate::io::runtime::{PythonRuntime, ScriptRuntime, SnippetRuntime};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "solveloop.toml";

/// Solve loop configuration (TOML).
///
/// Missing fields default to the values the loop was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SolveConfig {
    /// Hard cap on solver + executor round trips per problem.
    pub max_attempts: u32,

    /// Number of concurrent repair loops in `batch`.
    pub worker_count: usize,

    /// Variable the snippet must bind.
    pub result_variable: String,

    pub execution: ExecutionConfig,

    pub solver: SolverConfig,
}

/// Which snippet runtime executes generated code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    #[default]
    Script,
    Python,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Wall-clock budget per snippet run in milliseconds.
    pub timeout_ms: u64,

    pub runtime: RuntimeKind,

    /// Interpreter argv prefix for the python runtime.
    pub python: Vec<String>,

    /// Truncate python stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SolverConfig {
    /// Generator command. `{schema}` and `{output}` are replaced with paths;
    /// without `{output}` the solution JSON is read from stdout.
    pub command: Vec<String>,

    /// Per-call solver budget in seconds.
    pub timeout_secs: u64,

    /// Truncate solver stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            runtime: RuntimeKind::Script,
            python: vec!["python3".to_string(), "-B".to_string(), "-S".to_string()],
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            command: [
                "codex",
                "exec",
                "--skip-git-repo-check",
                "--output-schema",
                "{schema}",
                "--output-last-message",
                "{output}",
                "-",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            timeout_secs: 120,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            worker_count: 3,
            result_variable: "answer".to_string(),
            execution: ExecutionConfig::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl SolveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.worker_count == 0 {
            return Err(anyhow!("worker_count must be > 0"));
        }
        if self.result_variable.trim().is_empty() {
            return Err(anyhow!("result_variable must be non-empty"));
        }
        if self.execution.timeout_ms == 0 {
            return Err(anyhow!("execution.timeout_ms must be > 0"));
        }
        if self.execution.output_limit_bytes == 0 {
            return Err(anyhow!("execution.output_limit_bytes must be > 0"));
        }
        if self.execution.runtime == RuntimeKind::Python
            && (self.execution.python.is_empty() || self.execution.python[0].trim().is_empty())
        {
            return Err(anyhow!("execution.python must be a non-empty array"));
        }
        if self.solver.command.is_empty() || self.solver.command[0].trim().is_empty() {
            return Err(anyhow!("solver.command must be a non-empty array"));
        }
        if self.solver.timeout_secs == 0 {
            return Err(anyhow!("solver.timeout_secs must be > 0"));
        }
        if self.solver.output_limit_bytes == 0 {
            return Err(anyhow!("solver.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Build the configured runtime.
    pub fn runtime(&self) -> Arc<dyn SnippetRuntime> {
        match self.runtime {
            RuntimeKind::Script => Arc::new(ScriptRuntime),
            RuntimeKind::Python => Arc::new(PythonRuntime {
                interpreter: self.python.clone(),
                timeout: self.timeout(),
                output_limit_bytes: self.output_limit_bytes,
            }),
        }
    }

    pub fn build_executor(&self) -> BoundedExecutor {
        BoundedExecutor::new(self.runtime())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SolveConfig::default()`.
pub fn load_config(path: &Path) -> Result<SolveConfig> {
    if !path.exists() {
        let cfg = SolveConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SolveConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SolveConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
