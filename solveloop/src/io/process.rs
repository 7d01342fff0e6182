//! Helpers for running child processes with timeouts and bounded output.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::cancel::CancelToken;

/// How often a running child is checked for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl CommandOutput {
    pub fn stderr_lossy(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stderr_truncated > 0 {
            text.push_str(&format!(
                "\n[stderr truncated {} bytes]",
                self.stderr_truncated
            ));
        }
        text
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// When `cancel` is set the child is killed as soon as the token fires.
#[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64, output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
    cancel: Option<&CancelToken>,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    // Written on its own thread so a child that never reads cannot block the deadline.
    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let input = input.to_vec();
        thread::spawn(move || {
            if let Err(e) = child_stdin.write_all(&input) {
                // A child that exits without reading its input is reported by its status.
                warn!(err = %e, "failed to write stdin");
            }
        });
    }

    let (status, stop) = wait_until(&mut child, timeout, cancel)?;
    let timed_out = stop == Some(Stop::Deadline);
    let cancelled = stop == Some(Stop::Cancelled);

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, cancelled, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        cancelled,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Deadline,
    Cancelled,
}

/// Wait for the child, killing it on deadline or cancellation.
fn wait_until(
    child: &mut Child,
    timeout: Duration,
    cancel: Option<&CancelToken>,
) -> Result<(ExitStatus, Option<Stop>)> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let slice = match cancel {
            Some(_) => remaining.min(CANCEL_POLL_INTERVAL),
            None => remaining,
        };
        if let Some(status) = child.wait_timeout(slice).context("wait for command")? {
            return Ok((status, None));
        }

        let stop = if cancel.is_some_and(CancelToken::is_cancelled) {
            Stop::Cancelled
        } else if Instant::now() >= deadline {
            Stop::Deadline
        } else {
            continue;
        };

        warn!(reason = ?stop, timeout_ms = timeout.as_millis() as u64, "stopping command, killing");
        child.kill().context("kill command")?;
        let status = child.wait().context("wait command after kill")?;
        return Ok((status, Some(stop)));
    }
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_stdin() {
        let cmd = Command::new("cat");
        let output =
            run_command_with_timeout(cmd, Some(b"hello"), Duration::from_secs(5), 1024, None)
                .expect("run cat");
        assert!(output.status.success());
        assert_eq!(output.stdout, b"hello");
        assert!(!output.timed_out);
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 0123456789");
        let output = run_command_with_timeout(cmd, None, Duration::from_secs(5), 4, None)
            .expect("run sh");
        assert_eq!(output.stdout, b"0123");
        assert_eq!(output.stdout_truncated, 6);
    }

    #[test]
    fn kills_child_after_deadline() {
        let mut cmd = Command::new("sleep");
        cmd.arg("10");
        let started = Instant::now();
        let output = run_command_with_timeout(cmd, None, Duration::from_millis(100), 1024, None)
            .expect("run sleep");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn kills_child_when_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let mut cmd = Command::new("sleep");
        cmd.arg("10");
        let started = Instant::now();
        let output =
            run_command_with_timeout(cmd, None, Duration::from_secs(30), 1024, Some(&token))
                .expect("run sleep");
        assert!(output.cancelled);
        assert!(!output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
