//! Helpers for running child processes with optional timeouts and bounded output.
//!
//! Every wait is unbounded unless a timeout is supplied; a hung child then hangs the
//! caller. Timed-out children are killed and reaped before returning.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::exit_codes;

/// An external program could not be started (not found, not executable, ...).
#[derive(Debug, Error)]
#[error("failed to start {program}: {source}")]
pub struct SpawnError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

/// Output of a child whose stdout was echoed to the terminal while being captured.
#[derive(Debug)]
pub struct StreamedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub timed_out: bool,
}

/// Completion of a child that shared the terminal with us.
#[derive(Debug, Clone, Copy)]
pub struct InheritedOutcome {
    pub status: ExitStatus,
    pub timed_out: bool,
}

/// Exit code to report for `status`; signals and kills map to [`exit_codes::FATAL`].
pub fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(exit_codes::FATAL)
}

/// Spawn `cmd`, converting launch failures into [`SpawnError`].
pub fn spawn(cmd: &mut Command) -> Result<Child> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    match cmd.spawn() {
        Ok(child) => Ok(child),
        Err(source) => {
            error!(program = %program, err = %source, "failed to spawn command");
            Err(SpawnError { program, source }.into())
        }
    }
}

/// Run a command with stdin closed, capturing stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = spawn(&mut cmd)?;

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

    let (status, timed_out) = wait_child(&mut child, timeout)?;

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

/// Run a command attached to our stdin/stderr, echoing each stdout line as it arrives.
///
/// Every line is written to our stdout (and flushed) as soon as it is read, so the user
/// sees progress in real time and can answer prompts; the same lines are accumulated,
/// up to `output_limit_bytes`, and returned once the stream closes and the child exits.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_command_streaming(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<StreamedOutput> {
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    debug!("spawning child process");
    let mut child = spawn(&mut cmd)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;

    let stdout_handle = thread::spawn(move || {
        let terminal = std::io::stdout();
        read_lines_limited_with_tee(stdout, output_limit_bytes, terminal)
    });

    let (status, timed_out) = wait_child(&mut child, timeout)?;
    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;

    if stdout_truncated > 0 {
        warn!(stdout_truncated, "captured output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(StreamedOutput {
        status,
        stdout,
        timed_out,
    })
}

/// Run a command with stdout/stderr shared with ours and wait for it.
///
/// Stdin is left as configured on `cmd` (inherited by default).
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs())))]
pub fn run_command_inherited(
    mut cmd: Command,
    timeout: Option<Duration>,
) -> Result<InheritedOutcome> {
    cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());

    debug!("spawning child process");
    let mut child = spawn(&mut cmd)?;
    let (status, timed_out) = wait_child(&mut child, timeout)?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(InheritedOutcome { status, timed_out })
}

/// Wait for `child`, killing it if `timeout` elapses first.
fn wait_child(child: &mut Child, timeout: Option<Duration>) -> Result<(ExitStatus, bool)> {
    let Some(timeout) = timeout else {
        return Ok((child.wait().context("wait for command")?, false));
    };
    match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => Ok((status, false)),
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            child.kill().context("kill command")?;
            let status = child.wait().context("wait command after kill")?;
            Ok((status, true))
        }
    }
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Read a stream line by line with a size limit, writing every line to `tee`.
fn read_lines_limited_with_tee<R: Read, W: Write>(
    reader: R,
    limit: usize,
    mut tee: W,
) -> Result<(Vec<u8>, usize)> {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read line")?;
        if n == 0 {
            break;
        }

        // Echo failures must not stop the capture the loop depends on.
        if let Err(e) = tee.write_all(&line) {
            warn!(err = %e, "failed to echo output line");
        } else if let Err(e) = tee.flush() {
            warn!(err = %e, "failed to flush echoed output");
        }

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((collected, truncated))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tee_echoes_every_line_and_caps_capture() {
        let input = b"first line\nsecond line\nthird".as_slice();
        let mut echoed = Vec::new();
        let (captured, truncated) =
            read_lines_limited_with_tee(input, 15, &mut echoed).expect("read");

        assert_eq!(echoed, b"first line\nsecond line\nthird");
        assert_eq!(captured, b"first line\nseco");
        assert_eq!(truncated, 28 - 15);
    }

    #[test]
    fn limited_read_counts_discarded_bytes() {
        let input = vec![b'x'; 10_000];
        let (kept, truncated) = read_stream_limited(input.as_slice(), 100).expect("read");
        assert_eq!(kept.len(), 100);
        assert_eq!(truncated, 9_900);
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let cmd = Command::new("texonfly-definitely-missing-program");
        let err = run_command_with_timeout(cmd, None, 100).unwrap_err();
        let spawn = err.downcast_ref::<SpawnError>().expect("spawn error");
        assert_eq!(spawn.program, "texonfly-definitely-missing-program");
    }

    #[cfg(unix)]
    #[test]
    fn captured_run_reports_status_and_stdout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo out; echo err >&2; exit 3");
        let output = run_command_with_timeout(cmd, Some(Duration::from_secs(30)), 1000)
            .expect("run");
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr, b"err\n");
        assert!(!output.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn captured_output_is_bounded() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'abcdefghij'; printf 'klmnop' >&2");
        let output = run_command_with_timeout(cmd, None, 4).expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stderr, b"klmn");
        assert!(output.status.success());
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_child() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 5");
        let output = run_command_inherited(cmd, Some(Duration::from_millis(100))).expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }
}
