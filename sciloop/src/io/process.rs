//! Child process execution with a deadline and bounded output capture.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Exit code reported for commands killed at their deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How long output readers may keep draining after a kill before they are
/// abandoned. Descendants that escaped the process group can hold the pipes
/// open indefinitely.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Limits applied to a single child process.
#[derive(Debug, Clone, Copy)]
pub struct ProcessLimits {
    /// Maximum time before the child is killed.
    pub timeout: Duration,
    /// Maximum bytes kept from each of stdout/stderr.
    pub output_limit_bytes: usize,
}

impl Default for ProcessLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl CommandOutput {
    /// Exit code with timeouts and signal deaths folded into non-zero values.
    pub fn exit_code(&self) -> i32 {
        if self.timed_out {
            return TIMEOUT_EXIT_CODE;
        }
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            text.push_str(&format!("\n[stdout truncated {} bytes]", self.stdout_truncated));
        }
        text
    }

    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stderr_truncated > 0 {
            text.push_str(&format!("\n[stderr truncated {} bytes]", self.stderr_truncated));
        }
        if self.timed_out {
            text.push_str(&format!(
                "\n[timed out after {} ms]",
                self.elapsed.as_millis()
            ));
        }
        text
    }
}

/// Run `cmd` until it exits or `limits.timeout` elapses, killing it on expiry.
///
/// Stdout and stderr are drained on reader threads while the child runs so a
/// chatty child cannot deadlock on a full pipe; bytes beyond
/// `limits.output_limit_bytes` are counted and discarded.
///
/// On unix the child leads its own process group and the whole group is
/// killed at the deadline, so grandchildren (the test binary under
/// `cargo test`, the rest of an `a; b` script) die with it.
#[instrument(skip_all, fields(timeout_ms = limits.timeout.as_millis() as u64))]
pub fn run_with_deadline(mut cmd: Command, limits: ProcessLimits) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let started = Instant::now();
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
    let limit = limits.output_limit_bytes;
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

    let mut timed_out = false;
    let status = match child
        .wait_timeout(limits.timeout)
        .context("wait for command")?
    {
        Some(status) => status,
        None => {
            warn!(
                timeout_ms = limits.timeout.as_millis() as u64,
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    // Background descendants can keep the pipes open after the child exits;
    // readers get until the deadline (or the kill grace) and no longer.
    let now = Instant::now();
    let grace = if timed_out {
        now + KILL_GRACE
    } else {
        (started + limits.timeout).max(now + KILL_GRACE)
    };
    let (stdout, stdout_truncated) = join_output(stdout_handle, grace).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle, grace).context("join stderr")?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    let elapsed = started.elapsed();
    debug!(exit_code = ?status.code(), timed_out, elapsed_ms = elapsed.as_millis() as u64, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        elapsed,
    })
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => {
            warn!(err = %err, "killpg failed, killing child only");
            child.kill().context("kill command")
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

/// Join a reader thread. A reader still blocked at `deadline` is abandoned and
/// reported as empty output.
fn join_output(
    handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>,
    deadline: Instant,
) -> Result<(Vec<u8>, usize)> {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("output still held open by a descendant, abandoning reader");
            return Ok((Vec::new(), 0));
        }
        thread::sleep(Duration::from_millis(10));
    }
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
        let keep = n.min(remaining);
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_exit_code_and_streams() {
        let output = run_with_deadline(
            sh("echo out; echo err >&2; exit 3"),
            ProcessLimits::default(),
        )
        .expect("run");
        assert_eq!(output.exit_code(), 3);
        assert_eq!(output.stdout_text().trim(), "out");
        assert_eq!(output.stderr_text().trim(), "err");
        assert!(!output.timed_out);
    }

    #[test]
    fn kills_at_deadline() {
        let output = run_with_deadline(
            sh("exec sleep 5"),
            ProcessLimits {
                timeout: Duration::from_millis(100),
                output_limit_bytes: 1024,
            },
        )
        .expect("run");
        assert!(output.timed_out);
        assert_eq!(output.exit_code(), TIMEOUT_EXIT_CODE);
        assert!(output.stderr_text().contains("timed out"));
    }

    #[test]
    fn kills_grandchildren_at_deadline() {
        let started = Instant::now();
        let output = run_with_deadline(
            sh("sleep 5; true"),
            ProcessLimits {
                timeout: Duration::from_millis(200),
                output_limit_bytes: 1024,
            },
        )
        .expect("run");
        assert!(output.timed_out);
        assert_eq!(output.exit_code(), TIMEOUT_EXIT_CODE);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn background_job_holding_pipes_does_not_outlive_deadline() {
        let started = Instant::now();
        let output = run_with_deadline(
            sh("sleep 5 & echo started"),
            ProcessLimits {
                timeout: Duration::from_millis(300),
                output_limit_bytes: 1024,
            },
        )
        .expect("run");
        assert!(!output.timed_out);
        assert_eq!(output.exit_code(), 0);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let output = run_with_deadline(
            sh("printf 'abcdef'"),
            ProcessLimits {
                timeout: Duration::from_secs(5),
                output_limit_bytes: 4,
            },
        )
        .expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 2);
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let err = run_with_deadline(
            Command::new("/definitely/not/a/binary"),
            ProcessLimits::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("spawn command"));
    }
}
