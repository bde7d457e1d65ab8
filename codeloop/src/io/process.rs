//! Helpers for running child processes with timeouts and bounded output.

use std::io::Read;
use std::mem;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::UNKNOWN_EXIT;

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
    /// Exit code of the child, mapping signal deaths to `128 + signal`.
    pub fn exit_code(&self) -> i32 {
        if let Some(code) = self.status.code() {
            return code;
        }
        signal_exit_code(&self.status).unwrap_or(UNKNOWN_EXIT)
    }

    /// Stdout decoded lossily, with a notice when bytes were discarded.
    pub fn stdout_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&truncated_notice("stdout", self.stdout_truncated));
        text
    }

    /// Stderr decoded lossily, with a notice when bytes were discarded.
    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        text.push_str(&truncated_notice("stderr", self.stderr_truncated));
        text
    }
}

fn truncated_notice(stream: &str, truncated: usize) -> String {
    if truncated > 0 {
        format!("\n[{stream} truncated {truncated} bytes]\n")
    } else {
        String::new()
    }
}

#[cfg(unix)]
fn signal_exit_code(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|signal| 128 + signal)
}

#[cfg(not(unix))]
fn signal_exit_code(_status: &ExitStatus) -> Option<i32> {
    None
}

/// How long to keep reading after the child is gone. Output pipes held open by a
/// process outside the child's group are abandoned after this.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// On unix the child leads its own process group, and the whole group is killed once the child
/// is done or the timeout fires, so helpers it started cannot outlive the call. Whatever was
/// written before that is kept.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    isolate_process_group(&mut cmd);

    debug!("spawning child process");
    let started = Instant::now();
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

    let stdout_reader = StreamReader::spawn(stdout, output_limit_bytes);
    let stderr_reader = StreamReader::spawn(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => {
            kill_process_group(&child);
            status
        }
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(&child);
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };
    let elapsed = started.elapsed();

    let readers_deadline = Instant::now() + READER_GRACE;
    let (stdout, stdout_truncated) = stdout_reader
        .finish(readers_deadline, "stdout")
        .context("join stdout")?;
    let (stderr, stderr_truncated) = stderr_reader
        .finish(readers_deadline, "stderr")
        .context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

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
fn isolate_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_cmd: &mut Command) {}

/// SIGKILL every process left in the child's group.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(child.id()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(err = %err, pgid, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

/// Bytes captured from one stream so far.
#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: usize,
}

/// Background reader for one output pipe.
struct StreamReader {
    capture: Arc<Mutex<Capture>>,
    done: mpsc::Receiver<Result<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let capture = Arc::new(Mutex::new(Capture::default()));
        let (tx, done) = mpsc::channel();
        let shared = Arc::clone(&capture);
        thread::spawn(move || {
            let _ = tx.send(read_stream_limited(reader, limit, &shared));
        });
        Self { capture, done }
    }

    /// Wait for EOF until `deadline`, then take whatever has been captured.
    fn finish(self, deadline: Instant, stream: &str) -> Result<(Vec<u8>, usize)> {
        let wait = deadline.saturating_duration_since(Instant::now());
        match self.done.recv_timeout(wait) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                warn!(stream, "output pipe still open after grace period, abandoning reader");
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("{stream} reader thread panicked"));
            }
        }
        let mut capture = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
        Ok((mem::take(&mut capture.bytes), capture.truncated))
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize, capture: &Mutex<Capture>) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut capture = capture.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = limit.saturating_sub(capture.bytes.len());
        let keep = n.min(remaining);
        capture.bytes.extend_from_slice(&chunk[..keep]);
        capture.truncated += n - keep;
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let output =
            run_command_with_timeout(sh("echo hello; echo oops >&2; exit 3"), Duration::from_secs(5), 1024)
                .expect("run");
        assert!(!output.timed_out);
        assert_eq!(output.exit_code(), 3);
        assert_eq!(output.stdout_text(), "hello\n");
        assert_eq!(output.stderr_text(), "oops\n");
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let output =
            run_command_with_timeout(sh("printf 0123456789"), Duration::from_secs(5), 4).expect("run");
        assert_eq!(output.stdout, b"0123");
        assert_eq!(output.stdout_truncated, 6);
        assert!(output.stdout_text().contains("[stdout truncated 6 bytes]"));
    }

    #[test]
    fn kills_on_timeout_and_keeps_partial_output() {
        let output = run_command_with_timeout(
            sh("echo started; exec sleep 30"),
            Duration::from_millis(300),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
        assert_eq!(output.stdout_text(), "started\n");
        assert!(output.elapsed >= Duration::from_millis(300));
        assert!(output.elapsed < Duration::from_secs(5));
        // SIGKILL
        assert_eq!(output.exit_code(), 128 + 9);
    }

    #[test]
    fn background_process_does_not_hold_output_open() {
        let output =
            run_command_with_timeout(sh("sleep 30 & echo done"), Duration::from_secs(5), 1024)
                .expect("run");
        assert!(!output.timed_out);
        assert_eq!(output.exit_code(), 0);
        assert_eq!(output.stdout_text(), "done\n");
        assert!(output.elapsed < Duration::from_secs(3));
    }

    #[test]
    fn timeout_kills_grandchildren() {
        let started = Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 30 & echo $!; exec sleep 30"),
            Duration::from_millis(300),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));

        let pid: i32 = output.stdout_text().trim().parse().expect("grandchild pid");
        assert!(wait_until_gone(pid), "grandchild {pid} is still alive");
    }

    /// Whether `pid` exits (or is left a zombie) within two seconds.
    fn wait_until_gone(pid: i32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        for _ in 0..20 {
            if kill(Pid::from_raw(pid), None) == Err(Errno::ESRCH) || is_zombie(pid) {
                return true;
            }
            thread::sleep(Duration::from_millis(100));
        }
        false
    }

    fn is_zombie(pid: i32) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                stat.rsplit_once(')')
                    .map(|(_, rest)| rest.trim_start().starts_with('Z'))
            })
            .unwrap_or(false)
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let err = run_command_with_timeout(
            Command::new("/definitely/not/a/binary"),
            Duration::from_secs(1),
            1024,
        )
        .unwrap_err();
        assert!(err.to_string().contains("spawn command"));
    }
}
