//! Shell command execution with a hard timeout.
//!
//! Commands go through the host shell (`sh -c` / `cmd /C`), so quoting and
//! escaping are whatever the shell makes of the raw text. The runner does not
//! sanitise anything; callers gate risky commands through
//! [`crate::risk::classify`] before they get here.
//!
//! On unix a captured command runs in its own process group, so a timeout
//! kills everything the shell started, not just the shell.

use std::fs::File;
use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Non-interactive commands are killed after this long.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A shell command the user (or a voice transcript) asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub raw: String,
    /// Attach to the terminal instead of capturing output.
    pub interactive: bool,
}

impl CommandRequest {
    pub fn new(raw: impl Into<String>, interactive: bool) -> Self {
        Self {
            raw: raw.into(),
            interactive,
        }
    }
}

/// Outcome of one command invocation. Produced exactly once per request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` if the process was killed by a signal, timed out, or never ran.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub interactive: bool,
    /// Set when the process could not be spawned or waited on.
    pub spawn_error: Option<String>,
    /// Limit that applied to this run (none for interactive runs).
    pub timeout: Option<Duration>,
}

impl ExecutionResult {
    fn spawn_failed(error: String, interactive: bool) -> Self {
        Self {
            spawn_error: Some(error),
            interactive,
            ..Self::default()
        }
    }

    /// Text for the log pane. Never empty.
    pub fn summary(&self) -> String {
        if let Some(err) = &self.spawn_error {
            return format!("[Error running command: {err}]");
        }
        if self.timed_out {
            let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
            return format!("[Error: Command timed out after {secs} seconds]");
        }
        let code = self
            .exit_code
            .map_or_else(|| "unknown".to_string(), |c| c.to_string());
        if self.interactive {
            return format!("Return code: {code}");
        }
        if !self.stderr.is_empty() {
            return format!("STDOUT:\n{}\n\nSTDERR:\n{}", self.stdout, self.stderr);
        }
        if !self.stdout.is_empty() {
            return self.stdout.clone();
        }
        format!("Command completed with return code {code}")
    }
}

/// Anything that can execute a [`CommandRequest`].
pub trait CommandExecutor: Send + Sync {
    fn run<'a>(&'a self, request: &'a CommandRequest) -> BoxFuture<'a, ExecutionResult>;
}

/// Runs commands through the host shell.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    shell: String,
    shell_flag: &'static str,
    timeout: Duration,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        let (shell, shell_flag) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        Self {
            shell: shell.to_string(),
            shell_flag,
            timeout,
        }
    }

    /// Use a different shell program (e.g. `bash`).
    pub fn with_shell(mut self, program: &str, flag: &'static str) -> Self {
        self.shell = program.to_string();
        self.shell_flag = flag;
        self
    }

    fn command(&self, raw: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(self.shell_flag).arg(raw);
        cmd
    }

    async fn run_captured(&self, raw: &str) -> ExecutionResult {
        let mut cmd = self.command(raw);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %raw, error = %e, "Failed to spawn command");
                return ExecutionResult::spawn_failed(e.to_string(), false);
            }
        };
        // The group id equals the leader's pid. `id()` is gone once reaped.
        let group = child.id();

        let stdout_task = child.stdout.take().map(|s| tokio::spawn(read_stream(s)));
        let stderr_task = child.stderr.take().map(|s| tokio::spawn(read_stream(s)));
        let deadline = Instant::now() + self.timeout;

        let timed_out_result = |stdout_task: Option<JoinHandle<String>>,
                                stderr_task: Option<JoinHandle<String>>| {
            for task in [stdout_task, stderr_task].into_iter().flatten() {
                task.abort();
            }
            ExecutionResult {
                timed_out: true,
                timeout: Some(self.timeout),
                ..ExecutionResult::default()
            }
        };

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(command = %raw, error = %e, "Failed waiting on command");
                return ExecutionResult::spawn_failed(e.to_string(), false);
            }
            Err(_) => {
                warn!(command = %raw, timeout_secs = self.timeout.as_secs(), "Command timed out, killing");
                kill_group(group);
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out command");
                }
                return timed_out_result(stdout_task, stderr_task);
            }
        };

        // A backgrounded grandchild can hold the pipes open past the parent's
        // exit; the deadline still applies to collecting output.
        let (stdout, stderr) = match tokio::time::timeout_at(
            deadline,
            join_output(stdout_task, stderr_task),
        )
        .await
        {
            Ok(output) => output,
            Err(_) => {
                warn!(command = %raw, "Command output still open at deadline");
                kill_group(group);
                return ExecutionResult {
                    exit_code: status.code(),
                    ..timed_out_result(None, None)
                };
            }
        };

        ExecutionResult {
            stdout,
            stderr,
            exit_code: status.code(),
            timeout: Some(self.timeout),
            ..ExecutionResult::default()
        }
    }

    async fn run_interactive(&self, raw: &str) -> ExecutionResult {
        let (stdin, stdout, stderr) = terminal_stdio();
        let mut cmd = self.command(raw);
        cmd.stdin(stdin).stdout(stdout).stderr(stderr);

        match cmd.status().await {
            Ok(status) => ExecutionResult {
                exit_code: status.code(),
                interactive: true,
                ..ExecutionResult::default()
            },
            Err(e) => {
                warn!(command = %raw, error = %e, "Failed to spawn interactive command");
                ExecutionResult::spawn_failed(e.to_string(), true)
            }
        }
    }
}

impl CommandExecutor for CommandRunner {
    fn run<'a>(&'a self, request: &'a CommandRequest) -> BoxFuture<'a, ExecutionResult> {
        async move {
            info!(command = %request.raw, interactive = request.interactive, "Running command");
            let result = if request.interactive {
                self.run_interactive(&request.raw).await
            } else {
                self.run_captured(&request.raw).await
            };
            info!(
                command = %request.raw,
                exit_code = ?result.exit_code,
                timed_out = result.timed_out,
                spawn_error = ?result.spawn_error,
                "Command finished"
            );
            result
        }
        .boxed()
    }
}

#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    let Some(pgid) = group.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    // SAFETY: killpg takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

async fn read_stream<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!(error = %e, "Command output stream ended with error");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn join_output(
    stdout_task: Option<JoinHandle<String>>,
    stderr_task: Option<JoinHandle<String>>,
) -> (String, String) {
    let collect = |task: Option<JoinHandle<String>>| async move {
        match task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        }
    };
    tokio::join!(collect(stdout_task), collect(stderr_task))
}

// -- interactive terminal attachment --

/// Stdio for an interactive child. The agent's own stdin/stdout carry IPC,
/// so the child gets the controlling terminal when there is one. Without a
/// terminal, input is closed and output goes to our stderr.
fn terminal_stdio() -> (Stdio, Stdio, Stdio) {
    match open_terminal() {
        Ok((input, output)) => {
            let errors = output
                .try_clone()
                .map(Stdio::from)
                .unwrap_or_else(|_| Stdio::inherit());
            (Stdio::from(input), Stdio::from(output), errors)
        }
        Err(e) => {
            debug!(error = %e, "No controlling terminal, interactive output goes to stderr");
            (Stdio::null(), stderr_stdio(), Stdio::inherit())
        }
    }
}

#[cfg(unix)]
fn open_terminal() -> std::io::Result<(File, File)> {
    let input = File::open("/dev/tty")?;
    let output = std::fs::OpenOptions::new().write(true).open("/dev/tty")?;
    Ok((input, output))
}

#[cfg(windows)]
fn open_terminal() -> std::io::Result<(File, File)> {
    let input = File::open("CONIN$")?;
    let output = std::fs::OpenOptions::new().write(true).open("CONOUT$")?;
    Ok((input, output))
}

#[cfg(not(any(unix, windows)))]
fn open_terminal() -> std::io::Result<(File, File)> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "no terminal on this platform",
    ))
}

#[cfg(unix)]
fn stderr_stdio() -> Stdio {
    use std::os::fd::AsFd;
    std::io::stderr()
        .as_fd()
        .try_clone_to_owned()
        .map(Stdio::from)
        .unwrap_or_else(|_| Stdio::null())
}

#[cfg(windows)]
fn stderr_stdio() -> Stdio {
    use std::os::windows::io::AsHandle;
    std::io::stderr()
        .as_handle()
        .try_clone_to_owned()
        .map(Stdio::from)
        .unwrap_or_else(|_| Stdio::null())
}

#[cfg(not(any(unix, windows)))]
fn stderr_stdio() -> Stdio {
    Stdio::null()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_prefers_stdout() {
        let result = ExecutionResult {
            stdout: "listing\n".into(),
            exit_code: Some(0),
            ..Default::default()
        };
        assert_eq!(result.summary(), "listing\n");
    }

    #[test]
    fn test_summary_keeps_streams_distinct() {
        let result = ExecutionResult {
            stdout: "partial".into(),
            stderr: "warning: x".into(),
            exit_code: Some(0),
            ..Default::default()
        };
        assert_eq!(result.summary(), "STDOUT:\npartial\n\nSTDERR:\nwarning: x");
    }

    #[test]
    fn test_summary_timeout_is_distinct_from_exit() {
        let result = ExecutionResult {
            timed_out: true,
            timeout: Some(DEFAULT_TIMEOUT),
            ..Default::default()
        };
        assert_eq!(result.summary(), "[Error: Command timed out after 30 seconds]");
    }

    #[test]
    fn test_summary_interactive() {
        let result = ExecutionResult {
            exit_code: Some(2),
            interactive: true,
            ..Default::default()
        };
        assert_eq!(result.summary(), "Return code: 2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_stdout() {
        let runner = CommandRunner::default();
        let result = runner.run(&CommandRequest::new("echo hello", false)).await;
        assert_eq!(result.stdout, "hello\n");
        assert!(result.stderr.is_empty());
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.timed_out);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reports_exit_code() {
        let runner = CommandRunner::default();
        let result = runner.run(&CommandRequest::new("exit 3", false)).await;
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.summary(), "Command completed with return code 3");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_is_captured_separately() {
        let runner = CommandRunner::default();
        let result = runner
            .run(&CommandRequest::new("echo out; echo err 1>&2", false))
            .await;
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        let summary = result.summary();
        assert!(summary.contains("STDOUT:\nout"));
        assert!(summary.contains("STDERR:\nerr"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_and_returns_promptly() {
        let runner = CommandRunner::new(Duration::from_millis(300));
        let started = std::time::Instant::now();
        let result = runner.run(&CommandRequest::new("sleep 5", false)).await;
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "took {:?}",
            started.elapsed()
        );
        assert!(result.summary().contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_nested_shell() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let raw = format!("sh -c 'sleep 1; touch {}'; echo done", marker.display());
        let runner = CommandRunner::new(Duration::from_millis(300));
        let result = runner.run(&CommandRequest::new(raw, false)).await;
        assert!(result.timed_out);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!marker.exists(), "grandchild survived the timeout");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_grandchild_is_killed_at_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("late");
        let raw = format!("(sleep 1; touch {}) & echo started", marker.display());
        let runner = CommandRunner::new(Duration::from_millis(300));
        let result = runner.run(&CommandRequest::new(raw, false)).await;
        assert!(result.timed_out);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_failure_is_reported_as_text() {
        let runner = CommandRunner::default().with_shell("/nonexistent/shell-binary", "-c");
        let result = runner.run(&CommandRequest::new("ls", false)).await;
        assert!(result.spawn_error.is_some());
        assert!(result.summary().starts_with("[Error running command:"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unknown_program_goes_through_shell() {
        let runner = CommandRunner::default();
        let result = runner
            .run(&CommandRequest::new("definitely-not-a-real-program-xyz", false))
            .await;
        assert_eq!(result.exit_code, Some(127));
        assert!(!result.stderr.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interactive_returns_exit_code_only() {
        let runner = CommandRunner::default();
        let result = runner.run(&CommandRequest::new("exit 4", true)).await;
        assert!(result.interactive);
        assert_eq!(result.exit_code, Some(4));
        assert!(result.stdout.is_empty() && result.stderr.is_empty());
        assert_eq!(result.summary(), "Return code: 4");
    }
}
