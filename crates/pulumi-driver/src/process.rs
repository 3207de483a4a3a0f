use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::types::Invocation;
use crate::{PulumiError, Result};

// ─── PulumiProcess ────────────────────────────────────────────────────────

/// A running `pulumi` subprocess.
///
/// stdout is read line by line by the caller. Stderr is captured in a
/// background task and surfaced on process exit errors.
pub(crate) struct PulumiProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    label: String,
    /// Stderr output collected by a background reader task.
    stderr_buf: Arc<Mutex<String>>,
    stderr_task: Option<JoinHandle<()>>,
}

/// How long to wait for the stderr drain after the process has exited.
const STDERR_DRAIN_GRACE: Duration = Duration::from_secs(1);

impl PulumiProcess {
    /// Spawn the `pulumi` binary for `invocation`.
    pub(crate) fn spawn(invocation: &Invocation) -> Result<Self> {
        let cmd = build_command(invocation);
        Self::from_command(cmd, invocation.label())
    }

    /// Spawn an arbitrary command in place of `pulumi`.
    #[cfg(test)]
    pub(crate) fn spawn_command(cmd: Command, label: &str) -> Result<Self> {
        Self::from_command(cmd, label.to_string())
    }

    fn from_command(mut cmd: Command, label: String) -> Result<Self> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(PulumiError::Io)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PulumiError::Process("stdout not captured".into()))?;

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push_str("; ");
                        }
                        b.push_str(&line);
                    }
                }
            })
        });

        let lines = BufReader::new(stdout).lines();
        Ok(Self {
            child,
            lines,
            label,
            stderr_buf,
            stderr_task,
        })
    }

    /// Next stdout line, or `Ok(None)` on EOF.
    pub(crate) async fn next_line(&mut self) -> Result<Option<String>> {
        self.lines.next_line().await.map_err(PulumiError::Io)
    }

    /// Wait for the child to exit and return an error if the exit code is
    /// non-zero or the process was killed by a signal. The error carries
    /// whatever the process wrote to stderr.
    pub(crate) async fn wait_exit_error(&mut self) -> Option<PulumiError> {
        let status = match self.child.wait().await {
            Ok(s) => s,
            Err(e) => return Some(PulumiError::Io(e)),
        };

        if status.success() {
            return None;
        }

        // Children of pulumi can keep stderr open; don't wait on them forever.
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(STDERR_DRAIN_GRACE, task).await;
        }

        let stderr = self
            .stderr_buf
            .lock()
            .ok()
            .map(|b| b.clone())
            .unwrap_or_default();

        let head = match status.code() {
            Some(code) => format!("`{}` exited with code {code}", self.label),
            None => format!("`{}` terminated by signal", self.label),
        };
        let msg = if stderr.is_empty() {
            head
        } else {
            format!("{head}: {stderr}")
        };

        Some(PulumiError::Process(msg))
    }

    /// Kill the subprocess (best-effort; errors are silently ignored).
    pub(crate) async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}

// ─── Command builder ──────────────────────────────────────────────────────

pub(crate) fn build_command(invocation: &Invocation) -> Command {
    let mut cmd = Command::new(&invocation.executable);
    cmd.args(invocation.argv()).current_dir(&invocation.cwd);

    for (k, v) in &invocation.env {
        cmd.env(k, v);
    }

    cmd
}

// ─── Tests ────────────────────────────────────────────────────────────────
