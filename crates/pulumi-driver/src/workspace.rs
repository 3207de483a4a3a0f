use async_trait::async_trait;
use stackfleet_core::{
    Outputs, ProgressSink, ProviderError, StackHandle, StackIdentity, StackProvider,
};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::process::PulumiProcess;
use crate::types::{parse_outputs, Invocation, Operation, WorkspaceOptions};
use crate::{PulumiError, Result};

// ─── PulumiWorkspace ──────────────────────────────────────────────────────

/// [`StackProvider`] that shells out to the `pulumi` CLI.
///
/// Holds no per-stack state: every call spawns a fresh process with
/// `--stack <name>` in the stack's program directory, so one workspace can be
/// shared by every runner in a fleet.
#[derive(Debug, Clone)]
pub struct PulumiWorkspace {
    executable: PathBuf,
    options: WorkspaceOptions,
}

impl PulumiWorkspace {
    /// Resolve the executable (`pulumi` on `PATH` unless overridden).
    ///
    /// Fails up front if it cannot be found, before any stack is touched.
    pub fn new(options: WorkspaceOptions) -> Result<Self> {
        let name = options
            .executable
            .clone()
            .unwrap_or_else(|| PathBuf::from("pulumi"));
        let executable = which::which(&name).map_err(|source| PulumiError::ExecutableNotFound {
            name: name.display().to_string(),
            source,
        })?;
        debug!(executable = %executable.display(), "resolved pulumi");
        Ok(Self {
            executable,
            options,
        })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn invocation(
        &self,
        operation: Operation,
        stack: &StackIdentity,
        cwd: &Path,
        args: Vec<String>,
    ) -> Invocation {
        Invocation {
            executable: self.executable.clone(),
            operation,
            args,
            stack: stack.to_string(),
            cwd: cwd.to_path_buf(),
            env: self.options.env.clone(),
        }
    }

    /// Run `invocation` to completion.
    ///
    /// stdout lines go to `progress` when given and are returned otherwise.
    /// Cancellation kills the process.
    async fn execute(
        &self,
        invocation: Invocation,
        progress: Option<&dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        debug!(command = %invocation.label(), "spawning");
        let mut process = PulumiProcess::spawn(&invocation)?;
        let mut captured = String::new();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => None,
                line = process.next_line() => Some(line),
            };
            let Some(line) = next else {
                process.kill().await;
                return Err(PulumiError::Cancelled);
            };
            match line {
                Err(e) => {
                    process.kill().await;
                    return Err(e);
                }
                Ok(None) => break,
                Ok(Some(line)) => match progress {
                    Some(sink) => sink.line(&line),
                    None => {
                        captured.push_str(&line);
                        captured.push('\n');
                    }
                },
            }
        }

        let exit = tokio::select! {
            _ = cancel.cancelled() => None,
            exit = process.wait_exit_error() => Some(exit),
        };
        match exit {
            None => {
                process.kill().await;
                Err(PulumiError::Cancelled)
            }
            Some(Some(err)) => Err(err),
            Some(None) => Ok(captured),
        }
    }
}

#[async_trait]
impl StackProvider for PulumiWorkspace {
    async fn upsert(
        &self,
        identity: &StackIdentity,
        program_dir: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<StackHandle, ProviderError> {
        let inv = self.invocation(Operation::SelectOrCreate, identity, program_dir, vec![]);
        self.execute(inv, None, cancel).await?;
        Ok(StackHandle::new(identity.clone(), program_dir))
    }

    async fn set_config(
        &self,
        handle: &StackHandle,
        key: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ProviderError> {
        let inv = self.invocation(
            Operation::ConfigSet,
            handle.identity(),
            handle.workspace(),
            vec![key.to_string(), value.to_string()],
        );
        self.execute(inv, None, cancel).await?;
        Ok(())
    }

    async fn refresh(
        &self,
        handle: &StackHandle,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ProviderError> {
        let inv = self.invocation(Operation::Refresh, handle.identity(), handle.workspace(), vec![]);
        self.execute(inv, None, cancel).await?;
        Ok(())
    }

    async fn update(
        &self,
        handle: &StackHandle,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> std::result::Result<Outputs, ProviderError> {
        let up = self.invocation(Operation::Up, handle.identity(), handle.workspace(), vec![]);
        self.execute(up, Some(progress), cancel).await?;

        let output = self.invocation(
            Operation::StackOutput,
            handle.identity(),
            handle.workspace(),
            vec![],
        );
        let text = self.execute(output, None, cancel).await?;
        Ok(parse_outputs(&text)?)
    }

    async fn destroy(
        &self,
        handle: &StackHandle,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ProviderError> {
        let inv = self.invocation(Operation::Destroy, handle.identity(), handle.workspace(), vec![]);
        self.execute(inv, Some(progress), cancel).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "pulumi"
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
