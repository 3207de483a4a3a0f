use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::error::StageError;
use crate::generator::ConfigGenerator;
use crate::provider::StackProvider;
use crate::reporter::StackReporter;
use crate::types::{LifecycleOutcome, Mode, Outputs, StackIdentity};

/// Output every successful update must declare as a string.
pub const URL_OUTPUT: &str = "url";

// ---------------------------------------------------------------------------
// RunnerState
// ---------------------------------------------------------------------------

/// Where a runner is in its phase sequence. Only used for logging; the
/// sequence itself is the straight-line code in [`LifecycleRunner::drive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Init,
    HandleAcquired,
    Configured,
    Refreshed,
    Updated,
    Destroyed,
}

impl RunnerState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunnerState::Init => "init",
            RunnerState::HandleAcquired => "handle_acquired",
            RunnerState::Configured => "configured",
            RunnerState::Refreshed => "refreshed",
            RunnerState::Updated => "updated",
            RunnerState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// LifecycleRunner
// ---------------------------------------------------------------------------

/// Drives one stack through upsert → configure → refresh → update | destroy.
///
/// Every failure is converted into a [`LifecycleOutcome::Failed`] at this
/// boundary; nothing propagates to sibling runners or the orchestrator.
pub struct LifecycleRunner {
    provider: Arc<dyn StackProvider>,
    identity: StackIdentity,
    program_dir: PathBuf,
    generator: ConfigGenerator,
    mode: Mode,
    timeout: Option<Duration>,
    reporter: StackReporter,
}

impl LifecycleRunner {
    pub fn new(
        provider: Arc<dyn StackProvider>,
        identity: StackIdentity,
        program_dir: impl Into<PathBuf>,
        generator: ConfigGenerator,
        mode: Mode,
        reporter: StackReporter,
    ) -> Self {
        LifecycleRunner {
            provider,
            identity,
            program_dir: program_dir.into(),
            generator,
            mode,
            timeout: None,
            reporter,
        }
    }

    /// Cancel this stack's in-flight operation once `timeout` elapses.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn identity(&self) -> &StackIdentity {
        &self.identity
    }

    /// Run to a terminal outcome and report it.
    pub async fn run(mut self, cancel: &CancellationToken) -> LifecycleOutcome {
        let span = tracing::info_span!("stack", stack = %self.identity);
        async move {
            let token = cancel.child_token();
            let timer = self.timeout.map(|limit| {
                let token = token.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(limit).await;
                    token.cancel();
                })
            });

            let result = self.drive(&token).await;
            if let Some(timer) = timer {
                timer.abort();
            }

            let outcome = match result {
                Ok(outputs) => {
                    info!("lifecycle succeeded");
                    LifecycleOutcome::Succeeded { outputs }
                }
                Err(err) => {
                    let timed_out =
                        err.is_cancelled() && token.is_cancelled() && !cancel.is_cancelled();
                    let cause = match self.timeout {
                        Some(limit) if timed_out => format!("timed out after {limit:?}"),
                        _ => err.cause(),
                    };
                    warn!(stage = %err.stage(), %cause, "lifecycle failed");
                    LifecycleOutcome::Failed {
                        stage: err.stage(),
                        cause,
                    }
                }
            };
            self.reporter.outcome(&outcome);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<Outputs, StageError> {
        debug!(state = %RunnerState::Init, provider = self.provider.name());
        let handle = self
            .provider
            .upsert(&self.identity, &self.program_dir, cancel)
            .await
            .map_err(StageError::HandleAcquisition)?;
        self.reporter.stack_ready(&self.identity);
        debug!(state = %RunnerState::HandleAcquired);

        // Applied key by key; a failure leaves earlier keys in place.
        let config = self.generator.generate();
        for (key, value) in config.iter() {
            self.provider
                .set_config(&handle, key, value, cancel)
                .await
                .map_err(|source| StageError::Configuration {
                    key: key.to_string(),
                    source,
                })?;
            debug!(key, value, "config set");
        }
        self.reporter.line("Successfully set config");
        debug!(state = %RunnerState::Configured);

        self.reporter.line("Starting refresh");
        self.provider
            .refresh(&handle, cancel)
            .await
            .map_err(StageError::Refresh)?;
        self.reporter.line("Refresh succeeded!");
        debug!(state = %RunnerState::Refreshed);

        match self.mode {
            Mode::Destroy => {
                self.reporter.line("Starting stack destroy");
                self.provider
                    .destroy(&handle, &self.reporter, cancel)
                    .await
                    .map_err(StageError::Destroy)?;
                self.reporter.line("Stack successfully destroyed");
                debug!(state = %RunnerState::Destroyed);
                Ok(Outputs::new())
            }
            Mode::Update => {
                self.reporter.line("Starting update");
                let outputs = self
                    .provider
                    .update(&handle, &self.reporter, cancel)
                    .await
                    .map_err(StageError::Update)?;
                self.reporter.line("Update succeeded!");
                require_url(&outputs)?;
                debug!(state = %RunnerState::Updated);
                Ok(outputs)
            }
        }
    }
}

/// The `url` output must be present and a string.
pub fn require_url(outputs: &Outputs) -> Result<&str, StageError> {
    match outputs.get(URL_OUTPUT) {
        Some(serde_json::Value::String(url)) => Ok(url),
        Some(other) => Err(StageError::OutputShape(format!(
            "output '{URL_OUTPUT}' is not a string: {other}"
        ))),
        None => Err(StageError::OutputShape(format!(
            "output '{URL_OUTPUT}' is missing"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
