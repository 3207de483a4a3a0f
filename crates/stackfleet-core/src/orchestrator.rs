use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::FleetConfig;
use crate::error::{FleetError, Result};
use crate::generator::{time_seed, ConfigGenerator};
use crate::lifecycle::LifecycleRunner;
use crate::provider::StackProvider;
use crate::reporter::Reporter;
use crate::types::{FleetResult, Mode, StackIdentity, StackReport};

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// Runs `fleet_size` lifecycle runners concurrently and waits for all of them.
///
/// One task per stack, joined in index order. There is no short-circuit: a
/// failed stack is recorded and the barrier keeps waiting for the rest.
pub struct Fleet {
    provider: Arc<dyn StackProvider>,
    reporter: Reporter,
    config: FleetConfig,
    program_dir: PathBuf,
    seed: u64,
}

impl Fleet {
    pub fn new(
        provider: Arc<dyn StackProvider>,
        reporter: Reporter,
        config: FleetConfig,
        program_dir: impl Into<PathBuf>,
    ) -> Self {
        Fleet {
            provider,
            reporter,
            config,
            program_dir: program_dir.into(),
            seed: time_seed(),
        }
    }

    /// Fix the base seed so configuration values are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn stack_identities(&self) -> Vec<StackIdentity> {
        (0..self.config.fleet_size)
            .map(|i| StackIdentity::for_index(&self.config.stack_prefix, i))
            .collect()
    }

    /// Fails before any stack is touched if the config does not validate.
    pub async fn run(&self, mode: Mode, cancel: &CancellationToken) -> Result<FleetResult> {
        self.config.ensure_valid()?;
        let run_id = uuid::Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            %mode,
            fleet_size = self.config.fleet_size,
            max_parallel = ?self.config.max_parallel,
            provider = self.provider.name(),
            seed = self.seed,
            "starting fleet run"
        );

        let limiter = self
            .config
            .max_parallel
            .map(|n| Arc::new(Semaphore::new(n)));
        let timeout = self.config.stack_timeout();

        let mut handles = Vec::with_capacity(self.config.fleet_size);
        for (index, identity) in self.stack_identities().into_iter().enumerate() {
            let runner = LifecycleRunner::new(
                Arc::clone(&self.provider),
                identity.clone(),
                self.program_dir.clone(),
                ConfigGenerator::for_runner(&self.config, self.seed, index),
                mode,
                self.reporter.for_stack(&identity),
            )
            .with_timeout(timeout);

            let limiter = limiter.clone();
            let cancel = cancel.clone();
            let handle = tokio::spawn(async move {
                // Only a closed semaphore fails acquisition; it is never closed.
                let _permit = match limiter {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                runner.run(&cancel).await
            });
            handles.push((identity, handle));
        }

        let mut stacks = Vec::with_capacity(handles.len());
        let mut panicked = None;
        for (identity, handle) in handles {
            match handle.await {
                Ok(outcome) => stacks.push(StackReport {
                    stack: identity,
                    outcome,
                }),
                Err(e) => {
                    error!(stack = %identity, error = %e, "runner task failed");
                    panicked.get_or_insert((identity, e.to_string()));
                }
            }
        }

        if let Some((stack, message)) = panicked {
            return Err(FleetError::RunnerPanicked {
                stack: stack.to_string(),
                message,
            });
        }

        let result = FleetResult {
            run_id,
            mode,
            started_at,
            finished_at: Utc::now(),
            stacks,
        };
        info!(
            %run_id,
            succeeded = result.succeeded(),
            failed = result.failed(),
            "fleet run finished"
        );

        self.reporter.line(format_args!(
            "{} succeeded, {} failed",
            result.succeeded(),
            result.failed()
        ));
        self.reporter.completion();
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TunableRange;
    use crate::reporter::tests::SharedBuf;
    use crate::reporter::COMPLETION_MARKER;
    use crate::testing::{FakeProvider, Op};
    use crate::types::{LifecycleOutcome, Stage};
    use std::collections::HashSet;
    use std::time::Duration;

    fn fleet(provider: &Arc<FakeProvider>, config: FleetConfig) -> (Fleet, SharedBuf) {
        let buf = SharedBuf::default();
        let provider: Arc<dyn StackProvider> = provider.clone();
        let fleet = Fleet::new(provider, Reporter::new(buf.clone()), config, "./program")
            .with_seed(11);
        (fleet, buf)
    }

    fn sized(n: usize) -> FleetConfig {
        FleetConfig {
            fleet_size: n,
            ..FleetConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_stack_runs_with_a_distinct_identity() {
        let provider = Arc::new(FakeProvider::new());
        let (fleet, buf) = fleet(&provider, sized(100));
        let result = fleet.run(Mode::Update, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.len(), 100);
        assert_eq!(result.succeeded(), 100);
        let names: HashSet<_> = result.stacks.iter().map(|r| r.stack.clone()).collect();
        assert_eq!(names.len(), 100);
        assert_eq!(result.stacks[0].stack.as_str(), "lt-0");
        assert_eq!(result.stacks[99].stack.as_str(), "lt-99");

        let upserted: HashSet<_> = provider.upserted_stacks().into_iter().collect();
        assert_eq!(upserted.len(), 100);

        let out = buf.contents();
        assert_eq!(out.matches(COMPLETION_MARKER).count(), 1);
        assert!(out.ends_with(&format!("100 succeeded, 0 failed\n{COMPLETION_MARKER}\n")));
    }

    #[tokio::test]
    async fn inverted_tunable_range_is_rejected_before_any_stack() {
        let provider = Arc::new(FakeProvider::new());
        let config = FleetConfig {
            fleet_size: 2,
            tunables: TunableRange { min: 50, max: 10 },
            ..FleetConfig::default()
        };
        let (fleet, buf) = fleet(&provider, config);
        let err = fleet
            .run(Mode::Update, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FleetError::InvalidConfig(_)), "{err:?}");
        assert!(provider.upserted_stacks().is_empty());
        assert_eq!(provider.calls_of(Op::SetConfig), 0);
        assert!(buf.contents().is_empty());
    }

    #[tokio::test]
    async fn empty_fleet_completes() {
        let provider = Arc::new(FakeProvider::new());
        let (fleet, buf) = fleet(&provider, sized(0));
        let result = fleet.run(Mode::Update, &CancellationToken::new()).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(provider.calls_of(Op::Upsert), 0);
        assert!(buf.contents().contains(COMPLETION_MARKER));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_refresh_failure_does_not_spread() {
        let provider = Arc::new(FakeProvider::new().fail("lt-3", Op::Refresh, "state drift"));
        let (fleet, _buf) = fleet(&provider, sized(10));
        let result = fleet.run(Mode::Update, &CancellationToken::new()).await.unwrap();

        let failures: Vec<_> = result.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stack.as_str(), "lt-3");
        assert_eq!(
            failures[0].outcome,
            LifecycleOutcome::Failed {
                stage: Stage::Refresh,
                cause: "state drift".into(),
            }
        );
        for report in result.stacks.iter().filter(|r| r.stack.as_str() != "lt-3") {
            assert!(report.outcome.is_success(), "{} failed", report.stack);
        }
        assert_eq!(provider.calls_of(Op::Update), 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn destroy_mode_never_calls_update() {
        let provider = Arc::new(FakeProvider::new());
        let (fleet, _buf) = fleet(&provider, sized(20));
        let result = fleet.run(Mode::Destroy, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.mode, Mode::Destroy);
        assert_eq!(result.succeeded(), 20);
        assert_eq!(provider.calls_of(Op::Destroy), 20);
        assert_eq!(provider.calls_of(Op::Update), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn update_mode_never_calls_destroy() {
        let provider = Arc::new(FakeProvider::new());
        let (fleet, _buf) = fleet(&provider, sized(20));
        fleet.run(Mode::Update, &CancellationToken::new()).await.unwrap();

        assert_eq!(provider.calls_of(Op::Update), 20);
        assert_eq!(provider.calls_of(Op::Destroy), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runners_actually_overlap() {
        let provider =
            Arc::new(FakeProvider::new().with_delay(Duration::from_millis(20)));
        let (fleet, _buf) = fleet(&provider, sized(16));
        fleet.run(Mode::Update, &CancellationToken::new()).await.unwrap();
        assert!(provider.max_concurrent() > 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn max_parallel_bounds_active_runners() {
        let provider =
            Arc::new(FakeProvider::new().with_delay(Duration::from_millis(5)));
        let config = FleetConfig {
            max_parallel: Some(3),
            ..sized(12)
        };
        let (fleet, _buf) = fleet(&provider, config);
        let result = fleet.run(Mode::Update, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.succeeded(), 12);
        assert!(provider.max_concurrent() <= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancellation_unblocks_every_runner() {
        let mut provider = FakeProvider::new();
        for i in 0..8 {
            provider = provider.hang(&format!("lt-{i}"), Op::Refresh);
        }
        let provider = Arc::new(provider);
        let (fleet, buf) = fleet(&provider, sized(8));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), fleet.run(Mode::Update, &cancel))
            .await
            .expect("fleet did not unblock")
            .unwrap();
        assert_eq!(result.failed(), 8);
        assert!(result
            .stacks
            .iter()
            .all(|r| r.outcome.failed_stage() == Some(Stage::Refresh)));
        assert!(buf.contents().contains(COMPLETION_MARKER));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn per_stack_timeout_only_fails_the_slow_stack() {
        let provider = Arc::new(FakeProvider::new().hang("lt-1", Op::Update));
        let config = FleetConfig {
            stack_timeout_secs: Some(1),
            ..sized(4)
        };
        let (fleet, _buf) = fleet(&provider, config);
        let result = fleet.run(Mode::Update, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.failed(), 1);
        assert_eq!(
            result.outcome_for("lt-1"),
            Some(&LifecycleOutcome::Failed {
                stage: Stage::Update,
                cause: "timed out after 1s".into(),
            })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn reporter_lines_stay_whole_under_load() {
        let provider = Arc::new(FakeProvider::new());
        let (fleet, buf) = fleet(&provider, sized(200));
        fleet.run(Mode::Update, &CancellationToken::new()).await.unwrap();

        let out = buf.contents();
        for line in out.lines() {
            let ok = line == COMPLETION_MARKER
                || line.ends_with(" succeeded, 0 failed")
                || (line.starts_with("[lt-") && line.contains("] "));
            assert!(ok, "garbled line: {line:?}");
        }
        assert_eq!(out.matches("Update succeeded!").count(), 200);
    }

    #[test]
    fn identities_follow_prefix() {
        let provider: Arc<dyn StackProvider> = Arc::new(FakeProvider::new());
        let config = FleetConfig {
            stack_prefix: "soak".into(),
            ..sized(3)
        };
        let fleet = Fleet::new(provider, Reporter::new(std::io::sink()), config, ".");
        let names: Vec<_> = fleet
            .stack_identities()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, vec!["soak-0", "soak-1", "soak-2"]);
    }
}
