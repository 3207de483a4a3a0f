//! Call-counting in-memory provider for runner and fleet tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::provider::{ProgressSink, StackProvider};
use crate::types::{Outputs, StackHandle, StackIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Upsert,
    SetConfig,
    Refresh,
    Update,
    Destroy,
}

#[derive(Default)]
pub(crate) struct FakeProvider {
    calls: Mutex<Vec<(String, Op)>>,
    config: Mutex<Vec<(String, String, String)>>,
    failures: HashMap<(String, Op), String>,
    config_failures: HashMap<(String, String), String>,
    hangs: Vec<(String, Op)>,
    outputs: HashMap<String, Outputs>,
    delay: Option<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail(mut self, stack: &str, op: Op, cause: &str) -> Self {
        self.failures.insert((stack.to_string(), op), cause.to_string());
        self
    }

    pub(crate) fn fail_config_key(mut self, stack: &str, key: &str, cause: &str) -> Self {
        self.config_failures
            .insert((stack.to_string(), key.to_string()), cause.to_string());
        self
    }

    /// Block `op` for `stack` until cancelled.
    pub(crate) fn hang(mut self, stack: &str, op: Op) -> Self {
        self.hangs.push((stack.to_string(), op));
        self
    }

    pub(crate) fn with_outputs(mut self, stack: &str, outputs: Outputs) -> Self {
        self.outputs.insert(stack.to_string(), outputs);
        self
    }

    /// Every operation sleeps this long before completing.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self, stack: &str, op: Op) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, o)| s == stack && *o == op)
            .count()
    }

    pub(crate) fn total_calls(&self, stack: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == stack)
            .count()
    }

    pub(crate) fn calls_of(&self, op: Op) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, o)| *o == op)
            .count()
    }

    pub(crate) fn upserted_stacks(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, o)| *o == Op::Upsert)
            .map(|(s, _)| s.clone())
            .collect()
    }

    pub(crate) fn config_for(&self, stack: &str) -> Vec<(String, String)> {
        self.config
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| s == stack)
            .map(|(_, k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn step(
        &self,
        stack: &StackIdentity,
        op: Op,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((stack.to_string(), op));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let result = self.behave(stack, op, cancel).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn behave(
        &self,
        stack: &StackIdentity,
        op: Op,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let key = (stack.to_string(), op);
        if self.hangs.contains(&key) {
            cancel.cancelled().await;
            return Err(ProviderError::Cancelled);
        }
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        match self.failures.get(&key) {
            Some(cause) => Err(ProviderError::Command(cause.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StackProvider for FakeProvider {
    async fn upsert(
        &self,
        identity: &StackIdentity,
        program_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<StackHandle, ProviderError> {
        self.step(identity, Op::Upsert, cancel).await?;
        Ok(StackHandle::new(identity.clone(), program_dir))
    }

    async fn set_config(
        &self,
        handle: &StackHandle,
        key: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let stack = handle.identity();
        self.config.lock().unwrap().push((
            stack.to_string(),
            key.to_string(),
            value.to_string(),
        ));
        self.step(stack, Op::SetConfig, cancel).await?;
        match self
            .config_failures
            .get(&(stack.to_string(), key.to_string()))
        {
            Some(cause) => Err(ProviderError::Command(cause.clone())),
            None => Ok(()),
        }
    }

    async fn refresh(
        &self,
        handle: &StackHandle,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        self.step(handle.identity(), Op::Refresh, cancel).await
    }

    async fn update(
        &self,
        handle: &StackHandle,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Outputs, ProviderError> {
        let stack = handle.identity();
        progress.line(&format!("Updating ({stack})"));
        self.step(stack, Op::Update, cancel).await?;
        Ok(self.outputs.get(stack.as_str()).cloned().unwrap_or_else(|| {
            let mut outputs = Outputs::new();
            outputs.insert(
                "url".into(),
                serde_json::Value::String(format!("http://{stack}.example.test")),
            );
            outputs
        }))
    }

    async fn destroy(
        &self,
        handle: &StackHandle,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let stack = handle.identity();
        progress.line(&format!("Destroying ({stack})"));
        self.step(stack, Op::Destroy, cancel).await
    }

    fn name(&self) -> &str {
        "fake"
    }
}
