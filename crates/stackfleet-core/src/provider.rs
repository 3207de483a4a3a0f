//! Boundary to the provisioning backend.
//!
//! Every operation may block for a long time and is the only place a runner
//! suspends. Implementations must return [`ProviderError::Cancelled`]
//! promptly once `cancel` fires.

use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::types::{Outputs, StackHandle, StackIdentity};

/// Destination for incremental progress text from update/destroy.
pub trait ProgressSink: Send + Sync {
    /// Receive one line of progress, without its trailing newline.
    fn line(&self, line: &str);
}

#[async_trait]
pub trait StackProvider: Send + Sync {
    /// Create the stack if absent, select it otherwise.
    async fn upsert(
        &self,
        identity: &StackIdentity,
        program_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<StackHandle, ProviderError>;

    async fn set_config(
        &self,
        handle: &StackHandle,
        key: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError>;

    /// Reconcile persisted state with live resources.
    async fn refresh(
        &self,
        handle: &StackHandle,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError>;

    /// Apply the program and return its declared outputs.
    async fn update(
        &self,
        handle: &StackHandle,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Outputs, ProviderError>;

    async fn destroy(
        &self,
        handle: &StackHandle,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError>;

    /// Name for logging.
    fn name(&self) -> &str;
}
