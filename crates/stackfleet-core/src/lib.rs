//! Concurrent stack lifecycle orchestration.
//!
//! A [`Fleet`] fans out one [`LifecycleRunner`] per stack against a shared
//! [`StackProvider`], waits for every runner, and reports through a
//! line-atomic [`Reporter`].

pub mod config;
pub mod error;
pub mod generator;
pub mod lifecycle;
pub mod orchestrator;
pub mod provider;
pub mod reporter;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{FleetError, ProviderError, Result, StageError};
pub use lifecycle::LifecycleRunner;
pub use orchestrator::Fleet;
pub use provider::{ProgressSink, StackProvider};
pub use reporter::{Reporter, StackReporter, COMPLETION_MARKER};
pub use types::{
    ConfigurationSet, FleetResult, LifecycleOutcome, Mode, Outputs, Stage, StackHandle,
    StackIdentity, StackReport,
};

pub use tokio_util::sync::CancellationToken;
