use thiserror::Error;

use crate::types::Stage;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("runner for stack '{stack}' panicked: {message}")]
    RunnerPanicked { stack: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;

/// Failure reported by a [`StackProvider`](crate::provider::StackProvider) operation.
///
/// The runner never inspects these beyond their display text; they become the
/// `cause` of a failed outcome.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Command(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An error raised while driving one stack, tagged with the phase it came from.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to create or select stack: {0}")]
    HandleAcquisition(#[source] ProviderError),

    #[error("failed to set config '{key}': {source}")]
    Configuration {
        key: String,
        #[source]
        source: ProviderError,
    },

    #[error("failed to refresh stack: {0}")]
    Refresh(#[source] ProviderError),

    #[error("failed to update stack: {0}")]
    Update(#[source] ProviderError),

    #[error("failed to destroy stack: {0}")]
    Destroy(#[source] ProviderError),

    #[error("output-shape-mismatch: {0}")]
    OutputShape(String),
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::HandleAcquisition(_) => Stage::HandleAcquisition,
            StageError::Configuration { .. } => Stage::Configuration,
            StageError::Refresh(_) => Stage::Refresh,
            StageError::Update(_) | StageError::OutputShape(_) => Stage::Update,
            StageError::Destroy(_) => Stage::Destroy,
        }
    }

    /// The provider error behind this failure, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            StageError::HandleAcquisition(e)
            | StageError::Refresh(e)
            | StageError::Update(e)
            | StageError::Destroy(e) => Some(e),
            StageError::Configuration { source, .. } => Some(source),
            StageError::OutputShape(_) => None,
        }
    }

    /// Cause text without the stage prefix, as carried by a failed outcome.
    pub fn cause(&self) -> String {
        match self {
            StageError::Configuration { key, source } => format!("{key}: {source}"),
            StageError::OutputShape(detail) => format!("output-shape-mismatch: {detail}"),
            other => other
                .provider_error()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.provider_error(), Some(ProviderError::Cancelled))
    }
}
