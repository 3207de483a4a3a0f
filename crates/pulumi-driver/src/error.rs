use stackfleet_core::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PulumiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pulumi executable not found: {name}")]
    ExecutableNotFound {
        name: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to parse stack outputs: {source} (output: {output})")]
    Parse {
        output: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Process(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<PulumiError> for ProviderError {
    fn from(err: PulumiError) -> Self {
        match err {
            PulumiError::Cancelled => ProviderError::Cancelled,
            PulumiError::Io(e) => ProviderError::Io(e),
            other => ProviderError::Command(other.to_string()),
        }
    }
}
