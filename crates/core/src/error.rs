use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type BlastResult<T> = Result<T, BlastError>;

#[derive(Debug, Error)]
pub enum BlastError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no services found under {}", root.display())]
    NoServicesFound { root: PathBuf },

    #[error("failed to resolve dependencies for service {service}: {source}")]
    Resolver {
        service: String,
        #[source]
        source: ResolverError,
    },

    #[error("failed to list changed files: {0}")]
    ChangeSource(String),
}

impl BlastError {
    pub fn config(message: impl Into<String>) -> Self {
        BlastError::Configuration(message.into())
    }
}

/// Failure of a single package resolver invocation.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("resolver exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("resolver produced invalid output: {0}")]
    InvalidOutput(String),

    #[error("resolver timed out after {0:?}")]
    Timeout(Duration),
}

/// A resolver failure that was recovered as an empty dependency set.
#[derive(Debug, Clone)]
pub struct ResolverWarning {
    pub service: String,
    pub error: ResolverError,
}
