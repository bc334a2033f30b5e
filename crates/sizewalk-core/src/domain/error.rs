//! Domain-level error taxonomy for sizewalk.

use std::path::PathBuf;

use crate::build::BuildStep;

/// sizewalk domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SizewalkError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("repository state error: {0}")]
    RepositoryState(String),

    #[error("checkout of {reference} failed: {message}")]
    Checkout { reference: String, message: String },

    #[error("build step {step} exited with code {exit_code}: {stderr}")]
    BuildFailure {
        step: BuildStep,
        exit_code: i32,
        stderr: String,
    },

    #[error("build artifact not found at {}", .path.display())]
    ArtifactNotFound { path: PathBuf },

    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    #[error("report template error: {0}")]
    Template(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sizewalk domain operations.
pub type Result<T> = std::result::Result<T, SizewalkError>;
