//! Domain models for sizewalk.
//!
//! Canonical definitions for the core entities:
//! - `CommitId` / `CommitInfo`: revisions and their metadata
//! - `EvaluationResult` / `EvaluationRun`: measured sizes per commit
//! - `RunConfig`: validated run configuration

pub mod commit;
pub mod config;
pub mod error;
pub mod evaluation;

// Re-export main types and errors
pub use commit::{BranchName, CommitId, CommitInfo};
pub use config::{
    RunConfig, DEFAULT_COMMIT_LIMIT, DEFAULT_DEPENDENCY_DIR, DEFAULT_INSTALL_COMMAND,
};
pub use error::{Result, SizewalkError};
pub use evaluation::{EvaluationResult, EvaluationRun, RunSummary, SizePoint};
