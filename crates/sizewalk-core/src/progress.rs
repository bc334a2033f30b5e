//! Presentation hooks the pipeline calls into.
//!
//! The pipeline never talks to a terminal directly; front ends supply a
//! [`ProgressReporter`] and a [`ConfirmationPrompt`].

use std::fmt;
use tracing::info;

use crate::domain::commit::{BranchName, CommitId};
use crate::domain::error::Result;
use crate::domain::evaluation::{EvaluationResult, EvaluationRun};

/// Per-commit step currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvaluationStep {
    Checkout,
    Build,
    Measure,
    ReadMetadata,
}

impl fmt::Display for EvaluationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvaluationStep::Checkout => "checkout",
            EvaluationStep::Build => "build",
            EvaluationStep::Measure => "measure",
            EvaluationStep::ReadMetadata => "read_metadata",
        })
    }
}

/// Receives progress notifications. All methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn run_started(&self, _branch: &BranchName, _commits: &[CommitId]) {}

    fn commit_started(&self, _index: usize, _total: usize, _commit: &CommitId) {}

    fn step_started(&self, _commit: &CommitId, _step: EvaluationStep) {}

    fn commit_finished(&self, _index: usize, _total: usize, _result: &EvaluationResult) {}

    fn restoring(&self, _branch: &BranchName) {}

    fn run_finished(&self, _run: &EvaluationRun) {}
}

/// Asked once, after listing and before the first checkout.
pub trait ConfirmationPrompt: Send + Sync {
    /// `Ok(false)` ends the run without touching the working tree.
    fn confirm(&self, branch: &BranchName, commits: &[CommitId]) -> Result<bool>;
}

/// Confirms every run.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl ConfirmationPrompt for AssumeYes {
    fn confirm(&self, _branch: &BranchName, _commits: &[CommitId]) -> Result<bool> {
        Ok(true)
    }
}

/// Reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn run_started(&self, branch: &BranchName, commits: &[CommitId]) {
        info!(branch = %branch, commits = commits.len(), "Evaluating commits");
    }

    fn commit_started(&self, index: usize, total: usize, commit: &CommitId) {
        info!(
            commit = %commit.short(),
            position = index + 1,
            total,
            "Evaluating commit"
        );
    }

    fn commit_finished(&self, _index: usize, _total: usize, result: &EvaluationResult) {
        info!(
            commit = %result.commit.hash.short(),
            build_size = result.build_size,
            "Measured artifact"
        );
    }

    fn restoring(&self, branch: &BranchName) {
        info!(branch = %branch, "Restoring original branch");
    }
}
