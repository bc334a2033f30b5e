//! Structured observability hooks for sizewalk run lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan`
//! - Emission functions for key lifecycle events: start, per-commit result,
//!   restoration, failure and finish
//!
//! Events are emitted at `info!` level, failures at `warn!`/`error!`.
//! Filter with `RUST_LOG`; pass `--json` to the CLI for JSON lines.

use std::fmt::Display;
use std::future::Future;
use tracing::{error, info, warn, Instrument};

/// Run-scoped tracing span tagged with the run_id.
///
/// # Example
///
/// ```ignore
/// let span = RunSpan::new("6f1c...");
/// span.scope(async { /* events here carry run_id = "6f1c..." */ }).await;
/// ```
pub struct RunSpan {
    span: tracing::Span,
}

impl RunSpan {
    pub fn new(run_id: &str) -> Self {
        Self {
            span: tracing::info_span!("sizewalk.run", run_id = %run_id),
        }
    }

    /// Drive `fut` with the span entered on every poll.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        fut.instrument(self.span.clone()).await
    }
}

/// Emit event: run started on `branch` with `commit_count` selected commits.
pub fn emit_run_started(run_id: &str, branch: &str, commit_count: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        branch = %branch,
        commit_count = commit_count,
    );
}

/// Emit event: one commit measured.
pub fn emit_commit_evaluated(
    run_id: &str,
    index: usize,
    commit: &str,
    build_size: u64,
    duration_ms: u64,
) {
    info!(
        event = "commit.evaluated",
        run_id = %run_id,
        index = index,
        commit = %commit,
        build_size = build_size,
        duration_ms = duration_ms,
    );
}

/// Emit event: original branch checked out again.
pub fn emit_run_restored(run_id: &str, branch: &str) {
    info!(event = "run.restored", run_id = %run_id, branch = %branch);
}

/// Emit event: restoring the original branch failed (warning level).
pub fn emit_run_restore_error(run_id: &str, branch: &str, error: &dyn Display) {
    warn!(
        event = "run.restore_error",
        run_id = %run_id,
        branch = %branch,
        error = %error,
    );
}

/// Emit event: run aborted in `state`.
pub fn emit_run_failed(run_id: &str, state: &dyn Display, error: &dyn Display) {
    error!(
        event = "run.failed",
        run_id = %run_id,
        state = %state,
        error = %error,
    );
}

/// Emit event: run finished with duration and number of evaluated commits.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, evaluated: usize, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        evaluated = evaluated,
        success = success,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_span_scope_returns_output() {
        let span = RunSpan::new("test-run-id");
        assert_eq!(span.scope(async { 41 + 1 }).await, 42);
    }

    #[test]
    fn test_emitters_without_subscriber() {
        emit_run_started("r", "main", 3);
        emit_commit_evaluated("r", 0, "abc", 10, 5);
        emit_run_restored("r", "main");
        emit_run_restore_error("r", "main", &"boom");
        emit_run_failed("r", &"evaluation", &"boom");
        emit_run_finished("r", 10, 3, true);
    }
}
