//! Commit evaluation pipeline.
//!
//! Drives one run through
//! `Init -> Listing -> Confirming -> Evaluating[i] -> Restoring -> Reporting -> Done`.
//!
//! Every step is awaited before the next starts; commits are never evaluated
//! in parallel because they share one working tree and one dependency
//! directory. Once evaluation has begun the original branch is checked out
//! again on every exit path, including after a failed checkout, build or
//! measurement.
//!
//! There is no cancellation: interrupting the process mid-commit leaves the
//! tree on whatever commit was being built.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::artifact::{ArtifactInspector, FsArtifactInspector};
use crate::build::{BuildPlan, BuildRunner, ShellBuildRunner};
use crate::domain::commit::{BranchName, CommitId};
use crate::domain::config::RunConfig;
use crate::domain::error::{Result, SizewalkError};
use crate::domain::evaluation::{EvaluationResult, EvaluationRun};
use crate::exec::CommandRunner;
use crate::git::{GitRepository, RepositoryGateway, WorkingTreeHandle};
use crate::obs::{
    emit_commit_evaluated, emit_run_failed, emit_run_finished, emit_run_restore_error,
    emit_run_restored, emit_run_started, RunSpan,
};
use crate::progress::{
    AssumeYes, ConfirmationPrompt, EvaluationStep, ProgressReporter, TracingProgress,
};
use crate::report::{ReportAssembler, ReportSink, ReportWriter};

/// Where a run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Listing,
    Confirming,
    Evaluating { index: usize, total: usize },
    Restoring,
    Reporting,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Init => f.write_str("init"),
            PipelineState::Listing => f.write_str("listing"),
            PipelineState::Confirming => f.write_str("confirmation"),
            PipelineState::Evaluating { index, total } => {
                write!(f, "evaluation of commit {}/{}", index + 1, total)
            }
            PipelineState::Restoring => f.write_str("restoring"),
            PipelineState::Reporting => f.write_str("reporting"),
            PipelineState::Done => f.write_str("done"),
        }
    }
}

/// Inputs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRequest {
    /// Artifact path relative to the project directory.
    pub artifact: PathBuf,

    /// Most recent commits to evaluate; 0 evaluates all of them.
    pub limit: usize,

    pub plan: BuildPlan,
}

impl EvaluationRequest {
    pub fn new(artifact: impl Into<PathBuf>, limit: usize, plan: BuildPlan) -> Self {
        Self {
            artifact: artifact.into(),
            limit,
            plan,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.zip_path.clone(), config.commit_limit, config.build_plan())
    }
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every selected commit was evaluated and reported.
    Completed(EvaluationRun),

    /// The confirmation prompt declined; the tree was never touched.
    Declined {
        branch: BranchName,
        commits: Vec<CommitId>,
    },
}

/// A run that stopped on an error.
#[derive(Debug, thiserror::Error)]
#[error("run aborted during {state}")]
pub struct PipelineFailure {
    /// State the error was raised in.
    pub state: PipelineState,

    #[source]
    pub error: SizewalkError,

    /// Results recorded before the failure; `None` when Init failed.
    pub run: Option<EvaluationRun>,
}

impl PipelineFailure {
    fn new(state: PipelineState, error: SizewalkError, run: Option<EvaluationRun>) -> Self {
        Self { state, error, run }
    }

    /// Number of results recorded before the failure.
    pub fn evaluated(&self) -> usize {
        self.run.as_ref().map_or(0, EvaluationRun::len)
    }
}

/// Keep the first `limit` commits; 0 keeps every commit.
pub fn select_commits(mut commits: Vec<CommitId>, limit: usize) -> Vec<CommitId> {
    if limit > 0 {
        commits.truncate(limit);
    }
    commits
}

/// Commit evaluation orchestrator.
pub struct EvaluationPipeline {
    repository: Arc<dyn RepositoryGateway>,
    builder: Arc<dyn BuildRunner>,
    inspector: Arc<dyn ArtifactInspector>,
    sink: Arc<dyn ReportSink>,
    progress: Arc<dyn ProgressReporter>,
    prompt: Arc<dyn ConfirmationPrompt>,
}

impl EvaluationPipeline {
    /// Pipeline that logs progress through `tracing` and never asks for
    /// confirmation.
    pub fn new(
        repository: Arc<dyn RepositoryGateway>,
        builder: Arc<dyn BuildRunner>,
        inspector: Arc<dyn ArtifactInspector>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            repository,
            builder,
            inspector,
            sink,
            progress: Arc::new(TracingProgress),
            prompt: Arc::new(AssumeYes),
        }
    }

    /// Production wiring: git, shell builds, filesystem measurement and
    /// report files in `config.output_dir`.
    pub fn from_config(config: &RunConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let assembler = match &config.template_path {
            Some(path) => ReportAssembler::from_template_file(path)?,
            None => ReportAssembler::new(),
        };

        Ok(Self::new(
            Arc::new(GitRepository::new(runner.clone())),
            Arc::new(ShellBuildRunner::new(runner)),
            Arc::new(FsArtifactInspector),
            Arc::new(ReportWriter::new(assembler, config.output_dir.clone())),
        ))
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn ConfirmationPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Execute one run against `tree`.
    pub async fn run(
        &self,
        tree: &mut WorkingTreeHandle,
        request: &EvaluationRequest,
    ) -> std::result::Result<RunOutcome, PipelineFailure> {
        let run_id = Uuid::new_v4().to_string();
        let start = Instant::now();

        let result = RunSpan::new(&run_id)
            .scope(self.drive(&run_id, tree, request))
            .await;

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(RunOutcome::Completed(run)) => {
                emit_run_finished(&run_id, duration_ms, run.len(), true)
            }
            Ok(RunOutcome::Declined { .. }) => {
                info!(run_id = %run_id, "Run declined before any checkout")
            }
            Err(failure) => {
                emit_run_failed(&run_id, &failure.state, &failure.error);
                emit_run_finished(&run_id, duration_ms, failure.evaluated(), false);
            }
        }
        result
    }

    async fn drive(
        &self,
        run_id: &str,
        tree: &mut WorkingTreeHandle,
        request: &EvaluationRequest,
    ) -> std::result::Result<RunOutcome, PipelineFailure> {
        // Init: without a restoration target nothing may be checked out.
        let branch = self
            .repository
            .current_branch(tree)
            .await
            .map_err(|error| PipelineFailure::new(PipelineState::Init, error, None))?;
        let mut run = EvaluationRun::new(branch.clone(), request.limit);

        // Listing
        let commits = match self.repository.list_commits(tree).await {
            Ok(commits) => select_commits(commits, request.limit),
            Err(error) => {
                return Err(PipelineFailure::new(PipelineState::Listing, error, Some(run)))
            }
        };
        emit_run_started(run_id, branch.as_str(), commits.len());
        self.progress.run_started(&branch, &commits);

        // Confirming
        match self.prompt.confirm(&branch, &commits) {
            Ok(true) => {}
            Ok(false) => return Ok(RunOutcome::Declined { branch, commits }),
            Err(error) => {
                return Err(PipelineFailure::new(
                    PipelineState::Confirming,
                    error,
                    Some(run),
                ))
            }
        }

        // Evaluating
        let evaluated = self
            .evaluate_all(run_id, tree, &commits, request, &mut run)
            .await;

        // Restoring runs whether or not evaluation succeeded.
        self.progress.restoring(&branch);
        let restored = self.repository.restore(tree, &branch).await;
        match (evaluated, restored) {
            (Ok(()), Ok(())) => emit_run_restored(run_id, branch.as_str()),
            (Err((state, error)), Ok(())) => {
                emit_run_restored(run_id, branch.as_str());
                return Err(PipelineFailure::new(state, error, Some(run)));
            }
            (Err((state, error)), Err(restore_error)) => {
                emit_run_restore_error(run_id, branch.as_str(), &restore_error);
                return Err(PipelineFailure::new(state, error, Some(run)));
            }
            (Ok(()), Err(restore_error)) => {
                emit_run_restore_error(run_id, branch.as_str(), &restore_error);
                return Err(PipelineFailure::new(
                    PipelineState::Restoring,
                    restore_error,
                    Some(run),
                ));
            }
        }

        // Reporting
        if let Err(error) = self.sink.publish(&run) {
            return Err(PipelineFailure::new(
                PipelineState::Reporting,
                error,
                Some(run),
            ));
        }
        self.progress.run_finished(&run);
        debug!(state = %PipelineState::Done, "Pipeline finished");

        Ok(RunOutcome::Completed(run))
    }

    /// Evaluate commits in order, stopping at the first failure.
    async fn evaluate_all(
        &self,
        run_id: &str,
        tree: &mut WorkingTreeHandle,
        commits: &[CommitId],
        request: &EvaluationRequest,
        run: &mut EvaluationRun,
    ) -> std::result::Result<(), (PipelineState, SizewalkError)> {
        let total = commits.len();
        for (index, commit) in commits.iter().enumerate() {
            let state = PipelineState::Evaluating { index, total };
            debug!(state = %state, commit = %commit, "Entering state");

            let started = Instant::now();
            self.progress.commit_started(index, total, commit);
            let result = self
                .evaluate_one(tree, commit, request)
                .await
                .map_err(|error| (state, error))?;

            emit_commit_evaluated(
                run_id,
                index,
                result.commit.hash.as_str(),
                result.build_size,
                started.elapsed().as_millis() as u64,
            );
            self.progress.commit_finished(index, total, &result);
            run.push(result);
        }
        Ok(())
    }

    async fn evaluate_one(
        &self,
        tree: &mut WorkingTreeHandle,
        commit: &CommitId,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResult> {
        self.progress.step_started(commit, EvaluationStep::Checkout);
        self.repository.checkout(tree, commit.as_str()).await?;

        self.progress.step_started(commit, EvaluationStep::Build);
        self.builder.build(tree, &request.plan).await?;

        self.progress.step_started(commit, EvaluationStep::Measure);
        let build_size = self.inspector.size_of(tree, &request.artifact)?;

        self.progress.step_started(commit, EvaluationStep::ReadMetadata);
        let info = self.repository.commit_info(tree).await?;

        Ok(EvaluationResult {
            commit: info,
            build_size,
        })
    }
}
