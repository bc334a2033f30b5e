//! sizewalk Core Library
//!
//! Measures a build artifact across recent commits of a git checkout:
//! check out, reinstall, build, measure, restore, report.
//!
//! The pieces, leaves first:
//! - [`exec`]: typed subprocess execution
//! - [`git`]: repository gateway and the working-tree handle
//! - [`build`]: dependency reset, install and build command
//! - [`artifact`]: artifact size measurement
//! - [`pipeline`]: the per-run state machine
//! - [`report`]: `output.json` and `report.html`

pub mod artifact;
pub mod build;
pub mod domain;
pub mod exec;
pub mod fakes;
pub mod git;
pub mod obs;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod telemetry;

pub use artifact::{ArtifactInspector, FsArtifactInspector};
pub use build::{BuildPlan, BuildReport, BuildRunner, BuildStep, ShellBuildRunner};
pub use domain::{
    BranchName, CommitId, CommitInfo, EvaluationResult, EvaluationRun, Result, RunConfig,
    RunSummary, SizePoint, SizewalkError, DEFAULT_COMMIT_LIMIT, DEFAULT_DEPENDENCY_DIR,
    DEFAULT_INSTALL_COMMAND,
};
pub use exec::{CommandOutput, CommandRunner, CommandSpec, Invocation, ProcessRunner};
pub use git::{GitRepository, RepositoryGateway, WorkingTreeHandle};
pub use obs::RunSpan;
pub use pipeline::{
    select_commits, EvaluationPipeline, EvaluationRequest, PipelineFailure, PipelineState,
    RunOutcome,
};
pub use progress::{
    AssumeYes, ConfirmationPrompt, EvaluationStep, ProgressReporter, TracingProgress,
};
pub use report::{
    ReportAssembler, ReportPaths, ReportSink, ReportWriter, DEFAULT_TEMPLATE, HTML_REPORT_FILE,
    JSON_REPORT_FILE,
};
pub use telemetry::init_tracing;

/// sizewalk version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
