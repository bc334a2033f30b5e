//! In-memory fakes for the pipeline's collaborators (testing only)
//!
//! Provides `ScriptedCommandRunner` for gateway and builder tests, and
//! `FakeWorkspace`, a scripted history that implements the repository
//! gateway, build runner and artifact inspector at once, plus recording
//! doubles for progress, confirmation and reporting.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};

use crate::artifact::ArtifactInspector;
use crate::build::{BuildPlan, BuildReport, BuildRunner, BuildStep};
use crate::domain::commit::{BranchName, CommitId, CommitInfo};
use crate::domain::error::{Result, SizewalkError};
use crate::domain::evaluation::{EvaluationResult, EvaluationRun};
use crate::exec::{CommandOutput, CommandRunner, CommandSpec};
use crate::git::{RepositoryGateway, WorkingTreeHandle};
use crate::progress::{ConfirmationPrompt, EvaluationStep, ProgressReporter};
use crate::report::ReportSink;

// ---------------------------------------------------------------------------
// ScriptedCommandRunner
// ---------------------------------------------------------------------------

/// Successful output with the given stdout.
pub fn ok_output(stdout: &str) -> CommandOutput {
    CommandOutput {
        name: String::new(),
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
        duration_ms: 0,
        success: true,
    }
}

/// Failed output with the given exit code and stderr.
pub fn failed_output(exit_code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        name: String::new(),
        exit_code,
        stdout: String::new(),
        stderr: stderr.to_string(),
        duration_ms: 0,
        success: false,
    }
}

#[derive(Debug)]
enum Reply {
    Output(CommandOutput),
    SpawnError(std::io::ErrorKind),
}

/// Command runner answering from a table of command-line prefixes.
///
/// The first rule whose prefix matches the command line wins; commands
/// without a rule succeed with empty output. Every invocation is recorded.
#[derive(Debug, Default)]
pub struct ScriptedCommandRunner {
    rules: Mutex<Vec<(String, Reply)>>,
    invocations: Mutex<Vec<CommandSpec>>,
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        self.rules
            .lock()
            .unwrap()
            .push((prefix.to_string(), Reply::Output(output)));
    }

    pub fn fail_spawn(&self, prefix: &str, kind: std::io::ErrorKind) {
        self.rules
            .lock()
            .unwrap()
            .push((prefix.to_string(), Reply::SpawnError(kind)));
    }

    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(CommandSpec::command_line)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.invocations.lock().unwrap().push(spec.clone());
        let line = spec.command_line();

        let rules = self.rules.lock().unwrap();
        match rules.iter().find(|(prefix, _)| line.starts_with(prefix.as_str())) {
            Some((_, Reply::Output(output))) => Ok(CommandOutput {
                name: spec.name.clone(),
                ..output.clone()
            }),
            Some((_, Reply::SpawnError(kind))) => Err(SizewalkError::Spawn {
                command: line,
                source: std::io::Error::from(*kind),
            }),
            None => Ok(CommandOutput {
                name: spec.name.clone(),
                ..ok_output("")
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeWorkspace
// ---------------------------------------------------------------------------

/// One commit of a fake history.
#[derive(Debug, Clone)]
pub struct FakeCommit {
    pub info: CommitInfo,
    pub size: u64,
}

#[derive(Debug)]
struct WorkspaceState {
    branch: Option<String>,
    commits: Vec<FakeCommit>,
    head: Option<String>,
    checkouts: Vec<String>,
    builds: usize,
    failing_builds: HashSet<String>,
    missing_artifacts: HashSet<String>,
    unresolvable: HashSet<String>,
    listing_fails: bool,
}

impl WorkspaceState {
    /// Commit a reference points at.
    fn resolve(&self, reference: &str) -> Option<&FakeCommit> {
        if self.branch.as_deref() == Some(reference) {
            return self.commits.first();
        }
        self.commits
            .iter()
            .find(|c| c.info.hash.as_str() == reference)
    }

    fn current(&self) -> Result<&FakeCommit> {
        self.head
            .as_deref()
            .and_then(|head| self.resolve(head))
            .ok_or_else(|| SizewalkError::RepositoryState("no commit checked out".to_string()))
    }
}

/// Scripted history implementing gateway, builder and inspector together.
///
/// Commits are listed newest first. Sizes differ per commit, so a result
/// measured on the wrong checkout is detectable.
#[derive(Debug)]
pub struct FakeWorkspace {
    state: Mutex<WorkspaceState>,
}

impl FakeWorkspace {
    /// `commit_count` commits with `branch` checked out at the newest one.
    pub fn new(branch: &str, commit_count: usize) -> Self {
        Self::scripted(Some(branch.to_string()), commit_count)
    }

    /// History whose HEAD is detached.
    pub fn detached(commit_count: usize) -> Self {
        Self::scripted(None, commit_count)
    }

    fn scripted(branch: Option<String>, commit_count: usize) -> Self {
        let base: DateTime<FixedOffset> =
            DateTime::parse_from_rfc3339("2024-01-01T09:00:00+00:00").expect("valid timestamp");
        let commits: Vec<FakeCommit> = (0..commit_count)
            .rev()
            .map(|n| FakeCommit {
                info: CommitInfo {
                    hash: CommitId::new(format!("{:040x}", 0xc0ffee_u64 + n as u64)),
                    author: format!("dev{}", n % 2),
                    date: base + Duration::hours(n as i64),
                    message: format!("commit #{n}"),
                },
                size: 10_000 + 250 * n as u64,
            })
            .collect();
        let head = branch
            .clone()
            .or_else(|| commits.first().map(|c| c.info.hash.to_string()));

        Self {
            state: Mutex::new(WorkspaceState {
                branch,
                commits,
                head,
                checkouts: Vec::new(),
                builds: 0,
                failing_builds: HashSet::new(),
                missing_artifacts: HashSet::new(),
                unresolvable: HashSet::new(),
                listing_fails: false,
            }),
        }
    }

    pub fn fail_build_at(&self, commit: &CommitId) {
        self.state
            .lock()
            .unwrap()
            .failing_builds
            .insert(commit.to_string());
    }

    pub fn drop_artifact_at(&self, commit: &CommitId) {
        self.state
            .lock()
            .unwrap()
            .missing_artifacts
            .insert(commit.to_string());
    }

    pub fn reject_checkout_of(&self, reference: &str) {
        self.state
            .lock()
            .unwrap()
            .unresolvable
            .insert(reference.to_string());
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().listing_fails = true;
    }

    /// Listing order, newest first.
    pub fn commit_ids(&self) -> Vec<CommitId> {
        self.state
            .lock()
            .unwrap()
            .commits
            .iter()
            .map(|c| c.info.hash.clone())
            .collect()
    }

    pub fn size_for(&self, commit: &CommitId) -> u64 {
        self.state
            .lock()
            .unwrap()
            .commits
            .iter()
            .find(|c| &c.info.hash == commit)
            .map_or(0, |c| c.size)
    }

    /// Reference currently checked out.
    pub fn checked_out(&self) -> String {
        self.state.lock().unwrap().head.clone().unwrap_or_default()
    }

    /// Every checkout attempted, in order, including rejected ones.
    pub fn checkouts(&self) -> Vec<String> {
        self.state.lock().unwrap().checkouts.clone()
    }

    pub fn build_count(&self) -> usize {
        self.state.lock().unwrap().builds
    }
}

#[async_trait]
impl RepositoryGateway for FakeWorkspace {
    async fn current_branch(&self, _tree: &WorkingTreeHandle) -> Result<BranchName> {
        let state = self.state.lock().unwrap();
        match (&state.branch, &state.head) {
            (Some(branch), Some(head)) if branch == head => Ok(BranchName::new(branch.clone())),
            _ => Err(SizewalkError::RepositoryState("HEAD is detached".to_string())),
        }
    }

    async fn list_commits(&self, _tree: &WorkingTreeHandle) -> Result<Vec<CommitId>> {
        if self.state.lock().unwrap().listing_fails {
            return Err(SizewalkError::RepositoryState(
                "git rev-list HEAD failed".to_string(),
            ));
        }
        Ok(self.commit_ids())
    }

    async fn checkout(&self, tree: &mut WorkingTreeHandle, reference: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.checkouts.push(reference.to_string());

        let resolvable = !state.unresolvable.contains(reference)
            && (state.resolve(reference).is_some() || state.branch.as_deref() == Some(reference));
        if !resolvable {
            return Err(SizewalkError::Checkout {
                reference: reference.to_string(),
                message: format!("pathspec '{reference}' did not match"),
            });
        }

        state.head = Some(reference.to_string());
        tree.mark_checked_out(reference);
        Ok(())
    }

    async fn commit_info(&self, _tree: &WorkingTreeHandle) -> Result<CommitInfo> {
        let state = self.state.lock().unwrap();
        Ok(state.current()?.info.clone())
    }
}

#[async_trait]
impl BuildRunner for FakeWorkspace {
    async fn build(&self, _tree: &mut WorkingTreeHandle, plan: &BuildPlan) -> Result<BuildReport> {
        let mut state = self.state.lock().unwrap();
        state.builds += 1;

        let hash = state.current()?.info.hash.to_string();
        if state.failing_builds.contains(&hash) {
            return Err(SizewalkError::BuildFailure {
                step: BuildStep::Build,
                exit_code: 1,
                stderr: format!("{} failed", plan.command),
            });
        }

        let mut output = ok_output("built");
        output.name = BuildStep::Build.name().to_string();
        Ok(BuildReport {
            removed_dependencies: false,
            steps: vec![output],
        })
    }
}

impl ArtifactInspector for FakeWorkspace {
    fn size_of(&self, tree: &WorkingTreeHandle, path: &Path) -> Result<u64> {
        let state = self.state.lock().unwrap();
        let commit = state.current()?;
        if state.missing_artifacts.contains(commit.info.hash.as_str()) {
            return Err(SizewalkError::ArtifactNotFound {
                path: tree.resolve(path),
            });
        }
        Ok(commit.size)
    }
}

// ---------------------------------------------------------------------------
// Recording doubles
// ---------------------------------------------------------------------------

/// Progress reporter that records a compact event log.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressReporter for RecordingProgress {
    fn run_started(&self, branch: &BranchName, commits: &[CommitId]) {
        self.push(format!("run_started:{}:{}", branch, commits.len()));
    }

    fn commit_started(&self, index: usize, total: usize, _commit: &CommitId) {
        self.push(format!("commit_started:{}/{}", index + 1, total));
    }

    fn step_started(&self, _commit: &CommitId, step: EvaluationStep) {
        self.push(format!("step:{step}"));
    }

    fn commit_finished(&self, index: usize, total: usize, _result: &EvaluationResult) {
        self.push(format!("commit_finished:{}/{}", index + 1, total));
    }

    fn restoring(&self, branch: &BranchName) {
        self.push(format!("restoring:{branch}"));
    }

    fn run_finished(&self, run: &EvaluationRun) {
        self.push(format!("run_finished:{}", run.len()));
    }
}

/// Confirmation prompt with a fixed answer; records how many commits it was
/// shown each time.
#[derive(Debug)]
pub struct ScriptedPrompt {
    answer: bool,
    asked: Mutex<Vec<usize>>,
}

impl ScriptedPrompt {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<usize> {
        self.asked.lock().unwrap().clone()
    }
}

impl ConfirmationPrompt for ScriptedPrompt {
    fn confirm(&self, _branch: &BranchName, commits: &[CommitId]) -> Result<bool> {
        self.asked.lock().unwrap().push(commits.len());
        Ok(self.answer)
    }
}

/// Report sink keeping published runs in memory.
#[derive(Debug, Default)]
pub struct MemoryReportSink {
    runs: Mutex<Vec<EvaluationRun>>,
    fail: bool,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose every publish fails with an I/O error.
    pub fn failing() -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn published(&self) -> Vec<EvaluationRun> {
        self.runs.lock().unwrap().clone()
    }
}

impl ReportSink for MemoryReportSink {
    fn publish(&self, run: &EvaluationRun) -> Result<()> {
        if self.fail {
            return Err(SizewalkError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "output directory is read-only",
            )));
        }
        self.runs.lock().unwrap().push(run.clone());
        Ok(())
    }
}
