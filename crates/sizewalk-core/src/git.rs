//! Git integration: the repository gateway the pipeline drives.
//!
//! All operations act on a [`WorkingTreeHandle`]. Mutating operations take it
//! by `&mut`, so the borrow checker rules out two checkouts in flight against
//! the same tree.

use async_trait::async_trait;
use chrono::DateTime;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::domain::commit::{BranchName, CommitId, CommitInfo};
use crate::domain::error::{Result, SizewalkError};
use crate::exec::{CommandOutput, CommandRunner, CommandSpec};

/// Field separator for `git log` output (ASCII unit separator).
const FIELD_SEP: char = '\u{1f}';

const HEADS_PREFIX: &str = "refs/heads/";

/// The project checkout a run operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingTreeHandle {
    root: PathBuf,
    checked_out: Option<String>,
}

impl WorkingTreeHandle {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            checked_out: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a project-relative path.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Reference most recently checked out through this handle.
    pub fn checked_out(&self) -> Option<&str> {
        self.checked_out.as_deref()
    }

    /// Record a completed checkout. Gateways call this after success.
    pub fn mark_checked_out(&mut self, reference: impl Into<String>) {
        self.checked_out = Some(reference.into());
    }
}

/// Version-control operations needed by the evaluation pipeline.
#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    /// Name of the branch currently checked out.
    async fn current_branch(&self, tree: &WorkingTreeHandle) -> Result<BranchName>;

    /// Commits reachable from HEAD, newest first.
    async fn list_commits(&self, tree: &WorkingTreeHandle) -> Result<Vec<CommitId>>;

    /// Force the tree to match `reference`, discarding local modifications.
    async fn checkout(&self, tree: &mut WorkingTreeHandle, reference: &str) -> Result<()>;

    /// Check `branch` out again so HEAD is attached to it.
    async fn restore(&self, tree: &mut WorkingTreeHandle, branch: &BranchName) -> Result<()> {
        self.checkout(tree, branch.as_str()).await
    }

    /// Metadata of whatever is checked out.
    async fn commit_info(&self, tree: &WorkingTreeHandle) -> Result<CommitInfo>;
}

/// [`RepositoryGateway`] backed by the `git` command line.
pub struct GitRepository {
    runner: Arc<dyn CommandRunner>,
}

impl GitRepository {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn git(&self, tree: &WorkingTreeHandle, args: &[&str]) -> Result<CommandOutput> {
        let name = format!("git {}", args.first().copied().unwrap_or_default());
        let spec = CommandSpec::direct(name, "git", args.iter().copied(), tree.root());

        match self.runner.run(&spec).await {
            Err(SizewalkError::Spawn { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Err(SizewalkError::RepositoryState(
                    "git executable not found on PATH".to_string(),
                ))
            }
            other => other,
        }
    }

    /// Full ref HEAD points at (`refs/heads/...`), `None` when detached.
    async fn symbolic_head(&self, tree: &WorkingTreeHandle) -> Result<Option<String>> {
        let output = self.git(tree, &["symbolic-ref", "-q", "HEAD"]).await?;

        match output.exit_code {
            0 => Ok(Some(output.stdout.trim().to_string())),
            1 => Ok(None),
            _ => Err(SizewalkError::RepositoryState(format!(
                "{} is not a git checkout: {}",
                tree.root().display(),
                output.stderr.trim()
            ))),
        }
    }
}

/// Branch name of a `refs/heads/...` ref. Kept whole rather than the
/// shortest unambiguous form, which git prefixes with `heads/` when a tag
/// shares the name.
fn branch_from_refname(refname: &str) -> Result<BranchName> {
    match refname.strip_prefix(HEADS_PREFIX) {
        Some(name) if !name.is_empty() => Ok(BranchName::new(name)),
        _ => Err(SizewalkError::RepositoryState(format!(
            "HEAD points at {refname:?}, which is not a local branch"
        ))),
    }
}

#[async_trait]
impl RepositoryGateway for GitRepository {
    async fn current_branch(&self, tree: &WorkingTreeHandle) -> Result<BranchName> {
        match self.symbolic_head(tree).await? {
            Some(refname) => branch_from_refname(&refname),
            None => Err(SizewalkError::RepositoryState(
                "HEAD is detached; check out a branch so it can be restored afterwards"
                    .to_string(),
            )),
        }
    }

    async fn list_commits(&self, tree: &WorkingTreeHandle) -> Result<Vec<CommitId>> {
        let output = self.git(tree, &["rev-list", "HEAD"]).await?;

        if !output.passed() {
            return Err(SizewalkError::RepositoryState(format!(
                "git rev-list HEAD failed: {}",
                output.stderr.trim()
            )));
        }

        let commits: Vec<CommitId> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(CommitId::new)
            .collect();

        debug!(count = commits.len(), "Listed commits");
        Ok(commits)
    }

    async fn checkout(&self, tree: &mut WorkingTreeHandle, reference: &str) -> Result<()> {
        let output = self
            .git(tree, &["checkout", "--force", "--quiet", reference])
            .await?;

        if !output.passed() {
            return Err(SizewalkError::Checkout {
                reference: reference.to_string(),
                message: output.stderr.trim().to_string(),
            });
        }

        tree.mark_checked_out(reference);
        debug!(reference, "Checked out");
        Ok(())
    }

    async fn restore(&self, tree: &mut WorkingTreeHandle, branch: &BranchName) -> Result<()> {
        self.checkout(tree, branch.as_str()).await?;

        // A tag or remote ref with the same name could win over the branch.
        let expected = format!("{HEADS_PREFIX}{branch}");
        match self.symbolic_head(tree).await? {
            Some(refname) if refname == expected => Ok(()),
            other => Err(SizewalkError::Checkout {
                reference: branch.to_string(),
                message: format!(
                    "HEAD is {} instead of {expected}",
                    other.as_deref().unwrap_or("detached")
                ),
            }),
        }
    }

    async fn commit_info(&self, tree: &WorkingTreeHandle) -> Result<CommitInfo> {
        let output = self
            .git(tree, &["log", "-1", "--format=%H%x1f%an%x1f%aI%x1f%s"])
            .await?;

        if !output.passed() {
            return Err(SizewalkError::RepositoryState(format!(
                "git log failed: {}",
                output.stderr.trim()
            )));
        }

        parse_commit_info(output.stdout.trim_end_matches(['\r', '\n']))
    }
}

/// Parse one `%H<US>%an<US>%aI<US>%s` record.
fn parse_commit_info(record: &str) -> Result<CommitInfo> {
    let mut fields = record.splitn(4, FIELD_SEP);
    let (Some(hash), Some(author), Some(date), Some(message)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(SizewalkError::RepositoryState(format!(
            "unexpected git log output: {record:?}"
        )));
    };

    let date = DateTime::parse_from_rfc3339(date.trim()).map_err(|e| {
        SizewalkError::RepositoryState(format!("unparseable commit date {date:?}: {e}"))
    })?;

    Ok(CommitInfo {
        hash: CommitId::new(hash.trim()),
        author: author.to_string(),
        date,
        message: message.to_string(),
    })
}
