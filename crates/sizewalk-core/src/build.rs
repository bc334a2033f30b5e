//! Build steps: dependency reset, clean install, build command.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::config::{DEFAULT_DEPENDENCY_DIR, DEFAULT_INSTALL_COMMAND};
use crate::domain::error::{Result, SizewalkError};
use crate::exec::{CommandOutput, CommandRunner, CommandSpec};
use crate::git::WorkingTreeHandle;

/// Steps of a build, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    /// Recursive removal of the dependency directory.
    RemoveDependencies,

    /// Clean dependency install.
    Install,

    /// The caller's build command.
    Build,
}

impl BuildStep {
    /// Get the step name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuildStep::RemoveDependencies => "remove_dependencies",
            BuildStep::Install => "install",
            BuildStep::Build => "build",
        }
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to run for every commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    /// Shell command producing the artifact, run verbatim.
    pub command: String,

    /// Shell command installing dependencies; `None` skips the step.
    pub install_command: Option<String>,

    /// Project-relative directory removed before install.
    pub dependency_dir: Option<PathBuf>,

    /// Stream subprocess output to the terminal.
    pub verbose: bool,

    /// Per-step timeout.
    pub timeout: Option<Duration>,
}

impl BuildPlan {
    /// Plan with the default install command and dependency directory.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            install_command: Some(DEFAULT_INSTALL_COMMAND.to_string()),
            dependency_dir: Some(PathBuf::from(DEFAULT_DEPENDENCY_DIR)),
            verbose: false,
            timeout: None,
        }
    }

    pub fn with_install(mut self, install_command: impl Into<String>) -> Self {
        self.install_command = Some(install_command.into());
        self
    }

    pub fn without_install(mut self) -> Self {
        self.install_command = None;
        self
    }

    pub fn with_dependency_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dependency_dir = dir;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Outputs of the steps a successful build ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Whether a dependency directory existed and was removed.
    pub removed_dependencies: bool,

    /// Install and build outputs, in execution order.
    pub steps: Vec<CommandOutput>,
}

impl BuildReport {
    /// Output of a given step, if it ran.
    pub fn output(&self, step: BuildStep) -> Option<&CommandOutput> {
        self.steps.iter().find(|o| o.name == step.name())
    }

    pub fn duration_ms(&self) -> u64 {
        self.steps.iter().map(|o| o.duration_ms).sum()
    }
}

/// Produces the artifact for whatever is checked out.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Reset dependencies, install, build. Stops at the first failing step.
    async fn build(&self, tree: &mut WorkingTreeHandle, plan: &BuildPlan) -> Result<BuildReport>;
}

/// [`BuildRunner`] running each step as a shell command.
pub struct ShellBuildRunner {
    runner: Arc<dyn CommandRunner>,
}

impl ShellBuildRunner {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn remove_dependencies(&self, tree: &WorkingTreeHandle, plan: &BuildPlan) -> Result<bool> {
        let Some(dir) = &plan.dependency_dir else {
            return Ok(false);
        };

        let path = tree.resolve(dir);
        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), "Removing dependency directory");
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(true)
    }

    async fn run_step(
        &self,
        tree: &WorkingTreeHandle,
        step: BuildStep,
        line: &str,
        plan: &BuildPlan,
    ) -> Result<CommandOutput> {
        info!(step = %step, command = %line, "Running build step");

        let spec = CommandSpec::shell(step.name(), line, tree.root())
            .streaming(plan.verbose)
            .with_timeout(plan.timeout);
        let output = self.runner.run(&spec).await?;

        if !output.passed() {
            return Err(SizewalkError::BuildFailure {
                step,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl BuildRunner for ShellBuildRunner {
    async fn build(&self, tree: &mut WorkingTreeHandle, plan: &BuildPlan) -> Result<BuildReport> {
        let mut report = BuildReport {
            removed_dependencies: self.remove_dependencies(tree, plan).await?,
            steps: Vec::new(),
        };

        if let Some(install) = &plan.install_command {
            let output = self.run_step(tree, BuildStep::Install, install, plan).await?;
            report.steps.push(output);
        }

        let output = self
            .run_step(tree, BuildStep::Build, &plan.command, plan)
            .await?;
        report.steps.push(output);

        Ok(report)
    }
}
