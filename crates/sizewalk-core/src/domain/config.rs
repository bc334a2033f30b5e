//! Validated run configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::error::{Result, SizewalkError};
use crate::build::BuildPlan;

/// Install command used when none is configured.
pub const DEFAULT_INSTALL_COMMAND: &str = "npm install";

/// Dependency directory removed before every install.
pub const DEFAULT_DEPENDENCY_DIR: &str = "node_modules";

/// Number of most recent commits evaluated by default.
pub const DEFAULT_COMMIT_LIMIT: usize = 1;

/// Everything a run needs, independent of how it was supplied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    /// Artifact path, relative to `project_dir`.
    pub zip_path: PathBuf,

    /// Shell command producing the artifact.
    pub build_command: String,

    /// Git checkout the run operates on.
    pub project_dir: PathBuf,

    /// Where `output.json` and `report.html` are written.
    pub output_dir: PathBuf,

    /// Most recent commits to evaluate; 0 evaluates all of them.
    pub commit_limit: usize,

    /// Stream subprocess output instead of capturing it.
    pub verbose: bool,

    /// `None` skips the install step.
    pub install_command: Option<String>,

    /// Removed before install when present.
    pub dependency_dir: Option<PathBuf>,

    /// Per-subprocess timeout in seconds.
    pub timeout_secs: Option<u64>,

    /// Replacement for the bundled HTML template.
    pub template_path: Option<PathBuf>,
}

impl RunConfig {
    pub fn new(
        zip_path: impl Into<PathBuf>,
        build_command: impl Into<String>,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            zip_path: zip_path.into(),
            build_command: build_command.into(),
            project_dir: project_dir.into(),
            output_dir: PathBuf::from("."),
            commit_limit: DEFAULT_COMMIT_LIMIT,
            verbose: false,
            install_command: Some(DEFAULT_INSTALL_COMMAND.to_string()),
            dependency_dir: Some(PathBuf::from(DEFAULT_DEPENDENCY_DIR)),
            timeout_secs: None,
            template_path: None,
        }
    }

    /// Reject configurations that cannot start a run.
    pub fn validate(&self) -> Result<()> {
        if self.build_command.trim().is_empty() {
            return Err(SizewalkError::Configuration(
                "build command must not be empty".to_string(),
            ));
        }
        if self.zip_path.as_os_str().is_empty() {
            return Err(SizewalkError::Configuration(
                "zip path must not be empty".to_string(),
            ));
        }
        if self.zip_path.is_absolute() {
            return Err(SizewalkError::Configuration(format!(
                "zip path {} must be relative to the project directory",
                self.zip_path.display()
            )));
        }
        if !self.project_dir.is_dir() {
            return Err(SizewalkError::Configuration(format!(
                "project directory {} does not exist",
                self.project_dir.display()
            )));
        }
        if matches!(&self.install_command, Some(cmd) if cmd.trim().is_empty()) {
            return Err(SizewalkError::Configuration(
                "install command must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(SizewalkError::Configuration(
                "timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build_plan(&self) -> BuildPlan {
        BuildPlan {
            command: self.build_command.clone(),
            install_command: self.install_command.clone(),
            dependency_dir: self.dependency_dir.clone(),
            verbose: self.verbose,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}
