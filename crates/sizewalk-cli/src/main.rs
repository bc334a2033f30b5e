//! sizewalk - artifact size across git history
//!
//! Checks out the most recent commits of a project one at a time,
//! reinstalls dependencies, runs the build and records the size of the
//! produced artifact. The original branch is checked out again afterwards
//! and the results are written to `output.json` and `report.html`.

use anyhow::{Context, Result};
use bytesize::ByteSize;
use clap::Parser;
use sizewalk_core::{
    init_tracing, AssumeYes, BranchName, CommitId, ConfirmationPrompt, EvaluationPipeline,
    EvaluationRequest, EvaluationResult, EvaluationRun, EvaluationStep, ProcessRunner,
    ProgressReporter, RunConfig, RunOutcome, RunSummary, WorkingTreeHandle,
    DEFAULT_COMMIT_LIMIT, DEFAULT_DEPENDENCY_DIR, DEFAULT_INSTALL_COMMAND, HTML_REPORT_FILE,
    JSON_REPORT_FILE,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "sizewalk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Measure a build artifact across recent git commits", long_about = None)]
struct Cli {
    /// Artifact to measure, relative to the project directory
    #[arg(long, env = "SIZEWALK_ZIP_PATH")]
    zip_path: PathBuf,

    /// Shell command that produces the artifact
    #[arg(long, env = "SIZEWALK_BUILD_COMMAND")]
    build_command: String,

    /// Git checkout to evaluate (its working tree is modified!)
    #[arg(long, env = "SIZEWALK_PROJECT_DIR")]
    project_dir: PathBuf,

    /// Directory receiving output.json and report.html
    #[arg(long, env = "SIZEWALK_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Number of most recent commits to evaluate (0 = all)
    #[arg(short = 'n', long = "commits", env = "SIZEWALK_COMMITS", default_value_t = DEFAULT_COMMIT_LIMIT)]
    commits: usize,

    /// Stream install/build output and enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Command that installs dependencies before each build
    #[arg(long, env = "SIZEWALK_INSTALL_COMMAND", default_value = DEFAULT_INSTALL_COMMAND)]
    install_command: String,

    /// Skip the install step
    #[arg(long)]
    no_install: bool,

    /// Dependency directory removed before each install
    #[arg(long, env = "SIZEWALK_DEPENDENCY_DIR", default_value = DEFAULT_DEPENDENCY_DIR)]
    dependency_dir: PathBuf,

    /// Do not ask for confirmation
    #[arg(short = 'y', long)]
    yes: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// HTML template replacing the bundled report page
    #[arg(long, env = "SIZEWALK_TEMPLATE")]
    template: Option<PathBuf>,

    /// Kill any install or build command running longer than this
    #[arg(long, env = "SIZEWALK_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
}

impl Cli {
    fn to_config(&self) -> RunConfig {
        RunConfig {
            zip_path: self.zip_path.clone(),
            build_command: self.build_command.clone(),
            project_dir: self.project_dir.clone(),
            output_dir: self.output_dir.clone(),
            commit_limit: self.commits,
            verbose: self.verbose,
            install_command: (!self.no_install).then(|| self.install_command.clone()),
            dependency_dir: Some(self.dependency_dir.clone()),
            timeout_secs: self.timeout_secs,
            template_path: self.template.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    cmd_run(&cli).await
}

async fn cmd_run(cli: &Cli) -> Result<()> {
    let config = cli.to_config();
    config.validate().context("Invalid configuration")?;

    let prompt: Arc<dyn ConfirmationPrompt> = if cli.yes {
        Arc::new(AssumeYes)
    } else {
        Arc::new(StdinPrompt)
    };
    let pipeline = EvaluationPipeline::from_config(&config, Arc::new(ProcessRunner))
        .context("Failed to load report template")?
        .with_progress(Arc::new(ConsoleProgress))
        .with_prompt(prompt);

    info!(project = ?config.project_dir, limit = config.commit_limit, "Starting sizewalk run");

    let mut tree = WorkingTreeHandle::open(&config.project_dir);
    let request = EvaluationRequest::from_config(&config);

    match pipeline.run(&mut tree, &request).await {
        Ok(RunOutcome::Completed(run)) => {
            println!();
            println!("{}", report_lines(&config.output_dir));
            print_summary(&run.summary());
            Ok(())
        }
        Ok(RunOutcome::Declined { branch, .. }) => {
            println!("Aborted. Branch '{}' was left untouched.", branch);
            Ok(())
        }
        Err(failure) => {
            let evaluated = failure.evaluated();
            let state = failure.state;
            Err(anyhow::Error::new(failure.error).context(format!(
                "Run aborted during {} ({} commit(s) evaluated, no report written)",
                state, evaluated
            )))
        }
    }
}

fn report_lines(output_dir: &Path) -> String {
    format!(
        "Report: {}\n        {}",
        output_dir.join(JSON_REPORT_FILE).display(),
        output_dir.join(HTML_REPORT_FILE).display()
    )
}

fn print_summary(summary: &RunSummary) {
    println!("Evaluated: {} commit(s)", summary.evaluated);
    if let Some(smallest) = &summary.smallest {
        println!(
            "Smallest:  {} ({})",
            ByteSize(smallest.size),
            smallest.hash.short()
        );
    }
    if let Some(largest) = &summary.largest {
        println!("Largest:   {} ({})", ByteSize(largest.size), largest.hash.short());
    }
    if let Some(delta) = summary.delta_bytes {
        println!("Change:    {} (oldest to newest)", format_delta(delta));
    }
}

/// Signed human-readable size difference.
fn format_delta(delta: i128) -> String {
    let magnitude = ByteSize(u64::try_from(delta.unsigned_abs()).unwrap_or(u64::MAX));
    match delta.signum() {
        1 => format!("+{}", magnitude),
        -1 => format!("-{}", magnitude),
        _ => "no change".to_string(),
    }
}

/// Prints progress lines to stdout.
struct ConsoleProgress;

impl ProgressReporter for ConsoleProgress {
    fn run_started(&self, branch: &BranchName, commits: &[CommitId]) {
        println!(
            "Evaluating {} commit(s) from branch '{}'",
            commits.len(),
            branch
        );
    }

    fn commit_started(&self, index: usize, total: usize, commit: &CommitId) {
        println!("[{}/{}] {}", index + 1, total, commit.short());
    }

    fn step_started(&self, _commit: &CommitId, step: EvaluationStep) {
        println!("  {}", step);
    }

    fn commit_finished(&self, _index: usize, _total: usize, result: &EvaluationResult) {
        println!(
            "  {} - {}",
            ByteSize(result.build_size),
            result.commit.message
        );
    }

    fn restoring(&self, branch: &BranchName) {
        println!("Checking out '{}' again", branch);
    }

    fn run_finished(&self, run: &EvaluationRun) {
        println!("Done: {} commit(s) measured", run.len());
    }
}

/// Asks on stdin before the first checkout. End of input declines.
struct StdinPrompt;

impl ConfirmationPrompt for StdinPrompt {
    fn confirm(
        &self,
        branch: &BranchName,
        commits: &[CommitId],
    ) -> sizewalk_core::Result<bool> {
        println!(
            "About to check out {} commit(s) of branch '{}':",
            commits.len(),
            branch
        );
        for commit in commits {
            println!("  {}", commit.short());
        }
        println!("Uncommitted changes in the project directory will be discarded.");
        print!("Continue? [y/N] ");
        io::stdout().flush()?;

        let mut answer = String::new();
        let read = io::stdin().lock().read_line(&mut answer)?;
        Ok(read > 0 && parse_answer(&answer))
    }
}

fn parse_answer(answer: &str) -> bool {
    matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    )
}
