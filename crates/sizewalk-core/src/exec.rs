//! Typed subprocess execution.
//!
//! Every external program sizewalk touches (git, the install step, the build
//! command) goes through [`CommandRunner`], which returns a structured
//! [`CommandOutput`] instead of raw process handles.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use crate::domain::error::{Result, SizewalkError};

/// How a command is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Executable plus arguments, no shell involved.
    Direct { program: String, args: Vec<String> },

    /// Command line handed verbatim to the platform shell.
    Shell(String),
}

/// A command to run inside a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Short label used in logs and results.
    pub name: String,

    pub invocation: Invocation,

    /// Directory the process starts in.
    pub cwd: PathBuf,

    /// Inherit the terminal's stdout/stderr instead of capturing.
    pub stream_output: bool,

    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn direct<I, S>(
        name: impl Into<String>,
        program: impl Into<String>,
        args: I,
        cwd: impl Into<PathBuf>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            invocation: Invocation::Direct {
                program: program.into(),
                args: args.into_iter().map(Into::into).collect(),
            },
            cwd: cwd.into(),
            stream_output: false,
            timeout: None,
        }
    }

    pub fn shell(
        name: impl Into<String>,
        line: impl Into<String>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            invocation: Invocation::Shell(line.into()),
            cwd: cwd.into(),
            stream_output: false,
            timeout: None,
        }
    }

    pub fn streaming(mut self, stream_output: bool) -> Self {
        self.stream_output = stream_output;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human-readable command line.
    pub fn command_line(&self) -> String {
        match &self.invocation {
            Invocation::Direct { program, args } if args.is_empty() => program.clone(),
            Invocation::Direct { program, args } => format!("{} {}", program, args.join(" ")),
            Invocation::Shell(line) => line.clone(),
        }
    }
}

/// Result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Label copied from the spec.
    pub name: String,

    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout; empty when streamed.
    pub stdout: String,

    /// Captured stderr; empty when streamed.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the process reported success.
    pub success: bool,
}

impl CommandOutput {
    /// Whether this command passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// Executes commands on behalf of the repository gateway and build runner.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion.
    ///
    /// A non-zero exit is not an error here; callers decide what a failed
    /// command means. Errors are reserved for commands that could not be
    /// started or did not finish in time.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let start = Instant::now();

        let mut command = match &spec.invocation {
            Invocation::Direct { program, args } => {
                let mut command = Command::new(program);
                command.args(args);
                command
            }
            Invocation::Shell(line) => shell_command(line),
        };

        command
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if spec.stream_output {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        if spec.timeout.is_some() {
            isolate_process_group(&mut command);
        }

        debug!(
            command = %spec.command_line(),
            cwd = %spec.cwd.display(),
            "Spawning command"
        );

        let child = command.spawn().map_err(|source| SizewalkError::Spawn {
            command: spec.command_line(),
            source,
        })?;

        let pid = child.id();

        let output = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    if let Some(pid) = pid {
                        kill_process_group(pid);
                    }
                    return Err(SizewalkError::Timeout {
                        command: spec.command_line(),
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);

        debug!(
            command = %spec.command_line(),
            exit_code,
            duration_ms,
            "Command finished"
        );

        Ok(CommandOutput {
            name: spec.name.clone(),
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            success: output.status.success(),
        })
    }
}

/// Start the child as leader of a new process group, so a timeout can stop
/// everything it started. Untimed commands stay in the terminal's group and
/// keep receiving Ctrl-C.
#[cfg(unix)]
fn isolate_process_group(command: &mut Command) {
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_command: &mut Command) {}

/// SIGKILL every process in the group led by `pgid`.
#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg takes no pointers; it only signals the group.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        debug!(
            pgid,
            error = %std::io::Error::last_os_error(),
            "Process group already gone"
        );
    }
}

/// Descendants of a timed-out command are not tracked here; only the
/// direct child is killed (on drop).
#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_passed() {
        let output = CommandOutput {
            name: "build".to_string(),
            exit_code: 0,
            stdout: "".to_string(),
            stderr: "".to_string(),
            duration_ms: 100,
            success: true,
        };
        assert!(output.passed());
    }

    #[test]
    fn test_command_output_failed() {
        let output = CommandOutput {
            name: "build".to_string(),
            exit_code: 1,
            stdout: "".to_string(),
            stderr: "error".to_string(),
            duration_ms: 100,
            success: false,
        };
        assert!(!output.passed());
    }

    #[test]
    fn test_command_line_rendering() {
        let direct = CommandSpec::direct("git", "git", ["rev-list", "HEAD"], ".");
        assert_eq!(direct.command_line(), "git rev-list HEAD");

        let bare = CommandSpec::direct("ls", "ls", Vec::<String>::new(), ".");
        assert_eq!(bare.command_line(), "ls");

        let shell = CommandSpec::shell("build", "npm run build && zip -r a.zip dist", ".");
        assert_eq!(shell.command_line(), "npm run build && zip -r a.zip dist");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_simple_command() {
        let spec = CommandSpec::direct("echo", "echo", ["hello"], ".");
        let output = ProcessRunner.run(&spec).await.expect("execute failed");
        assert!(output.passed());
        assert!(output.stdout.contains("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_failing_command() {
        let spec = CommandSpec::direct("false", "false", Vec::<String>::new(), ".");
        let output = ProcessRunner.run(&spec).await.expect("execute failed");
        assert!(!output.success);
        assert_ne!(output.exit_code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_line_runs_verbatim() {
        let spec = CommandSpec::shell("shell", "echo one && echo two >&2 && exit 3", ".");
        let output = ProcessRunner.run(&spec).await.expect("execute failed");
        assert_eq!(output.exit_code, 3);
        assert!(output.stdout.contains("one"));
        assert!(output.stderr.contains("two"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_runs_in_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::shell("touch", "touch marker", dir.path());
        ProcessRunner.run(&spec).await.expect("execute failed");
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let spec = CommandSpec::direct(
            "missing",
            "sizewalk-no-such-program",
            Vec::<String>::new(),
            ".",
        );
        let err = ProcessRunner.run(&spec).await.unwrap_err();
        match err {
            SizewalkError::Spawn { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound)
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_stops_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::shell("build", "sh -c 'sleep 1; touch late'", dir.path())
            .with_timeout(Some(Duration::from_millis(200)));

        let err = ProcessRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, SizewalkError::Timeout { .. }));

        tokio::time::sleep(Duration::from_millis(1800)).await;
        assert!(
            !dir.path().join("late").exists(),
            "nested command kept running after the timeout"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_command_that_finishes_in_time() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::shell("build", "sh -c 'touch done'", dir.path())
            .with_timeout(Some(Duration::from_secs(10)));

        let output = ProcessRunner.run(&spec).await.expect("execute failed");
        assert!(output.passed());
        assert!(dir.path().join("done").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_expires() {
        let spec = CommandSpec::shell("sleep", "sleep 5", ".")
            .with_timeout(Some(Duration::from_millis(100)));
        let err = ProcessRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, SizewalkError::Timeout { .. }));
    }
}
