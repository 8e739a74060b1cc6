//! External command execution.
//!
//! The bundler and shell hooks are spawned through [`CommandExecutor`] so tests
//! can substitute canned process output.

use camino::Utf8PathBuf;
use std::process::{Command, Output};

/// Working directory and extra environment for a spawned command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Directory to run the command in; inherits the current one when `None`.
    pub cwd: Option<Utf8PathBuf>,
    /// Additional environment variables.
    pub env: Vec<(String, String)>,
}

impl RunOptions {
    /// Run in `cwd` with no extra environment.
    #[must_use]
    pub fn in_dir(cwd: impl Into<Utf8PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            env: Vec::new(),
        }
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Abstraction for running external commands.
///
/// Implementations must be shareable across threads because fresh builds run
/// concurrently.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor: Send + Sync {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pilet_publish::command::{CommandExecutor, RunOptions, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("node", &["--version"], &RunOptions::default())?;
    /// assert!(output.status.success());
    /// # Ok::<(), std::io::Error>(())
    /// ```
    fn run<'a>(&self, cmd: &str, args: &[&'a str], options: &RunOptions) -> std::io::Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str], options: &RunOptions) -> std::io::Result<Output> {
        let mut command = Command::new(cmd);
        command.args(args);
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &options.env {
            command.env(key, value);
        }
        command.output()
    }
}

/// Shell program and flag used to run a command line.
#[must_use]
pub const fn shell() -> (&'static str, &'static str) {
    #[cfg(windows)]
    {
        ("cmd", "/C")
    }
    #[cfg(not(windows))]
    {
        ("sh", "-c")
    }
}

/// Pick the most useful diagnostic text from a finished process.
#[must_use]
pub fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_owned()
    } else {
        stderr.trim().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{exit_status, failure_output};

    #[test]
    fn failure_text_prefers_stderr() {
        let output = failure_output("boom\n");
        assert_eq!(failure_text(&output), "boom");
    }

    #[test]
    fn failure_text_falls_back_to_stdout() {
        let output = Output {
            status: exit_status(2),
            stdout: b"  stdout detail ".to_vec(),
            stderr: b"   ".to_vec(),
        };
        assert_eq!(failure_text(&output), "stdout detail");
    }

    #[test]
    fn run_options_collects_environment() {
        let options = RunOptions::in_dir("/tmp/pilet")
            .with_env("PILET_HOOK", "before-build")
            .with_env("PILET_ROOT", "/tmp/pilet");
        assert_eq!(options.cwd, Some(Utf8PathBuf::from("/tmp/pilet")));
        assert_eq!(options.env.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_runs_in_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cwd = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 path");
        let (program, flag) = shell();
        let output = SystemCommandExecutor
            .run(
                program,
                &[flag, "pwd && echo $PILET_MARK"],
                &RunOptions::in_dir(cwd).with_env("PILET_MARK", "marked"),
            )
            .expect("spawn shell");
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("marked"));
    }
}
