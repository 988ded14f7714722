//! External command invocation.
//!
//! Every forensic binary (losetup, mount, strings, de.py, ...) is reached
//! through [`CommandRunner`], so the exit status and stdout are the only
//! contract, and tests can substitute a scripted runner.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("{command} exited with status {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// A program with its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Redirect stdout into this file instead of capturing it.
    pub stdout_path: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdout_path: None,
        }
    }

    /// `program`, run through sudo when `use_sudo` is set.
    pub fn privileged(program: impl Into<String>, use_sudo: bool) -> Self {
        if use_sudo {
            Self::new("sudo").arg(program.into())
        } else {
            Self::new(program)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_path = Some(path.into());
        self
    }

    /// The program actually being run, looking through a sudo prefix.
    pub fn tool(&self) -> &str {
        if self.program == "sudo" {
            self.args.first().map(String::as_str).unwrap_or("sudo")
        } else {
            &self.program
        }
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        if let Some(path) = &self.stdout_path {
            line.push_str(" > ");
            line.push_str(&path.to_string_lossy());
        }
        line
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runs commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let spawn_err = |source| CommandError::Spawn {
            command: spec.command_line(),
            source,
        };

        let mut command = Command::new(&spec.program);
        command.args(&spec.args).stdin(Stdio::null());
        if let Some(path) = &spec.stdout_path {
            let file = File::create(path).map_err(spawn_err)?;
            command.stdout(Stdio::from(file));
        }

        let output = command.output().map_err(spawn_err)?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Runs `spec`, logging the command line, and fails on a non-zero exit.
pub fn check_output(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<Vec<u8>, CommandError> {
    info!("Running: {}", spec.command_line());
    let output = runner.run(spec)?;
    if !output.success() {
        return Err(CommandError::Failed {
            command: spec.command_line(),
            status: output
                .status
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

pub fn check_call(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<(), CommandError> {
    check_output(runner, spec).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privileged_prefixes_sudo() {
        let spec = CommandSpec::privileged("losetup", true).args(["-d", "/dev/loop0"]);
        assert_eq!(spec.command_line(), "sudo losetup -d /dev/loop0");
        assert_eq!(spec.tool(), "losetup");

        let spec = CommandSpec::privileged("losetup", false).arg("-a");
        assert_eq!(spec.command_line(), "losetup -a");
        assert_eq!(spec.tool(), "losetup");
    }

    #[test]
    fn command_line_shows_redirect() {
        let spec = CommandSpec::new("strings")
            .args(["-a", "-t", "d", "/dev/loop1"])
            .stdout_to("/tmp/out/loop1.ascii");
        assert_eq!(
            spec.command_line(),
            "strings -a -t d /dev/loop1 > /tmp/out/loop1.ascii"
        );
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_reports_exit_status() {
        let runner = SystemRunner;
        let ok = check_output(&runner, &CommandSpec::new("sh").args(["-c", "printf hi"]))
            .expect("sh");
        assert_eq!(ok, b"hi");

        let err = check_call(&runner, &CommandSpec::new("sh").args(["-c", "echo bad >&2; exit 3"]))
            .expect_err("exit 3");
        match err {
            CommandError::Failed { status, stderr, .. } => {
                assert_eq!(status, "3");
                assert_eq!(stderr, "bad");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_redirects_stdout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("out.txt");
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo redirected"])
            .stdout_to(&out);
        check_call(&SystemRunner, &spec).expect("run");
        assert_eq!(std::fs::read_to_string(&out).expect("read"), "redirected\n");
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = SystemRunner
            .run(&CommandSpec::new("/nonexistent/casefile-tool"))
            .expect_err("spawn");
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
