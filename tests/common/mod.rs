//! Shared test infrastructure.
//!
//! [`ScriptedRunner`] stands in for the host: it records every command line
//! in a journal and answers with canned replies, so lifecycle and task tests
//! run without root, loop devices or forensic tools installed.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use casefile::processors::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use casefile::processors::google_cloud::{CloudDiskId, CloudDiskProvider, CloudError};
use casefile::processors::{ProcessorConfig, ResourceController};
use casefile::workers::TaskContext;

type Effect = Box<dyn Fn(&CommandSpec) + Send + Sync>;

struct Rule {
    tool: String,
    arg: Option<String>,
    status: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    effect: Option<Effect>,
}

/// Command runner replaying scripted replies.
///
/// Rules are matched in insertion order on the tool name (looking through
/// `sudo`) and optionally on one argument. Unmatched commands succeed with
/// empty output. When a command redirects stdout, a successful reply's
/// stdout is written to that file.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    journal: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, tool: &str, status: i32, stdout: &str) -> Self {
        self.push(tool, None, status, stdout, None);
        self
    }

    pub fn reply_to_arg(mut self, tool: &str, arg: &str, status: i32, stdout: &str) -> Self {
        self.push(tool, Some(arg), status, stdout, None);
        self
    }

    pub fn on_call<F>(mut self, tool: &str, effect: F) -> Self
    where
        F: Fn(&CommandSpec) + Send + Sync + 'static,
    {
        self.push(tool, None, 0, "", Some(Box::new(effect)));
        self
    }

    fn push(&mut self, tool: &str, arg: Option<&str>, status: i32, stdout: &str, effect: Option<Effect>) {
        self.rules.push(Rule {
            tool: tool.to_string(),
            arg: arg.map(str::to_string),
            status,
            stdout: stdout.as_bytes().to_vec(),
            stderr: if status == 0 {
                Vec::new()
            } else {
                format!("{tool} failed").into_bytes()
            },
            effect,
        });
    }

    /// Appends a line to the journal, for fakes sharing it.
    pub fn note(&self, line: impl Into<String>) {
        self.journal.lock().expect("journal").push(line.into());
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().expect("journal").clone()
    }

    pub fn calls_to(&self, tool: &str) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter(|line| line.split_whitespace().next() == Some(tool))
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.note(spec.command_line());
        let rule = self.rules.iter().find(|rule| {
            rule.tool == spec.tool()
                && rule
                    .arg
                    .as_ref()
                    .is_none_or(|arg| spec.args.iter().any(|a| a == arg))
        });
        let Some(rule) = rule else {
            return Ok(CommandOutput {
                status: Some(0),
                ..CommandOutput::default()
            });
        };
        if let Some(effect) = &rule.effect {
            effect(spec);
        }
        if rule.status == 0 {
            if let Some(path) = &spec.stdout_path {
                std::fs::write(path, &rule.stdout).map_err(|source| CommandError::Spawn {
                    command: spec.command_line(),
                    source,
                })?;
                return Ok(CommandOutput {
                    status: Some(0),
                    ..CommandOutput::default()
                });
            }
        }
        Ok(CommandOutput {
            status: Some(rule.status),
            stdout: rule.stdout.clone(),
            stderr: rule.stderr.clone(),
        })
    }
}

/// Cloud provider that "attaches" by name and logs into the runner journal.
pub struct FakeCloud {
    pub runner: Arc<ScriptedRunner>,
    pub fail_attach: bool,
}

impl FakeCloud {
    pub fn new(runner: Arc<ScriptedRunner>) -> Self {
        Self {
            runner,
            fail_attach: false,
        }
    }
}

impl CloudDiskProvider for FakeCloud {
    fn attach(&self, disk: &CloudDiskId) -> Result<PathBuf, CloudError> {
        self.runner.note(format!("attach {}", disk.disk_name));
        if self.fail_attach {
            return Err(CloudError::Unavailable);
        }
        Ok(PathBuf::from(format!("/dev/disk/by-id/google-{}", disk.disk_name)))
    }

    fn detach(&self, disk: &CloudDiskId, _device: &Path) -> Result<(), CloudError> {
        self.runner.note(format!("detach {}", disk.disk_name));
        Ok(())
    }
}

pub fn processor_config(mount_root: &Path) -> ProcessorConfig {
    ProcessorConfig {
        mount_dir_prefix: mount_root.to_path_buf(),
        ..ProcessorConfig::default()
    }
}

pub fn controller(mount_root: &Path, runner: &Arc<ScriptedRunner>) -> ResourceController {
    ResourceController::new(
        processor_config(mount_root),
        runner.clone(),
        Arc::new(FakeCloud::new(runner.clone())),
    )
}

pub fn task_context(output_dir: &Path, runner: &Arc<ScriptedRunner>) -> TaskContext {
    TaskContext::new(output_dir, runner.clone())
}

/// Entries directly under `dir`.
pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|rd| rd.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}
