//! # Workers Module
//!
//! Tasks: units of work that run one external tool over one preprocessed
//! evidence and report into a [`TaskResult`].

pub mod artifact;
pub mod docker;
pub mod result;
pub mod strings;
pub mod tomcat;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::evidence::Evidence;
use crate::processors::command::{CommandError, CommandRunner, CommandSpec, check_call};
use crate::processors::{AcquireError, ResourceController};
use crate::util;

pub use result::{ResultError, TaskResult, TaskSummary};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("evidence {0} is not mounted")]
    NotMounted(String),
    #[error("evidence {0} has no device path")]
    MissingDevicePath(String),
    #[error("evidence {0} has no local path")]
    MissingLocalPath(String),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("could not parse output of {command}: {reason}")]
    InvalidOutput { command: String, reason: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Result(#[from] ResultError),
}

/// Programs tasks shell out to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTools {
    pub strings: String,
    pub docker_explorer: String,
    pub image_export: String,
}

impl Default for TaskTools {
    fn default() -> Self {
        Self {
            strings: "strings".to_string(),
            docker_explorer: "de.py".to_string(),
            image_export: "image_export.py".to_string(),
        }
    }
}

/// What a task may touch while running.
#[derive(Clone)]
pub struct TaskContext {
    pub output_dir: PathBuf,
    pub runner: Arc<dyn CommandRunner>,
    pub tools: TaskTools,
    pub use_sudo: bool,
}

impl TaskContext {
    pub fn new(output_dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            output_dir: output_dir.into(),
            runner,
            tools: TaskTools::default(),
            use_sudo: false,
        }
    }

    /// Context with a fresh output directory of its own for one task.
    pub fn for_task(&self, task_name: &str) -> Result<TaskContext, TaskError> {
        let output_dir = util::unique_dir(&self.output_dir, &format!("{task_name}-")).map_err(|source| {
            TaskError::Io {
                context: format!("creating output dir under {}", self.output_dir.display()),
                source,
            }
        })?;
        Ok(TaskContext {
            output_dir,
            ..self.clone()
        })
    }

    pub fn privileged(&self, program: &str) -> CommandSpec {
        CommandSpec::privileged(program, self.use_sudo)
    }

    /// Runs `spec` and, on success, attaches every `new_evidence` whose
    /// `local_path` points at a non-empty file.
    pub fn execute(
        &self,
        spec: &CommandSpec,
        result: &mut TaskResult,
        new_evidence: Vec<Evidence>,
        config: &Map<String, Value>,
    ) -> Result<String, TaskError> {
        result.log(format!("Running {}", spec.command_line()))?;
        check_call(self.runner.as_ref(), spec)?;
        for evidence in new_evidence {
            match evidence.local_path.as_deref() {
                Some(path) if util::has_content(path) => result.add_evidence(evidence, config)?,
                _ => result.log(format!("Skipping empty or missing output {evidence}"))?,
            }
        }
        Ok("Completed successfully".to_string())
    }
}

/// A unit of work over one evidence item.
pub trait Task: Send {
    fn name(&self) -> &str;

    /// Runs over already preprocessed evidence. The returned string is the
    /// success status; the caller closes the result.
    fn run(&self, evidence: &Evidence, ctx: &TaskContext, result: &mut TaskResult) -> Result<String, TaskError>;
}

/// Preprocess, run, postprocess and close, in that order.
///
/// A preprocess failure fails the task without running it. Release
/// failures are appended to the logs and marked in the status, but never
/// change the task's success flag.
pub fn run_task(
    task: &dyn Task,
    evidence: &mut Evidence,
    job_name: &str,
    controller: &ResourceController,
    ctx: &TaskContext,
) -> TaskResult {
    let mut result = TaskResult::new(task.name(), job_name, evidence.request_id.clone());
    if let Err(err) = controller.preprocess(evidence) {
        close(&mut result, false, preprocess_status(&err));
        return result;
    }

    let outcome = run_in_own_dir(task, evidence, ctx, &mut result);
    let report = controller.postprocess(evidence);

    for release_err in report.errors() {
        if let Err(err) = result.log(format!("Release warning: {release_err}")) {
            warn!("{err}");
        }
    }

    let (success, mut status) = match outcome {
        Ok(status) => (true, status),
        Err(err) => (false, format!("{} failed: {err}", task.name())),
    };
    if !report.is_clean() {
        status.push_str(" (teardown incomplete)");
    }
    close(&mut result, success, status);
    result
}

/// Runs a task over evidence the caller has already preprocessed.
pub fn run_preprocessed(task: &dyn Task, evidence: &Evidence, job_name: &str, ctx: &TaskContext) -> TaskResult {
    let mut result = TaskResult::new(task.name(), job_name, evidence.request_id.clone());
    let (success, status) = match run_in_own_dir(task, evidence, ctx, &mut result) {
        Ok(status) => (true, status),
        Err(err) => (false, format!("{} failed: {err}", task.name())),
    };
    close(&mut result, success, status);
    result
}

fn run_in_own_dir(
    task: &dyn Task,
    evidence: &Evidence,
    ctx: &TaskContext,
    result: &mut TaskResult,
) -> Result<String, TaskError> {
    let task_ctx = ctx.for_task(task.name())?;
    task.run(evidence, &task_ctx, result)
}

fn preprocess_status(err: &AcquireError) -> String {
    format!("Preprocessing failed: {err}")
}

fn close(result: &mut TaskResult, success: bool, status: String) {
    if let Err(err) = result.close(success, status) {
        warn!("{err}");
    }
}

pub(crate) fn mount_root<'a>(evidence: &'a Evidence) -> Result<&'a Path, TaskError> {
    evidence
        .mount_path()
        .ok_or_else(|| TaskError::NotMounted(evidence.to_string()))
}
