//! # Jobs Module
//!
//! A job declares which evidence types it consumes and produces, and turns
//! matching evidence into tasks. The [`JobManager`] matches a batch of
//! evidence against every enabled job and records which job claimed what.

pub mod docker;
pub mod strings;
pub mod tomcat;

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::evidence::{Evidence, EvidenceType};
use crate::workers::Task;

pub use docker::DockerContainersEnumerationJob;
pub use strings::StringsJob;
pub use tomcat::{TomcatAnalysisJob, TomcatExtractionJob};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("job {0} is already registered")]
    Duplicate(String),
    #[error("unknown job {0}")]
    Unknown(String),
}

pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    fn evidence_input(&self) -> &[EvidenceType];

    fn evidence_output(&self) -> &[EvidenceType];

    /// Tasks for `evidence`, one per item unless the job filters. Must not
    /// mutate the evidence.
    fn create_tasks(&self, evidence: &[Evidence]) -> Vec<Box<dyn Task>>;

    fn accepts(&self, evidence: &Evidence) -> bool {
        self.evidence_input().contains(&evidence.evidence_type())
    }
}

/// One task ready to run, with the batch position of its evidence.
pub struct PlannedTask {
    pub job_name: String,
    pub evidence_index: usize,
    pub task: Box<dyn Task>,
}

impl std::fmt::Debug for PlannedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedTask")
            .field("job_name", &self.job_name)
            .field("evidence_index", &self.evidence_index)
            .field("task", &self.task.name())
            .finish()
    }
}

#[derive(Default)]
pub struct JobManager {
    jobs: Vec<Box<dyn Job>>,
    disabled: HashSet<String>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        let jobs: Vec<Box<dyn Job>> = vec![
            Box::new(DockerContainersEnumerationJob),
            Box::new(StringsJob),
            Box::new(TomcatExtractionJob),
            Box::new(TomcatAnalysisJob),
        ];
        Self {
            jobs,
            disabled: HashSet::new(),
        }
    }

    pub fn register(&mut self, job: Box<dyn Job>) -> Result<(), JobError> {
        if self.jobs.iter().any(|existing| existing.name() == job.name()) {
            return Err(JobError::Duplicate(job.name().to_string()));
        }
        self.jobs.push(job);
        Ok(())
    }

    pub fn disable(&mut self, name: &str) -> Result<(), JobError> {
        if !self.jobs.iter().any(|job| job.name() == name) {
            return Err(JobError::Unknown(name.to_string()));
        }
        self.disabled.insert(name.to_string());
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name()).collect()
    }

    fn is_enabled(&self, job: &dyn Job) -> bool {
        !self.disabled.contains(job.name())
    }

    /// Enabled jobs whose input set contains the evidence's type.
    pub fn matching_jobs(&self, evidence: &Evidence) -> Vec<&dyn Job> {
        self.jobs
            .iter()
            .map(|job| job.as_ref())
            .filter(|job| self.is_enabled(*job) && job.accepts(evidence))
            .collect()
    }

    /// Tasks for every (evidence, job) pair not seen before.
    ///
    /// Cloud-only evidence is skipped outside a cloud context. Each job that
    /// produced tasks for an evidence is appended to its `processed_by`, so
    /// planning the same batch again yields nothing.
    pub fn plan(&self, batch: &mut [Evidence], cloud_context: bool) -> Vec<PlannedTask> {
        let mut planned = Vec::new();
        for (evidence_index, evidence) in batch.iter_mut().enumerate() {
            if evidence.cloud_only() && !cloud_context {
                debug!("Skipping cloud-only {evidence} outside a cloud context");
                continue;
            }
            for job in self.matching_jobs(evidence) {
                if evidence.processed_by().iter().any(|name| name == job.name()) {
                    debug!("{} already processed {evidence}", job.name());
                    continue;
                }
                let tasks = job.create_tasks(std::slice::from_ref(evidence));
                if tasks.is_empty() {
                    debug!("{} created no tasks for {evidence}", job.name());
                    continue;
                }
                evidence.mark_processed_by(job.name());
                planned.extend(tasks.into_iter().map(|task| PlannedTask {
                    job_name: job.name().to_string(),
                    evidence_index,
                    task,
                }));
            }
        }
        planned
    }
}
