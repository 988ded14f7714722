use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::evidence::Evidence;

static TASK_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResultError {
    #[error("result of task {0} is already closed")]
    Closed(String),
}

/// Outcome of one task execution: ordered log lines, ordered derived
/// evidence, and a final status set exactly once by [`TaskResult::close`].
#[derive(Debug, Clone)]
pub struct TaskResult {
    task_id: String,
    task_name: String,
    job_name: String,
    request_id: Option<String>,
    start_time: DateTime<Utc>,
    run_time: Option<f64>,
    logs: Vec<String>,
    evidence: Vec<Evidence>,
    status: Option<String>,
    successful: Option<bool>,
    closed: bool,
}

/// Flat, serializable view of a closed result.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub task_name: String,
    pub job_name: String,
    pub request_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub run_time: Option<f64>,
    pub successful: Option<bool>,
    pub status: Option<String>,
    pub logs: Vec<String>,
    pub evidence: Vec<String>,
}

impl TaskResult {
    pub fn new(task_name: impl Into<String>, job_name: impl Into<String>, request_id: Option<String>) -> Self {
        let start_time = Utc::now();
        let seq = TASK_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            task_id: format!("{}_{:06}", start_time.format("%Y%m%dT%H%M%SZ"), seq),
            task_name: task_name.into(),
            job_name: job_name.into(),
            request_id,
            start_time,
            run_time: None,
            logs: Vec::new(),
            evidence: Vec::new(),
            status: None,
            successful: None,
            closed: false,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn successful(&self) -> Option<bool> {
        self.successful
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn log(&mut self, line: impl Into<String>) -> Result<(), ResultError> {
        self.ensure_open()?;
        let line = line.into();
        info!("[{}] {}", self.task_name, line);
        self.logs.push(line);
        Ok(())
    }

    /// Attaches newly discovered evidence, inheriting the source's config.
    pub fn add_evidence(&mut self, mut evidence: Evidence, config: &Map<String, Value>) -> Result<(), ResultError> {
        self.ensure_open()?;
        evidence.config = config.clone();
        self.evidence.push(evidence);
        Ok(())
    }

    pub fn close(&mut self, success: bool, status: impl Into<String>) -> Result<(), ResultError> {
        self.ensure_open()?;
        let status = status.into();
        for evidence in &mut self.evidence {
            if evidence.request_id.is_none() {
                evidence.request_id = self.request_id.clone();
            }
        }
        let elapsed = Utc::now().signed_duration_since(self.start_time);
        self.run_time = Some(elapsed.num_milliseconds() as f64 / 1000.0);
        info!(
            "{} {} ({} evidence): {}",
            self.task_name,
            if success { "succeeded" } else { "failed" },
            self.evidence.len(),
            status
        );
        self.successful = Some(success);
        self.status = Some(status);
        self.closed = true;
        Ok(())
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.task_id.clone(),
            task_name: self.task_name.clone(),
            job_name: self.job_name.clone(),
            request_id: self.request_id.clone(),
            start_time: self.start_time,
            run_time: self.run_time,
            successful: self.successful,
            status: self.status.clone(),
            logs: self.logs.clone(),
            evidence: self.evidence.iter().map(ToString::to_string).collect(),
        }
    }

    fn ensure_open(&self) -> Result<(), ResultError> {
        if self.closed {
            Err(ResultError::Closed(self.task_id.clone()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn close_happens_once() {
        let mut result = TaskResult::new("StringsAsciiTask", "StringsJob", None);
        result.log("first").expect("log");
        result.close(true, "Completed successfully").expect("close");
        assert_eq!(result.successful(), Some(true));
        assert!(result.run_time.is_some());

        assert!(matches!(result.close(false, "again"), Err(ResultError::Closed(_))));
        assert!(result.log("late").is_err());
        assert!(
            result
                .add_evidence(Evidence::text_file("/tmp/x"), &Map::new())
                .is_err()
        );
        assert_eq!(result.logs(), ["first".to_string()]);
        assert_eq!(result.status(), Some("Completed successfully"));
    }

    #[test]
    fn derived_evidence_gets_config_and_request_id() {
        let mut config = Map::new();
        config.insert("globs".to_string(), json!(["*.log"]));
        let mut result = TaskResult::new("T", "J", Some("req-1".to_string()));
        result
            .add_evidence(Evidence::text_file("/tmp/a.ascii"), &config)
            .expect("add");
        result.close(true, "ok").expect("close");

        let derived = &result.evidence()[0];
        assert_eq!(derived.config, config);
        assert_eq!(derived.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn task_ids_are_unique() {
        let a = TaskResult::new("T", "J", None);
        let b = TaskResult::new("T", "J", None);
        assert_ne!(a.task_id(), b.task_id());
    }

    #[test]
    fn summary_serializes() {
        let mut result = TaskResult::new("T", "J", None);
        result.close(false, "boom").expect("close");
        let value = serde_json::to_value(result.summary()).expect("json");
        assert_eq!(value["task_name"], "T");
        assert_eq!(value["successful"], false);
        assert_eq!(value["status"], "boom");
    }
}
