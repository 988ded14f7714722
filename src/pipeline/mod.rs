//! # Pipeline Module
//!
//! Local dispatcher: plans tasks for a batch of evidence, runs them on a
//! pool of worker threads, and feeds the evidence they derive back in as the
//! next batch.

pub mod workers;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded};
use thiserror::Error;
use tracing::{info, warn};

use crate::evidence::Evidence;
use crate::jobs::JobManager;
use crate::processors::ResourceController;
use crate::workers::{TaskContext, TaskResult};

use workers::WorkItem;

const CHANNEL_CAPACITY_MULTIPLIER: usize = 4;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0} worker thread(s) panicked")]
    WorkerPanicked(usize),
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub workers: usize,
    pub max_rounds: usize,
    /// Whether cloud-only evidence can be preprocessed here.
    pub cloud_context: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            max_rounds: 5,
            cloud_context: false,
        }
    }
}

/// Pipeline statistics collected during a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub rounds: usize,
    pub tasks_planned: u64,
    pub tasks_run: u64,
    pub tasks_failed: u64,
    pub tasks_skipped: u64,
    pub evidence_derived: u64,
}

#[derive(Debug)]
pub struct PipelineOutcome {
    /// Closed results, in plan order within each round.
    pub results: Vec<TaskResult>,
    pub stats: PipelineStats,
    pub cancelled: bool,
}

pub fn run_pipeline(
    manager: &JobManager,
    controller: &ResourceController,
    ctx: &TaskContext,
    batch: Vec<Evidence>,
    options: &PipelineOptions,
) -> Result<PipelineOutcome, PipelineError> {
    run_pipeline_inner(manager, controller, ctx, batch, options, None)
}

/// Run the pipeline with an external cancellation flag (e.g., Ctrl+C).
pub fn run_pipeline_with_cancel(
    manager: &JobManager,
    controller: &ResourceController,
    ctx: &TaskContext,
    batch: Vec<Evidence>,
    options: &PipelineOptions,
    cancel_flag: Arc<AtomicBool>,
) -> Result<PipelineOutcome, PipelineError> {
    run_pipeline_inner(manager, controller, ctx, batch, options, Some(cancel_flag))
}

fn run_pipeline_inner(
    manager: &JobManager,
    controller: &ResourceController,
    ctx: &TaskContext,
    mut batch: Vec<Evidence>,
    options: &PipelineOptions,
    cancel_flag: Option<Arc<AtomicBool>>,
) -> Result<PipelineOutcome, PipelineError> {
    let start_time = Instant::now();
    let is_cancelled = || {
        cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    };

    let mut stats = PipelineStats::default();
    let mut results = Vec::new();
    let mut cancelled = false;

    while !batch.is_empty() {
        if is_cancelled() {
            cancelled = true;
            break;
        }
        if stats.rounds >= options.max_rounds {
            info!(
                "stopping after {} rounds with {} evidence unprocessed",
                stats.rounds,
                batch.len()
            );
            break;
        }
        stats.rounds += 1;

        let planned = manager.plan(&mut batch, options.cloud_context);
        if planned.is_empty() {
            break;
        }
        stats.tasks_planned += planned.len() as u64;
        info!(
            "round={} evidence={} tasks={}",
            stats.rounds,
            batch.len(),
            planned.len()
        );

        let items: Vec<WorkItem> = planned
            .into_iter()
            .enumerate()
            .map(|(seq, plan)| WorkItem {
                seq,
                job_name: plan.job_name,
                task: plan.task,
                evidence: batch[plan.evidence_index].clone(),
            })
            .collect();

        let round = dispatch(items, controller, ctx, options.workers, cancel_flag.clone())?;
        stats.tasks_skipped += round.skipped;
        cancelled |= round.cancelled;

        let mut next_batch = Vec::new();
        for result in &round.results {
            stats.tasks_run += 1;
            if result.successful() == Some(true) {
                next_batch.extend(result.evidence().iter().cloned());
            } else {
                stats.tasks_failed += 1;
            }
        }
        stats.evidence_derived += next_batch.len() as u64;
        results.extend(round.results);
        batch = next_batch;
    }

    info!(
        "pipeline finished rounds={} tasks_run={} failed={} skipped={} derived={} elapsed={:.2}s",
        stats.rounds,
        stats.tasks_run,
        stats.tasks_failed,
        stats.tasks_skipped,
        stats.evidence_derived,
        start_time.elapsed().as_secs_f64()
    );
    Ok(PipelineOutcome {
        results,
        stats,
        cancelled,
    })
}

struct RoundOutcome {
    results: Vec<TaskResult>,
    skipped: u64,
    cancelled: bool,
}

fn dispatch(
    items: Vec<WorkItem>,
    controller: &ResourceController,
    ctx: &TaskContext,
    worker_count: usize,
    cancel_flag: Option<Arc<AtomicBool>>,
) -> Result<RoundOutcome, PipelineError> {
    let capacity = worker_count.max(1).saturating_mul(CHANNEL_CAPACITY_MULTIPLIER);
    let (work_tx, work_rx) = bounded::<WorkItem>(capacity);
    let (result_tx, result_rx) = unbounded();
    let skipped = Arc::new(AtomicU64::new(0));

    let handles = workers::spawn_task_workers(
        worker_count,
        work_rx,
        result_tx,
        controller.clone(),
        ctx.clone(),
        cancel_flag.clone(),
        skipped.clone(),
    );

    let mut cancelled = false;
    let mut items = items.into_iter();
    for item in items.by_ref() {
        if cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            cancelled = true;
            skipped.fetch_add(1, Ordering::Relaxed);
            break;
        }
        if work_tx.send(item).is_err() {
            warn!("all task workers exited early");
            break;
        }
    }
    skipped.fetch_add(items.len() as u64, Ordering::Relaxed);
    drop(work_tx);

    let mut collected: Vec<(usize, TaskResult)> = result_rx.iter().collect();
    let mut panicked = 0;
    for handle in handles {
        if handle.join().is_err() {
            panicked += 1;
        }
    }
    if panicked > 0 {
        return Err(PipelineError::WorkerPanicked(panicked));
    }

    collected.sort_by_key(|(seq, _)| *seq);
    let cancelled = cancelled
        || cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed));
    Ok(RoundOutcome {
        results: collected.into_iter().map(|(_, result)| result).collect(),
        skipped: skipped.load(Ordering::Relaxed),
        cancelled,
    })
}
