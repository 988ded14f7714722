//! # Pipeline Workers
//!
//! Worker threads that run planned tasks end to end.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info};

use crate::evidence::Evidence;
use crate::processors::ResourceController;
use crate::workers::{self, Task, TaskContext, TaskResult};

/// A task paired with its own copy of the evidence it runs over.
pub struct WorkItem {
    pub seq: usize,
    pub job_name: String,
    pub task: Box<dyn Task>,
    pub evidence: Evidence,
}

/// Spawn task worker threads.
///
/// Items still queued once `cancel_flag` is set are dropped without being
/// preprocessed. A task that already started always runs its postprocess.
pub fn spawn_task_workers(
    workers: usize,
    rx: Receiver<WorkItem>,
    result_tx: Sender<(usize, TaskResult)>,
    controller: ResourceController,
    ctx: TaskContext,
    cancel_flag: Option<Arc<AtomicBool>>,
    skipped: Arc<AtomicU64>,
) -> Vec<thread::JoinHandle<()>> {
    let mut handles = Vec::new();
    let worker_count = workers.max(1);

    for worker_id in 0..worker_count {
        let rx = rx.clone();
        let result_tx = result_tx.clone();
        let controller = controller.clone();
        let ctx = ctx.clone();
        let cancel_flag = cancel_flag.clone();
        let skipped = skipped.clone();

        handles.push(thread::spawn(move || {
            for mut item in rx {
                if cancel_flag
                    .as_ref()
                    .is_some_and(|flag| flag.load(Ordering::Relaxed))
                {
                    skipped.fetch_add(1, Ordering::Relaxed);
                    debug!("worker {worker_id}: cancelled, dropping {}", item.task.name());
                    continue;
                }
                info!(
                    "worker {worker_id}: {} ({}) on {}",
                    item.task.name(),
                    item.job_name,
                    item.evidence
                );
                let result = workers::run_task(
                    item.task.as_ref(),
                    &mut item.evidence,
                    &item.job_name,
                    &controller,
                    &ctx,
                );
                if result_tx.send((item.seq, result)).is_err() {
                    break;
                }
            }
        }));
    }

    handles
}
