use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{info, warn};

use casefile::evidence::{Evidence, EvidenceRegistry};
use casefile::jobs::JobManager;
use casefile::pipeline::{self, PipelineOptions};
use casefile::processors::ResourceController;
use casefile::processors::command::{CommandRunner, SystemRunner};
use casefile::processors::google_cloud::{CloudDiskProvider, GcloudDisks, NoCloudDisks};
use casefile::workers::TaskContext;
use casefile::{cli, config, logging, util};

fn main() -> Result<()> {
    let cli_opts = cli::parse();
    logging::init_logging(cli_opts.json_logs);

    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let cfg = loaded.config;
    info!("config_hash={}", loaded.config_hash);

    let registry = EvidenceRegistry::with_builtin();
    let mut batch = read_evidence(&registry, &cli_opts.evidence)?;
    if let Some(request_id) = &cli_opts.request_id {
        for evidence in batch.iter_mut().filter(|e| e.request_id.is_none()) {
            evidence.request_id = Some(request_id.clone());
        }
    }

    let mut manager = JobManager::with_builtin();
    for name in &cfg.disabled_jobs {
        if let Err(err) = manager.disable(name) {
            warn!("disabled_jobs: {err}");
        }
    }

    if cli_opts.plan_only {
        let planned = manager.plan(&mut batch, cfg.cloud_context);
        for plan in &planned {
            let line = json!({
                "job": plan.job_name,
                "task": plan.task.name(),
                "evidence": batch[plan.evidence_index].to_string(),
            });
            println!("{line}");
        }
        info!("planned {} tasks", planned.len());
        return Ok(());
    }

    util::ensure_dir(&cfg.output_dir)
        .with_context(|| format!("output dir {}", cfg.output_dir.display()))?;

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let cloud: Arc<dyn CloudDiskProvider> = if cfg.cloud_context {
        Arc::new(GcloudDisks::new(
            runner.clone(),
            cfg.tools.gcloud.as_str(),
            cfg.instance_name.as_str(),
        ))
    } else {
        Arc::new(NoCloudDisks)
    };
    let controller = ResourceController::new(cfg.processor_config(), runner.clone(), cloud);

    let mut ctx = TaskContext::new(cfg.output_dir.clone(), runner);
    ctx.tools = cfg.task_tools();
    ctx.use_sudo = cfg.effective_sudo();

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel_flag.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })
    .context("installing Ctrl+C handler")?;

    let options = PipelineOptions {
        workers: cli_opts.workers,
        max_rounds: cfg.max_rounds,
        cloud_context: cfg.cloud_context,
    };
    info!(
        "starting evidence={} items={} workers={} max_rounds={}",
        cli_opts.evidence.display(),
        batch.len(),
        options.workers,
        options.max_rounds
    );

    let outcome =
        pipeline::run_pipeline_with_cancel(&manager, &controller, &ctx, batch, &options, cancel_flag)?;

    for result in &outcome.results {
        println!("{}", serde_json::to_string(&result.summary())?);
    }
    if outcome.cancelled {
        warn!(
            "run cancelled; {} queued tasks were not started",
            outcome.stats.tasks_skipped
        );
    }
    info!(
        "casefile run finished tasks={} failed={}",
        outcome.stats.tasks_run, outcome.stats.tasks_failed
    );
    Ok(())
}

fn read_evidence(registry: &EvidenceRegistry, path: &std::path::Path) -> Result<Vec<Evidence>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading evidence {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing evidence {}", path.display()))?;
    let envelopes = match value {
        Value::Array(items) => items,
        single => vec![single],
    };
    envelopes
        .iter()
        .enumerate()
        .map(|(index, envelope)| {
            registry
                .decode(envelope)
                .with_context(|| format!("decoding evidence #{index}"))
        })
        .collect()
}
