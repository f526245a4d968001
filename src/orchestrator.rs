//! Run orchestration: fan-out, shared state wiring, final report.
//!
//! The orchestrator owns the concurrency gate, the circuit breaker, and the
//! error log; workers borrow them through a shared context. One worker is
//! spawned per task into a `JoinSet` and completions are drained in whatever
//! order they land. A breaker trip cancels the run token; workers observe it
//! at their suspension points and drain quickly, after which the report is
//! finalized immediately.

use crate::breaker::CircuitBreaker;
use crate::config::Config;
use crate::report::{self, ErrorLog, RunMetadata};
use crate::retry::RetryPolicy;
use crate::source::TaskSource;
use crate::worker::http::{AgentPool, HttpClient, HttpConfig};
use crate::worker::{self, DownloadOutcome, WorkerContext};
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("task source error: {0}")]
    Source(#[from] crate::source::SourceError),

    #[error("failed to create output directory: {0}")]
    OutputDir(std::io::Error),

    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to write report: {0}")]
    Report(#[from] crate::report::ReportError),
}

/// What a finished run looks like to the caller. The binary derives its
/// exit code from `tripped`.
#[derive(Debug)]
pub struct RunSummary {
    pub num_urls: usize,
    pub succeeded: usize,
    pub num_errors: usize,
    pub tripped: bool,
    pub report_path: PathBuf,
}

/// Drive a full download run to completion or breaker trip.
pub async fn run(config: &Config, source: &dyn TaskSource) -> Result<RunSummary, RunError> {
    let started_at = Utc::now();
    let tasks = source.tasks()?;
    let num_urls = tasks.len();
    info!(num_urls, "starting download run");

    std::fs::create_dir_all(&config.download.output_folder).map_err(RunError::OutputDir)?;

    let cancel = CancellationToken::new();
    let metadata = RunMetadata::new(
        config.source.file.display().to_string(),
        started_at,
        config.clone(),
    );

    let ctx = Arc::new(WorkerContext {
        client: HttpClient::new(&HttpConfig {
            connect_timeout: Duration::from_secs(config.download.request_timeout_secs),
            request_timeout: Duration::from_secs(config.download.request_timeout_secs),
        })?,
        gate: Semaphore::new(config.download.max_concurrent_downloads),
        breaker: CircuitBreaker::new(config.download.breaker_threshold, cancel.clone()),
        log: Mutex::new(ErrorLog::new(metadata)),
        retry: RetryPolicy::new(config.download.max_retries),
        agents: AgentPool::builtin(),
        rng: Mutex::new(StdRng::from_entropy()),
        cancel,
        output_dir: config.download.output_folder.clone(),
        pacing_ms: (config.download.pacing_min_ms, config.download.pacing_max_ms),
    });

    let mut join_set = JoinSet::new();
    for task in tasks {
        join_set.spawn(worker::run_task(Arc::clone(&ctx), task));
    }

    let mut succeeded = 0usize;
    let mut drained = 0usize;
    while let Some(joined) = join_set.join_next().await {
        drained += 1;
        match joined {
            Ok(DownloadOutcome::Succeeded { .. }) => succeeded += 1,
            Ok(_) => {}
            Err(e) => warn!(error = %e, "worker task failed to join"),
        }
        if drained % 100 == 0 {
            info!(drained, num_urls, succeeded, "progress");
        }
    }

    let tripped = ctx.breaker.is_tripped();
    let (num_errors, report_path) = {
        let mut log = ctx.log.lock().unwrap();
        let path = report::finalize(&mut log, num_urls, &config.report.path)?;
        (log.metadata.num_errors, path)
    };

    if tripped {
        warn!(succeeded, num_errors, "run halted by circuit breaker");
    } else {
        info!(succeeded, num_errors, "run complete");
    }

    Ok(RunSummary {
        num_urls,
        succeeded,
        num_errors,
        tripped,
        report_path,
    })
}
