//! Download worker: end-to-end handling of one task.
//!
//! Per-task state machine:
//! `Validate -> (Skipped | Attempting) -> attempt loop -> (Succeeded |
//! FailedPermanent | FailedTransient | Cancelled)`.
//!
//! Every per-task error is absorbed here and converted into an error log
//! record; nothing propagates out of a worker except its outcome. The
//! concurrency gate is acquired before any network I/O and held across
//! retries of the same task, so a retrying task does not give up its slot.

pub mod http;

use self::http::{AgentPool, FetchError, HttpClient};
use crate::breaker::CircuitBreaker;
use crate::filename::{DEFAULT_EXTENSION, resolve_filename};
use crate::report::ErrorLog;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::source::Task;
use rand::Rng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Final outcome of one task. Produced exactly once per task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Task never reached the network (invalid URL).
    Skipped { reason: String },
    Succeeded {
        path: PathBuf,
    },
    FailedPermanent {
        status_code: u16,
        message: String,
    },
    FailedTransient {
        attempts: u32,
        message: String,
    },
    /// Worker observed the run cancellation before producing a recordable
    /// outcome. Nothing is written to the error log.
    Cancelled,
}

/// Shared per-run state handed to every worker via `Arc`.
pub struct WorkerContext {
    pub client: HttpClient,
    pub gate: Semaphore,
    pub breaker: CircuitBreaker,
    pub log: Mutex<ErrorLog>,
    pub retry: RetryPolicy,
    pub agents: AgentPool,
    pub rng: Mutex<StdRng>,
    pub cancel: CancellationToken,
    pub output_dir: PathBuf,
    /// Post-success pacing delay range, milliseconds.
    pub pacing_ms: (u64, u64),
}

/// Drive one task from validation to a recorded outcome.
pub async fn run_task(ctx: std::sync::Arc<WorkerContext>, task: Task) -> DownloadOutcome {
    if !is_valid_url(&task.url) {
        debug!(row = task.row_index, url = %task.url, "skipping invalid url");
        ctx.log
            .lock()
            .unwrap()
            .record_invalid(task.row_index, &task.url);
        return DownloadOutcome::Skipped {
            reason: "invalid url".to_string(),
        };
    }

    if ctx.cancel.is_cancelled() {
        return DownloadOutcome::Cancelled;
    }

    let permit = tokio::select! {
        _ = ctx.cancel.cancelled() => return DownloadOutcome::Cancelled,
        permit = ctx.gate.acquire() => match permit {
            Ok(permit) => permit,
            Err(_) => return DownloadOutcome::Cancelled,
        },
    };

    let outcome = attempt_loop(&ctx, &task).await;
    drop(permit);
    outcome
}

/// A URL is downloadable when it is a non-empty string with an HTTP(S)
/// scheme marker. Anything else is recorded as invalid without touching the
/// gate or the network.
fn is_valid_url(url: &str) -> bool {
    url.starts_with("http")
}

async fn attempt_loop(ctx: &WorkerContext, task: &Task) -> DownloadOutcome {
    let mut attempt = 1u32;
    loop {
        if ctx.cancel.is_cancelled() {
            return DownloadOutcome::Cancelled;
        }

        let agent = {
            let mut rng = ctx.rng.lock().unwrap();
            ctx.agents.pick(&mut *rng).to_string()
        };

        match fetch_and_store(ctx, task, &agent).await {
            Ok(path) => {
                debug!(row = task.row_index, path = %path.display(), "downloaded");
                ctx.breaker.record_success();
                pace(ctx).await;
                return DownloadOutcome::Succeeded { path };
            }
            Err(err) => match ctx.retry.decide(attempt, err.class()) {
                RetryDecision::RetryAfter(delay) => {
                    debug!(
                        row = task.row_index,
                        url = %task.url,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => return DownloadOutcome::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                RetryDecision::GiveUp => return give_up(ctx, task, attempt, err),
            },
        }
    }
}

/// Single fetch attempt plus the file write. A failed write is treated as a
/// transient failure of the attempt: the retry re-fetches, and sustained
/// disk trouble exhausts retries and feeds the breaker like any other
/// transient fault.
async fn fetch_and_store(
    ctx: &WorkerContext,
    task: &Task,
    agent: &str,
) -> Result<PathBuf, FetchError> {
    let bytes = ctx.client.fetch(&task.url, agent).await?;
    let filename = resolve_filename(&task.url, DEFAULT_EXTENSION, task.row_index);
    let path = ctx.output_dir.join(filename);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| FetchError::Transient {
            message: format!("failed to write {}: {e}", path.display()),
        })?;
    Ok(path)
}

/// Record the terminal failure and, for exhausted transients, feed the
/// circuit breaker. The worker that trips the breaker appends the trip note
/// to the run metadata.
fn give_up(ctx: &WorkerContext, task: &Task, attempt: u32, err: FetchError) -> DownloadOutcome {
    ctx.log
        .lock()
        .unwrap()
        .record_failure(task.row_index, &task.url, err.to_string());

    match err {
        FetchError::Permanent { status, message } => {
            warn!(row = task.row_index, url = %task.url, status, "permanent failure");
            DownloadOutcome::FailedPermanent {
                status_code: status,
                message,
            }
        }
        FetchError::Transient { message } => {
            warn!(
                row = task.row_index,
                url = %task.url,
                attempts = attempt,
                "transient failure, retries exhausted"
            );
            if ctx.breaker.record_failure() {
                ctx.log.lock().unwrap().append_note(&format!(
                    "circuit breaker tripped after {} consecutive failed downloads",
                    ctx.breaker.threshold()
                ));
            }
            DownloadOutcome::FailedTransient {
                attempts: attempt,
                message,
            }
        }
    }
}

/// Post-success pacing sleep, drawn uniformly from the configured range.
/// Separate from retry backoff: it spaces requests out so a fast run does
/// not look like an automated burst to the source server.
async fn pace(ctx: &WorkerContext) {
    let delay_ms = {
        let mut rng = ctx.rng.lock().unwrap();
        rng.gen_range(ctx.pacing_ms.0..=ctx.pacing_ms.1)
    };
    if delay_ms == 0 {
        return;
    }
    tokio::select! {
        _ = ctx.cancel.cancelled() => {}
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::report::RunMetadata;
    use chrono::Utc;
    use rand::SeedableRng;
    use std::net::TcpListener;
    use std::sync::Arc;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_ctx(
        output: &std::path::Path,
        max_retries: u32,
        threshold: u32,
        timeout: Duration,
    ) -> Arc<WorkerContext> {
        let cancel = CancellationToken::new();
        Arc::new(WorkerContext {
            client: HttpClient::new(&http::HttpConfig {
                connect_timeout: Duration::from_secs(5),
                request_timeout: timeout,
            })
            .unwrap(),
            gate: Semaphore::new(4),
            breaker: CircuitBreaker::new(threshold, cancel.clone()),
            log: Mutex::new(ErrorLog::new(RunMetadata::new(
                "test.csv".to_string(),
                Utc::now(),
                Config::default(),
            ))),
            retry: RetryPolicy::new(max_retries),
            agents: AgentPool::builtin(),
            rng: Mutex::new(StdRng::seed_from_u64(1)),
            cancel,
            output_dir: output.to_path_buf(),
            pacing_ms: (0, 0),
        })
    }

    /// Port with nothing listening: connections are refused, which the
    /// client classifies as transient.
    fn refused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn invalid_url_is_recorded_without_network() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(dir.path(), 3, 100, Duration::from_secs(1));

        let outcome = run_task(
            Arc::clone(&ctx),
            Task {
                row_index: 3,
                url: "ftp://x/y.png".to_string(),
            },
        )
        .await;

        assert!(matches!(outcome, DownloadOutcome::Skipped { .. }));
        let log = ctx.log.lock().unwrap();
        assert_eq!(
            log.invalid_urls.get("3").map(String::as_str),
            Some("ftp://x/y.png")
        );
        assert!(log.download_errors.is_empty());
    }

    #[tokio::test]
    async fn empty_url_is_invalid() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(dir.path(), 3, 100, Duration::from_secs(1));

        let outcome = run_task(
            Arc::clone(&ctx),
            Task {
                row_index: 0,
                url: String::new(),
            },
        )
        .await;

        assert!(matches!(outcome, DownloadOutcome::Skipped { .. }));
        assert!(ctx.log.lock().unwrap().invalid_urls.contains_key("0"));
    }

    #[tokio::test]
    async fn success_writes_resolved_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/photo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(dir.path(), 3, 100, Duration::from_secs(5));

        let outcome = run_task(
            Arc::clone(&ctx),
            Task {
                row_index: 0,
                url: format!("{}/img/photo.png", server.uri()),
            },
        )
        .await;

        let expected = dir.path().join("photo.png");
        assert_eq!(
            outcome,
            DownloadOutcome::Succeeded {
                path: expected.clone()
            }
        );
        assert_eq!(std::fs::read(&expected).unwrap(), b"png-bytes");
        assert_eq!(ctx.breaker.consecutive_failures(), 0);
        assert_eq!(ctx.log.lock().unwrap().num_errors(), 0);
    }

    #[tokio::test]
    async fn http_404_is_permanent_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(dir.path(), 3, 100, Duration::from_secs(5));

        let outcome = run_task(
            Arc::clone(&ctx),
            Task {
                row_index: 7,
                url: format!("{}/missing.jpg", server.uri()),
            },
        )
        .await;

        assert!(matches!(
            outcome,
            DownloadOutcome::FailedPermanent {
                status_code: 404,
                ..
            }
        ));
        let log = ctx.log.lock().unwrap();
        assert!(log.download_errors.contains_key("7"));
        // Permanent failures do not feed the breaker.
        assert_eq!(ctx.breaker.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_retried_until_budget_spent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.jpg"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_secs(60)),
            )
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(dir.path(), 3, 100, Duration::from_secs(1));

        let outcome = run_task(
            Arc::clone(&ctx),
            Task {
                row_index: 2,
                url: format!("{}/slow.jpg", server.uri()),
            },
        )
        .await;

        assert!(matches!(
            outcome,
            DownloadOutcome::FailedTransient { attempts: 3, .. }
        ));
        assert!(ctx.log.lock().unwrap().download_errors.contains_key("2"));
        assert_eq!(ctx.breaker.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn trip_cancels_pending_tasks() {
        let dir = TempDir::new().unwrap();
        // Threshold 1 and a single attempt per task: first refused
        // connection trips the breaker.
        let ctx = test_ctx(dir.path(), 1, 1, Duration::from_secs(1));
        let url = format!("http://127.0.0.1:{}/a.jpg", refused_port());

        let outcome = run_task(
            Arc::clone(&ctx),
            Task {
                row_index: 0,
                url: url.clone(),
            },
        )
        .await;
        assert!(matches!(
            outcome,
            DownloadOutcome::FailedTransient { attempts: 1, .. }
        ));
        assert!(ctx.breaker.is_tripped());
        assert!(ctx.cancel.is_cancelled());
        assert!(!ctx.log.lock().unwrap().metadata.notes.is_empty());

        // A task dispatched after the trip drains without recording.
        let outcome = run_task(
            Arc::clone(&ctx),
            Task {
                row_index: 1,
                url,
            },
        )
        .await;
        assert_eq!(outcome, DownloadOutcome::Cancelled);
        assert_eq!(ctx.log.lock().unwrap().num_errors(), 1);
    }
}
