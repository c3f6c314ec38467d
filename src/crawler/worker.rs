use crate::crawler::jobs::{self, CrawlSettings, JobQueue, JobReceiver};
use crate::utils::fmt_duration;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Maximum time a single provider crawl may run before it is abandoned.
const JOB_TIMEOUT: Duration = Duration::from_secs(60 * 60);

const SLOW_THRESHOLD: Duration = Duration::from_secs(10 * 60);

/// A single worker instance.
///
/// Workers share one receiver and take provider ids off the queue one at a time.
pub struct Worker {
    id: usize,
    pool: PgPool,
    settings: Arc<CrawlSettings>,
    queue: JobQueue,
    jobs: JobReceiver,
}

impl Worker {
    pub fn new(
        id: usize,
        pool: PgPool,
        settings: Arc<CrawlSettings>,
        queue: JobQueue,
        jobs: JobReceiver,
    ) -> Self {
        Self {
            id,
            pool,
            settings,
            queue,
            jobs,
        }
    }

    /// Runs the worker's main loop.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(worker_id = self.id, "Worker started");

        loop {
            let provider_id = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(worker_id = self.id, "Worker received shutdown signal, exiting gracefully");
                    break;
                }
                next = async { self.jobs.lock().await.recv().await } => match next {
                    Some(id) => id,
                    None => {
                        debug!(worker_id = self.id, "Job queue closed");
                        break;
                    }
                }
            };

            let started_at = Utc::now();
            let start = Instant::now();

            let result = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(worker_id = self.id, provider_id, "Shutdown received during crawl");
                    jobs::record_failure(&self.pool, provider_id, started_at, start, "interrupted by shutdown").await;
                    self.queue.finish(provider_id);
                    break;
                }
                result = time::timeout(
                    JOB_TIMEOUT,
                    jobs::collect_provider(&self.pool, &self.settings, provider_id),
                ) => result
            };
            self.queue.finish(provider_id);

            let duration = start.elapsed();
            if duration > SLOW_THRESHOLD {
                warn!(
                    worker_id = self.id,
                    provider_id,
                    duration = fmt_duration(duration),
                    "Slow crawl detected"
                );
            }

            match result {
                Ok(Ok(Some(report))) => info!(
                    worker_id = self.id,
                    provider_id,
                    degraded = report.is_degraded(),
                    rows = report.counts.total(),
                    duration = fmt_duration(duration),
                    "Provider collected"
                ),
                Ok(Ok(None)) => debug!(worker_id = self.id, provider_id, "Provider vanished before crawl"),
                Ok(Err(e)) => error!(
                    worker_id = self.id,
                    provider_id,
                    duration = fmt_duration(duration),
                    error = ?e,
                    "Provider crawl failed"
                ),
                Err(_elapsed) => {
                    let message = format!("crawl timed out after {}s", JOB_TIMEOUT.as_secs());
                    error!(worker_id = self.id, provider_id, "{message}");
                    jobs::record_failure(&self.pool, provider_id, started_at, start, &message).await;
                }
            }
        }
    }
}
