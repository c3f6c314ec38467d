use crate::crawler::jobs::{self, JobQueue};
use crate::data::schedule_state;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

/// How often the scheduler wakes up to check whether a collection is due.
const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// How long an in-flight enqueue pass may take to wind down at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Delay before retrying an enqueue pass that failed.
const FAILURE_RETRY: Duration = Duration::from_secs(5 * 60);

/// Task name under which the last collection is persisted.
pub const COLLECT_METADATA_TASK: &str = "collect_metadata";

/// Time left before the next collection is due, given the last persisted one.
///
/// Absent timestamps, and timestamps in the future, are due immediately.
fn remaining_cooldown(persisted: Option<DateTime<Utc>>, interval: Duration) -> Duration {
    match persisted.map(|ts| (Utc::now() - ts).to_std()) {
        Some(Ok(elapsed)) => interval.saturating_sub(elapsed),
        _ => Duration::ZERO,
    }
}

/// Wait before the next attempt after a failed pass, never longer than the
/// regular interval.
fn retry_delay(interval: Duration) -> Duration {
    interval.min(FAILURE_RETRY)
}

/// Periodically queues a metadata collection for every provider.
pub struct Scheduler {
    pool: PgPool,
    queue: JobQueue,
    interval: Duration,
}

impl Scheduler {
    pub fn new(pool: PgPool, queue: JobQueue, interval: Duration) -> Self {
        Self {
            pool,
            queue,
            interval,
        }
    }

    /// Runs the scheduler loop until a shutdown signal arrives.
    ///
    /// Enqueue passes run in their own task so shutdown stays responsive; a
    /// pass still running at shutdown gets [`SHUTDOWN_GRACE`] to finish.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(interval = ?self.interval, "Scheduler service started");

        let persisted = schedule_state::last_run(&self.pool, COLLECT_METADATA_TASK)
            .await
            .unwrap_or_else(|e| {
                warn!(error = ?e, "Failed to load last collection time, collecting now");
                None
            });
        if let Some(ts) = persisted {
            info!(last_collect = %ts, "Loaded persisted scheduler timestamp");
        }

        let mut next_collect = Instant::now() + remaining_cooldown(persisted, self.interval);
        let mut next_run = time::Instant::now();
        let mut current_work: Option<(tokio::task::JoinHandle<bool>, CancellationToken)> = None;

        loop {
            tokio::select! {
                _ = time::sleep_until(next_run) => {
                    next_run = time::Instant::now() + CHECK_INTERVAL;

                    if let Some((ref handle, _)) = current_work
                        && !handle.is_finished()
                    {
                        trace!("Previous enqueue pass still running, skipping");
                        continue;
                    }

                    if let Some((handle, _)) = current_work.take() {
                        let succeeded = handle.await.unwrap_or(false);
                        if !succeeded {
                            let delay = retry_delay(self.interval);
                            next_collect = Instant::now() + delay;
                            warn!(retry_in = ?delay, "Enqueue pass did not complete, retrying early");
                        }
                    }

                    if Instant::now() < next_collect {
                        trace!("Collection not due yet");
                        continue;
                    }
                    next_collect = Instant::now() + self.interval;

                    let cancel_token = CancellationToken::new();
                    let handle = tokio::spawn({
                        let pool = self.pool.clone();
                        let queue = self.queue.clone();
                        let cancel_token = cancel_token.clone();
                        async move {
                            tokio::select! {
                                result = jobs::collect_metadata(&pool, &queue) => match result {
                                    Ok(_) => {
                                        if let Err(e) = schedule_state::mark_run(&pool, COLLECT_METADATA_TASK, Utc::now()).await {
                                            warn!(error = ?e, "Failed to persist collection timestamp");
                                        }
                                        true
                                    }
                                    Err(e) => {
                                        error!(error = ?e, "Failed to queue metadata collection");
                                        false
                                    }
                                },
                                _ = cancel_token.cancelled() => {
                                    info!("Enqueue pass cancelled");
                                    false
                                }
                            }
                        }
                    });
                    current_work = Some((handle, cancel_token));
                }
                _ = shutdown_rx.recv() => {
                    info!("Scheduler received shutdown signal");
                    if let Some((handle, cancel_token)) = current_work.take() {
                        cancel_token.cancel();
                        if time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                            warn!("Enqueue pass did not finish in time, abandoning");
                        }
                    }
                    break;
                }
            }
        }

        info!("Scheduler exited gracefully");
    }
}
