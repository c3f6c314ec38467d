//! Collection jobs and the in-process queue that feeds the workers.

use crate::config::Config;
use crate::crawler::orchestrator::{CrawlReport, Crawler};
use crate::data::crawl_runs::{self, CrawlRun};
use crate::data::providers::{self, Provider};
use crate::data::store::PgStore;
use crate::sdmx::{SdmxClient, StructureFetcher, XmlDecoder};
use crate::utils::{fmt_duration, fmt_error_chain};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Knobs shared by every crawl, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub fetch_timeout: Duration,
    pub max_in_flight: usize,
    pub rate_limit_per_second: u32,
    pub upsert_batch_size: usize,
    pub label_language: String,
}

impl From<&Config> for CrawlSettings {
    fn from(config: &Config) -> Self {
        Self {
            fetch_timeout: config.fetch_timeout,
            max_in_flight: config.max_in_flight,
            rate_limit_per_second: config.registry_rate_limit,
            upsert_batch_size: config.upsert_batch_size,
            label_language: config.label_language.clone(),
        }
    }
}

/// Wire a crawler for `provider`: HTTP client, XML decoder and Postgres store.
pub fn crawler_for(pool: &PgPool, settings: &CrawlSettings, provider: &Provider) -> Result<Crawler> {
    let client = SdmxClient::new(
        &provider.root_url,
        settings.fetch_timeout,
        settings.rate_limit_per_second,
    )
    .with_context(|| format!("Failed to build client for provider {}", provider.id))?;

    let fetcher = StructureFetcher::new(
        Arc::new(client),
        Arc::new(XmlDecoder),
        settings.max_in_flight,
    );
    let store = PgStore::new(pool.clone(), settings.upsert_batch_size);
    Ok(Crawler::new(fetcher, Arc::new(store), settings.label_language.clone()))
}

fn elapsed_ms(start: Instant) -> i32 {
    i32::try_from(start.elapsed().as_millis()).unwrap_or(i32::MAX)
}

/// Record a run that never produced a report (timeout, cancelled).
pub async fn record_failure(
    pool: &PgPool,
    provider_id: i32,
    started_at: DateTime<Utc>,
    start: Instant,
    error: &str,
) {
    let run = CrawlRun {
        provider_id,
        started_at,
        duration_ms: elapsed_ms(start),
        success: false,
        degraded: false,
        error: Some(error),
        report: None,
    };
    if let Err(e) = crawl_runs::insert_result(pool, run).await {
        warn!(provider_id, error = ?e, "Failed to record crawl run");
    }
}

/// Crawl one provider and record the outcome in the run history.
///
/// Returns `Ok(None)` when no provider has this id.
#[tracing::instrument(skip(pool, settings))]
pub async fn collect_provider(
    pool: &PgPool,
    settings: &CrawlSettings,
    provider_id: i32,
) -> Result<Option<CrawlReport>> {
    let Some(provider) = providers::get_provider(pool, provider_id)
        .await
        .context("Failed to load provider")?
    else {
        warn!("Provider not found, nothing to collect");
        return Ok(None);
    };

    let crawler = crawler_for(pool, settings, &provider)?;
    let started_at = Utc::now();
    let start = Instant::now();
    let result = crawler.collect(&provider).await;

    let error = result.as_ref().err().map(|e| fmt_error_chain(e));
    let run = CrawlRun {
        provider_id,
        started_at,
        duration_ms: elapsed_ms(start),
        success: result.is_ok(),
        degraded: result.as_ref().is_ok_and(CrawlReport::is_degraded),
        error: error.as_deref(),
        report: result
            .as_ref()
            .ok()
            .and_then(|report| serde_json::to_value(report).ok()),
    };
    if let Err(e) = crawl_runs::insert_result(pool, run).await {
        warn!(error = ?e, "Failed to record crawl run");
    }

    let report = result.context("Crawl failed")?;
    debug!(duration = fmt_duration(start.elapsed()), "Run recorded");
    Ok(Some(report))
}

/// Sending half of the collection queue.
///
/// A provider is tracked as pending from enqueue until a worker calls
/// [`JobQueue::finish`], and cannot be enqueued twice meanwhile.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<i32>,
    pending: Arc<Mutex<HashSet<i32>>>,
}

/// Receiving half, shared by all workers.
pub type JobReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<i32>>>;

impl JobQueue {
    pub fn new() -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            tx,
            pending: Arc::new(Mutex::new(HashSet::new())),
        };
        (queue, Arc::new(tokio::sync::Mutex::new(rx)))
    }

    /// Queue a provider unless it is already pending. Returns whether it was queued.
    pub fn enqueue(&self, provider_id: i32) -> bool {
        let mut pending = self.pending.lock().unwrap();
        if !pending.insert(provider_id) {
            return false;
        }
        if self.tx.send(provider_id).is_err() {
            pending.remove(&provider_id);
            return false;
        }
        true
    }

    pub fn finish(&self, provider_id: i32) {
        self.pending.lock().unwrap().remove(&provider_id);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

/// Queue a collection for every configured provider.
///
/// Returns how many providers were newly queued.
pub async fn collect_metadata(pool: &PgPool, queue: &JobQueue) -> Result<usize> {
    let ids = providers::list_provider_ids(pool)
        .await
        .context("Failed to list providers")?;

    let queued = ids.iter().filter(|&&id| queue.enqueue(id)).count();
    info!(
        providers = ids.len(),
        queued,
        already_pending = ids.len() - queued,
        "Queued metadata collection"
    );
    Ok(queued)
}
