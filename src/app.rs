use crate::cli::Command;
use crate::config::Config;
use crate::crawler::jobs::{self, CrawlSettings, JobQueue};
use crate::crawler::scheduler::Scheduler;
use crate::crawler::worker::Worker;
use crate::data::providers;
use crate::utils::fmt_duration;
use anyhow::{Context, bail};
use sqlx::ConnectOptions;
use sqlx::postgres::PgPoolOptions;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Main application struct: configuration plus an initialized database pool.
pub struct App {
    config: Config,
    db_pool: sqlx::PgPool,
}

impl App {
    /// Connect to Postgres and apply pending migrations.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let connect_options = sqlx::postgres::PgConnectOptions::from_str(&config.database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let max_connections = u32::try_from(config.worker_count.max(1) + 2).unwrap_or(u32::MAX);

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(max_connections)
            .acquire_slow_threshold(Duration::from_millis(500))
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            min_connections = 0,
            max_connections,
            acquire_timeout = "4s",
            idle_timeout = "2m",
            max_lifetime = "30m",
            "database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        Ok(App { config, db_pool })
    }

    /// Run the requested command to completion.
    pub async fn run(self, command: Command) -> ExitCode {
        let result = match command {
            Command::Serve => self.serve().await,
            Command::Collect { provider_id } => self.collect(provider_id).await,
            Command::CollectAll => self.collect_all().await,
        };

        match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = ?e, "Command failed");
                ExitCode::FAILURE
            }
        }
    }

    /// Start the scheduler and workers, then wait for Ctrl-C.
    async fn serve(self) -> anyhow::Result<()> {
        let (queue, receiver) = JobQueue::new();
        let settings = Arc::new(CrawlSettings::from(&self.config));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut handles = Vec::new();

        let scheduler = Scheduler::new(
            self.db_pool.clone(),
            queue.clone(),
            self.config.collect_interval,
        );
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move { scheduler.run(shutdown_rx).await }));

        let worker_count = self.config.worker_count.max(1);
        for id in 0..worker_count {
            let worker = Worker::new(
                id,
                self.db_pool.clone(),
                settings.clone(),
                queue.clone(),
                receiver.clone(),
            );
            let shutdown_rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move { worker.run(shutdown_rx).await }));
        }
        info!(
            workers = worker_count,
            interval = fmt_duration(self.config.collect_interval),
            "Crawler service started"
        );

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        info!("Shutdown signal received, stopping services");

        let start = Instant::now();
        // Send fails only when every receiver is gone, i.e. all tasks already exited
        let _ = shutdown_tx.send(());

        let timeout = self.config.shutdown_timeout;
        match tokio::time::timeout(timeout, futures::future::join_all(handles)).await {
            Ok(results) => {
                for result in results.into_iter().filter_map(Result::err) {
                    warn!(error = ?result, "Service task ended abnormally");
                }
                info!(duration = fmt_duration(start.elapsed()), "Graceful shutdown complete");
                Ok(())
            }
            Err(_) => {
                warn!(
                    timeout = fmt_duration(timeout),
                    pending_jobs = queue.pending_len(),
                    "Services did not stop before the shutdown timeout"
                );
                bail!("shutdown timed out after {}", fmt_duration(timeout))
            }
        }
    }

    /// Crawl one provider synchronously and print its report as JSON.
    async fn collect(&self, provider_id: i32) -> anyhow::Result<()> {
        let settings = CrawlSettings::from(&self.config);
        let Some(report) = jobs::collect_provider(&self.db_pool, &settings, provider_id).await?
        else {
            bail!("provider {provider_id} not found");
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to render crawl report")?
        );
        Ok(())
    }

    /// Crawl every provider one after another; fails if any crawl failed.
    async fn collect_all(&self) -> anyhow::Result<()> {
        let settings = CrawlSettings::from(&self.config);
        let ids = providers::list_provider_ids(&self.db_pool)
            .await
            .context("Failed to list providers")?;

        let mut failed = 0usize;
        let mut degraded = 0usize;
        for &provider_id in &ids {
            match jobs::collect_provider(&self.db_pool, &settings, provider_id).await {
                Ok(Some(report)) if report.is_degraded() => degraded += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(provider_id, error = ?e, "Provider crawl failed");
                    failed += 1;
                }
            }
        }

        info!(providers = ids.len(), failed, degraded, "Collected all providers");
        if failed > 0 {
            bail!("{failed} of {} provider crawls failed", ids.len());
        }
        Ok(())
    }
}
