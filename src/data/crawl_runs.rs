//! History of provider crawl runs.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Outcome of one provider crawl, as stored in `sdmx_crawl_run`.
#[derive(Debug)]
pub struct CrawlRun<'a> {
    pub provider_id: i32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i32,
    pub success: bool,
    pub degraded: bool,
    pub error: Option<&'a str>,
    pub report: Option<serde_json::Value>,
}

pub async fn insert_result(pool: &PgPool, run: CrawlRun<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sdmx_crawl_run
            (provider_id, started_at, duration_ms, success, degraded, error, report)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(run.provider_id)
    .bind(run.started_at)
    .bind(run.duration_ms)
    .bind(run.success)
    .bind(run.degraded)
    .bind(run.error)
    .bind(run.report)
    .execute(pool)
    .await?;
    Ok(())
}
