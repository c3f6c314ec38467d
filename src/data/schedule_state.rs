//! Last-run timestamps of scheduled tasks, kept across restarts.
//!
//! Losing a row only makes the task due immediately, so the table is UNLOGGED.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// When `task` last completed, or `None` if it never has.
pub async fn last_run(pool: &PgPool, task: &str) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar("SELECT last_run_at FROM sdmx_schedule_state WHERE task = $1")
        .bind(task)
        .fetch_optional(pool)
        .await
}

pub async fn mark_run(pool: &PgPool, task: &str, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sdmx_schedule_state (task, last_run_at)
        VALUES ($1, $2)
        ON CONFLICT (task) DO UPDATE SET last_run_at = EXCLUDED.last_run_at
        "#,
    )
    .bind(task)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(())
}
