//! Read access to provider configuration records.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// A registry endpoint to crawl and the strategy flags that drive it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Provider {
    pub id: i32,
    pub agency_id: String,
    pub root_url: String,
    pub bulk_download: bool,
    pub skip_categories: bool,
    pub process_all_agencies: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    /// Agency restriction for catalog queries, `None` when every agency is crawled.
    pub fn agency_filter(&self) -> Option<&str> {
        if self.process_all_agencies {
            None
        } else {
            Some(&self.agency_id)
        }
    }
}

pub async fn get_provider(pool: &PgPool, id: i32) -> Result<Option<Provider>, sqlx::Error> {
    sqlx::query_as::<_, Provider>(
        r#"
        SELECT id, agency_id, root_url, bulk_download, skip_categories,
               process_all_agencies, created_at, updated_at
        FROM sdmx_provider
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list_provider_ids(pool: &PgPool) -> Result<Vec<i32>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM sdmx_provider ORDER BY id")
        .fetch_all(pool)
        .await
}
