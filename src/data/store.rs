//! Storage seam used by the loaders.

use crate::data::batch::upsert_rows;
use crate::data::records::{Row, Table};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

/// Durable storage with upsert-by-natural-key semantics.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert or replace `rows` in `table`, returning the number of distinct rows written.
    async fn upsert(&self, table: &'static Table, rows: Vec<Row>) -> Result<usize>;
}

/// Postgres-backed store committing every `batch_size` rows.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    batch_size: usize,
}

impl PgStore {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self { pool, batch_size }
    }
}

#[async_trait]
impl MetadataStore for PgStore {
    async fn upsert(&self, table: &'static Table, rows: Vec<Row>) -> Result<usize> {
        upsert_rows(&self.pool, table, rows, self.batch_size).await
    }
}
