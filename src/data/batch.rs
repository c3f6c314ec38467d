//! Chunked insert-or-update of flat rows.
//!
//! Each chunk is one `INSERT .. SELECT * FROM UNNEST(..)` statement binding one
//! array per column, so the parameter count never depends on the chunk size.

use crate::data::records::{Row, SqlValue, Table};
use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::utils::log_if_slow;

const SLOW_CHUNK_THRESHOLD: Duration = Duration::from_secs(2);

/// Collapse rows sharing a natural key. The last occurrence wins but keeps
/// the position of the first, so parents listed before children stay first.
///
/// Postgres rejects an `ON CONFLICT DO UPDATE` that touches one key twice in
/// a single statement.
pub fn dedup_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut by_key: IndexMap<Vec<SqlValue>, Vec<SqlValue>> = IndexMap::with_capacity(rows.len());
    for row in rows {
        by_key.insert(row.key, row.values);
    }
    by_key
        .into_iter()
        .map(|(key, values)| Row { key, values })
        .collect()
}

/// One column of a chunk, transposed for an `UNNEST` bind.
#[derive(Debug, PartialEq)]
enum ColumnArray {
    Text(Vec<Option<String>>),
    Int(Vec<Option<i32>>),
}

/// Transpose `chunk` into per-column arrays. A column is typed by its first
/// row; a later row disagreeing on the type is an error.
fn column_arrays(table: &Table, chunk: &[Row]) -> Result<Vec<ColumnArray>> {
    let width = table.key_columns.len() + table.value_columns.len();
    let mut columns: Vec<Option<ColumnArray>> = (0..width).map(|_| None).collect();

    for row in chunk {
        let cells: Vec<&SqlValue> = row.key.iter().chain(row.values.iter()).collect();
        if cells.len() != width {
            bail!(
                "row for {} has {} cells, expected {width}",
                table.name,
                cells.len()
            );
        }
        for ((name, column), cell) in table.columns().zip(columns.iter_mut()).zip(cells) {
            let array = column.get_or_insert_with(|| match cell {
                SqlValue::Text(_) => ColumnArray::Text(Vec::with_capacity(chunk.len())),
                SqlValue::Int(_) => ColumnArray::Int(Vec::with_capacity(chunk.len())),
            });
            match (array, cell) {
                (ColumnArray::Text(values), SqlValue::Text(s)) => values.push(s.clone()),
                (ColumnArray::Int(values), SqlValue::Int(i)) => values.push(*i),
                _ => bail!("mixed value types in {}.{name}", table.name),
            }
        }
    }

    Ok(columns
        .into_iter()
        .map(|c| c.unwrap_or(ColumnArray::Text(Vec::new())))
        .collect())
}

/// Build the `INSERT .. SELECT * FROM UNNEST(..) ON CONFLICT .. DO UPDATE`
/// statement for one chunk.
pub fn build_upsert(table: &Table, chunk: &[Row]) -> Result<QueryBuilder<'static, Postgres>> {
    let columns: Vec<_> = table.columns().collect();
    let mut qb = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) SELECT * FROM UNNEST(",
        table.name,
        columns.join(", ")
    ));

    {
        let mut args = qb.separated(", ");
        for array in column_arrays(table, chunk)? {
            match array {
                ColumnArray::Text(values) => {
                    args.push_bind(values);
                    args.push_unseparated("::text[]");
                }
                ColumnArray::Int(values) => {
                    args.push_bind(values);
                    args.push_unseparated("::int4[]");
                }
            }
        }
    }

    let updates: Vec<_> = table
        .value_columns
        .iter()
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();
    qb.push(format!(
        ") ON CONFLICT ({}) DO UPDATE SET {}",
        table.key_columns.join(", "),
        updates.join(", ")
    ));
    Ok(qb)
}

/// Upsert `rows` into `table`, `batch_size` rows per transaction.
///
/// Returns the number of distinct rows written.
pub async fn upsert_rows(pool: &PgPool, table: &Table, rows: Vec<Row>, batch_size: usize) -> Result<usize> {
    let rows = dedup_rows(rows);
    if rows.is_empty() {
        return Ok(0);
    }

    for (idx, chunk) in rows.chunks(batch_size.max(1)).enumerate() {
        let start = Instant::now();
        let mut qb = build_upsert(table, chunk)
            .with_context(|| format!("Failed to build chunk {idx} for {}", table.name))?;

        let mut tx = pool
            .begin()
            .await
            .with_context(|| format!("Failed to open transaction for {}", table.name))?;

        qb.build()
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert chunk {idx} into {}", table.name))?;

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit chunk {idx} into {}", table.name))?;

        debug!(table = table.name, chunk = idx, rows = chunk.len(), "Upserted chunk");
        log_if_slow(start, SLOW_CHUNK_THRESHOLD, table.name);
    }

    Ok(rows.len())
}
