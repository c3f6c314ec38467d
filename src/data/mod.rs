//! Database schema access and the batch loader.

pub mod batch;
pub mod crawl_runs;
pub mod load;
pub mod providers;
pub mod records;
pub mod schedule_state;
pub mod store;

pub use store::{MetadataStore, PgStore};
