//! Crawl orchestration and the background service that runs it.

pub mod jobs;
pub mod orchestrator;
pub mod scheduler;
pub mod worker;

pub use jobs::{CrawlSettings, JobQueue};
pub use orchestrator::{CrawlError, CrawlReport, Crawler, Strategy};
