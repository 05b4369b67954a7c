//! # Link Preview
//!
//! A concurrent HTTP microservice that fetches a URL, extracts link-preview
//! metadata (title, description, icon, candidate images) from its HTML, and
//! returns it as JSON with the images ranked by pixel area.
//!
//! ## Architecture
//!
//! | Component | Role |
//! |-----------|------|
//! | **Dispatcher** (`server`) | Validates `?url=`, enqueues a job, waits for the reply |
//! | **Worker pool** (`worker`) | N long-lived workers sharing one job queue |
//! | **Preview service** | Scrape, measure images, rank, serialize |
//! | **Scraper** (`scrape`) | Page fetch and metadata extraction |
//! | **Image inspector** | Header-only dimension lookup |
//!
//! Each job carries a one-shot reply channel, so exactly one result is
//! produced and consumed per request. With the default queue capacity of 0,
//! a request is admitted only when a worker is free; the rest wait at
//! enqueue.
//!
//! ## Responses
//!
//! | Case | Status | Body |
//! |------|--------|------|
//! | Success | 200 | `{"name","title","description","icon","images":[{"url","width","height"}],"url"}` |
//! | Scrape failure | 400 | `{"status":"error","message":"Unable to retrieve information from provided url"}` |
//! | Invalid URL | 500 | `{"status":"error","message":"Invalid URL"}` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use link_preview::{Config, HtmlScraper, HttpImageInspector, Metrics, PreviewService, WorkerPool};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config { worker_count: 8, ..Default::default() };
//!     let service = PreviewService::new(
//!         &config,
//!         Arc::new(HtmlScraper::new(&config.user_agent())?),
//!         Arc::new(HttpImageInspector::new(&config.user_agent(), config.image_probe_limit)?),
//!         Arc::new(Metrics::new()),
//!     );
//!     let pool = WorkerPool::start(&config, Arc::new(service));
//!
//!     let result = pool.submit("https://example.com".to_string()).await?;
//!     println!("{} {}", result.status, result.body);
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! link-preview --worker-count 1000 --host localhost --port 8000 --wait-timeout 10
//! link-preview preview --url https://example.com
//! ```

/// Configuration and settings for the service
pub mod config;

/// Error types
pub mod error;

/// Preview data model, ranking and assembly
pub mod preview;

/// Page scraping capability and the default HTML scraper
pub mod scrape;

/// Image dimension lookup
pub mod inspector;

/// Per-job pipeline run by workers
pub mod preview_service;

/// Jobs, workers and the worker pool
pub mod worker;

/// HTTP dispatcher
pub mod server;

/// Command-line interface implementation
pub mod cli;

/// Metrics collection and export
pub mod telemetry;

/// Utility functions and helpers
pub mod utils;

#[cfg(test)]
mod test_support;


pub use cli::*;
pub use config::*;
pub use error::*;
pub use inspector::*;
pub use preview::*;
pub use preview_service::*;
pub use scrape::*;
pub use server::*;
pub use telemetry::*;
pub use utils::*;
pub use worker::*;
