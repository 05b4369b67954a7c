//! Per-job preview pipeline
//!
//! This module provides the `PreviewService` that a worker runs for each job:
//! scrape the page, measure every candidate image, rank, and serialize.

use crate::{
    Config, ImageInspector, ImageRef, Metrics, Preview, Scraper, WorkResult,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Builds previews from a scraper and an image inspector
///
/// The service holds no per-request state and is shared by every worker in
/// the pool.
///
/// # Examples
///
/// ```rust,no_run
/// use link_preview::{Config, HtmlScraper, HttpImageInspector, Metrics, PreviewService};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let service = PreviewService::new(
///         &config,
///         Arc::new(HtmlScraper::new(&config.user_agent())?),
///         Arc::new(HttpImageInspector::new(&config.user_agent(), config.image_probe_limit)?),
///         Arc::new(Metrics::new()),
///     );
///
///     let result = service.build("https://example.com").await;
///     println!("{} {}", result.status, result.body);
///     Ok(())
/// }
/// ```
pub struct PreviewService {
    scraper: Arc<dyn Scraper>,
    inspector: Arc<dyn ImageInspector>,
    metrics: Arc<Metrics>,
    max_redirects: usize,
    image_lookup_concurrency: usize,
}

impl PreviewService {
    pub fn new(
        config: &Config,
        scraper: Arc<dyn Scraper>,
        inspector: Arc<dyn ImageInspector>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            scraper,
            inspector,
            metrics,
            max_redirects: config.max_redirects,
            image_lookup_concurrency: config.image_lookup_concurrency.max(1),
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run the whole pipeline for one URL. Never fails: every outcome is a
    /// `WorkResult` ready to be written to the client.
    pub async fn build(&self, url: &str) -> WorkResult {
        let fields = match self.scraper.scrape(url, self.max_redirects).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!("Unable to retrieve information from {} ({}): {}", url, e.kind(), e);
                return WorkResult::scrape_failed();
            }
        };

        debug!("Scraped {}: {} candidate images", url, fields.images.len());

        let images = self.measure_images(&fields.images).await;
        let preview = Preview::assemble(fields, images);

        match preview.to_json() {
            Ok(body) => WorkResult::ok(body),
            Err(e) => {
                error!("Failed to serialize preview for {}: {}", url, e);
                WorkResult::internal()
            }
        }
    }

    /// Look up dimensions for every image. Output order matches input order
    /// regardless of concurrency; failed lookups become unmeasured images.
    async fn measure_images(&self, urls: &[String]) -> Vec<ImageRef> {
        stream::iter(urls.iter().cloned())
            .map(|url| async move {
                match self.inspector.inspect(&url).await {
                    Ok((width, height)) => {
                        self.metrics.record_image_lookup(true);
                        ImageRef::new(url, width, height)
                    }
                    Err(e) => {
                        self.metrics.record_image_lookup(false);
                        debug!("No dimensions for {}: {}", url, e);
                        ImageRef::unmeasured(url)
                    }
                }
            })
            .buffered(self.image_lookup_concurrency)
            .collect()
            .await
    }
}
