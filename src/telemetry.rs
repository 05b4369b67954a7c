use crate::{PreviewError, WorkerPool};
use metrics::{register_counter, register_gauge, register_histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Handles for every metric the service records.
///
/// Handles are resolved against the global recorder when `Metrics::new` is
/// called, so the exporter has to be installed first for them to be live.
pub struct Metrics {
    pub jobs_submitted: Counter,
    pub jobs_succeeded: Counter,
    pub scrape_failures: Counter,
    pub invalid_urls: Counter,
    pub internal_errors: Counter,
    pub image_lookups: Counter,
    pub image_lookup_failures: Counter,
    pub job_duration: Histogram,
    pub jobs_in_flight: Gauge,
    pub idle_worker_slots: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            jobs_submitted: register_counter!("link_preview_jobs_submitted_total"),
            jobs_succeeded: register_counter!("link_preview_jobs_succeeded_total"),
            scrape_failures: register_counter!("link_preview_scrape_failures_total"),
            invalid_urls: register_counter!("link_preview_invalid_urls_total"),
            internal_errors: register_counter!("link_preview_internal_errors_total"),
            image_lookups: register_counter!("link_preview_image_lookups_total"),
            image_lookup_failures: register_counter!("link_preview_image_lookup_failures_total"),
            job_duration: register_histogram!("link_preview_job_duration_seconds"),
            jobs_in_flight: register_gauge!("link_preview_jobs_in_flight"),
            idle_worker_slots: register_gauge!("link_preview_idle_worker_slots"),
        }
    }

    pub fn record_job(&self, duration: Duration, status: u16) {
        match status {
            200 => self.jobs_succeeded.increment(1),
            400 => self.scrape_failures.increment(1),
            _ => self.internal_errors.increment(1),
        }

        self.job_duration.record(duration.as_secs_f64());
    }

    pub fn record_image_lookup(&self, success: bool) {
        self.image_lookups.increment(1);
        if !success {
            self.image_lookup_failures.increment(1);
        }
    }

    pub fn record_invalid_url(&self) {
        self.invalid_urls.increment(1);
    }

    pub fn job_started(&self) {
        self.jobs_submitted.increment(1);
        self.jobs_in_flight.increment(1.0);
    }

    pub fn job_finished(&self) {
        self.jobs_in_flight.decrement(1.0);
    }

    pub fn set_idle_worker_slots(&self, slots: usize) {
        self.idle_worker_slots.set(slots as f64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically samples pool occupancy into the metrics gauges.
pub struct MetricsCollector {
    metrics: Arc<Metrics>,
    pool: Arc<WorkerPool>,
    start_time: Instant,
    collection_interval: Duration,
}

impl MetricsCollector {
    pub fn new(metrics: Arc<Metrics>, pool: Arc<WorkerPool>) -> Self {
        Self {
            metrics,
            pool,
            start_time: Instant::now(),
            collection_interval: Duration::from_secs(10),
        }
    }

    pub fn start_collection(&self) -> tokio::task::JoinHandle<()> {
        let metrics = self.metrics.clone();
        let pool = self.pool.clone();
        let interval = self.collection_interval;
        let start_time = self.start_time;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);

            loop {
                interval_timer.tick().await;

                let idle = pool.available_slots();
                metrics.set_idle_worker_slots(idle);

                debug!(
                    "Pool sample after {}: {} idle slots, {} submitted, {} processed, {} errors",
                    crate::format_duration(start_time.elapsed()),
                    idle,
                    pool.submitted_count(),
                    pool.total_processed(),
                    pool.total_errors()
                );
            }
        })
    }
}

pub struct PrometheusExporter {
    addr: SocketAddr,
}

impl PrometheusExporter {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Install the global recorder and serve `/metrics` on the configured
    /// address. Must be called from within the tokio runtime.
    pub fn install(&self) -> Result<(), PreviewError> {
        PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .install()
            .map_err(|e| PreviewError::ConfigurationError(e.to_string()))?;

        info!("Prometheus exporter listening on {}", self.addr);
        Ok(())
    }
}
