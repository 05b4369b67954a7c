//! Configuration management with serde serialization/deserialization
//!
//! This module provides the configuration structure for the preview service,
//! covering pool sizing, listener settings, and outbound fetch limits.

use crate::PreviewError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Main configuration structure for the preview service
///
/// Controls the worker pool size, the HTTP listener, and the limits applied
/// to page and image fetches.
///
/// # Examples
///
/// ```rust
/// use link_preview::Config;
///
/// // Use default configuration
/// let config = Config::default();
///
/// // Create custom configuration
/// let config = Config {
///     worker_count: 50,
///     port: 9000,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Number of long-lived workers in the pool (default: 1000)
    ///
    /// Each worker handles one request at a time, so this is also the
    /// maximum number of previews being built concurrently.
    pub worker_count: usize,

    /// Jobs allowed to wait in the queue beyond those held by workers (default: 0)
    ///
    /// With 0 the queue is a rendezvous: a request is only admitted when a
    /// worker is free to take it, and every other request waits at enqueue.
    pub queue_capacity: usize,

    /// Host to listen on (default: localhost)
    pub host: String,

    /// Port to listen on (default: 8000)
    pub port: u16,

    /// HTTP server request timeout (default: 10 seconds)
    ///
    /// Only bounds how long the server waits on a request. A job that has
    /// already been handed to a worker still runs to completion.
    pub wait_timeout: Duration,

    /// Redirect depth limit passed to the scraper (default: 5)
    pub max_redirects: usize,

    /// Image dimension lookups run in parallel per job (default: 1)
    pub image_lookup_concurrency: usize,

    /// Maximum number of image bytes read while probing dimensions (default: 1 MiB)
    pub image_probe_limit: usize,

    /// Custom User-Agent for outbound requests (default: crate name and version)
    pub user_agent: Option<String>,

    /// Port for the Prometheus exporter; disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: 1000,
            queue_capacity: 0,
            host: "localhost".to_string(),
            port: 8000,
            wait_timeout: Duration::from_secs(10),
            max_redirects: 5,
            image_lookup_concurrency: 1,
            image_probe_limit: 1024 * 1024, // 1 MiB
            user_agent: None,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, PreviewError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PreviewError> {
        if self.worker_count == 0 {
            return Err(PreviewError::ConfigurationError(
                "Worker count must be greater than 0".to_string(),
            ));
        }

        match self.worker_count.checked_add(self.queue_capacity) {
            Some(slots) if slots <= Semaphore::MAX_PERMITS => {}
            _ => {
                return Err(PreviewError::ConfigurationError(format!(
                    "Worker count plus queue capacity must not exceed {}",
                    Semaphore::MAX_PERMITS
                )));
            }
        }

        if self.image_lookup_concurrency == 0 {
            return Err(PreviewError::ConfigurationError(
                "Image lookup concurrency must be greater than 0".to_string(),
            ));
        }

        if self.image_probe_limit == 0 {
            return Err(PreviewError::ConfigurationError(
                "Image probe limit must be greater than 0".to_string(),
            ));
        }

        if self.wait_timeout.is_zero() {
            return Err(PreviewError::ConfigurationError(
                "Wait timeout must be greater than 0".to_string(),
            ));
        }

        if self.host.trim().is_empty() {
            return Err(PreviewError::ConfigurationError(
                "Host must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(|| {
            format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        })
    }
}
