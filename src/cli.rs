use crate::{
    AppState, Config, HtmlScraper, HttpImageInspector, Metrics, MetricsCollector, PreviewService,
    PrometheusExporter, WorkerPool,
};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "link-preview")]
#[command(about = "Link preview microservice")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(long, global = true, env = "LINK_PREVIEW_CONFIG", help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, visible_alias = "worker_count", global = true, env = "LINK_PREVIEW_WORKER_COUNT", help = "Amount of workers to start")]
    pub worker_count: Option<usize>,

    #[arg(long, global = true, env = "LINK_PREVIEW_HOST", help = "Host to listen on")]
    pub host: Option<String>,

    #[arg(long, global = true, env = "LINK_PREVIEW_PORT", help = "Port to listen on")]
    pub port: Option<u16>,

    #[arg(long, visible_alias = "wait_timeout", global = true, env = "LINK_PREVIEW_WAIT_TIMEOUT", help = "Request timeout in seconds")]
    pub wait_timeout: Option<u64>,

    #[arg(long, global = true, env = "LINK_PREVIEW_MAX_REDIRECTS", help = "Redirect depth limit for page fetches")]
    pub max_redirects: Option<usize>,

    #[arg(long, global = true, env = "LINK_PREVIEW_METRICS_PORT", help = "Serve Prometheus metrics on this port")]
    pub metrics_port: Option<u16>,

    #[arg(long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP service (default)
    Serve,

    /// Build a single preview through the worker pool and print it
    Preview {
        #[arg(short, long, help = "URL to preview")]
        url: String,
    },

    /// Validate a configuration file
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        file: PathBuf,
    },
}

impl Cli {
    /// Defaults, then the config file, then flags and environment.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(worker_count) = self.worker_count {
            config.worker_count = worker_count;
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(wait_timeout) = self.wait_timeout {
            config.wait_timeout = Duration::from_secs(wait_timeout);
        }
        if let Some(max_redirects) = self.max_redirects {
            config.max_redirects = max_redirects;
        }
        if let Some(metrics_port) = self.metrics_port {
            config.metrics_port = Some(metrics_port);
        }

        config.validate()?;
        Ok(config)
    }
}

pub struct CliRunner {
    pub config: Config,
    pub metrics: Arc<Metrics>,
    pub pool: Arc<WorkerPool>,
}

impl CliRunner {
    /// Build the clients, service and pool. Installs the Prometheus exporter
    /// first when configured so the metric handles are live.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        if let Some(port) = config.metrics_port {
            let host: std::net::IpAddr = match config.host.as_str() {
                "localhost" => std::net::Ipv4Addr::LOCALHOST.into(),
                host => host.parse()?,
            };
            PrometheusExporter::new(SocketAddr::new(host, port)).install()?;
        }

        let metrics = Arc::new(Metrics::new());
        let user_agent = config.user_agent();

        let service = PreviewService::new(
            &config,
            Arc::new(HtmlScraper::new(&user_agent)?),
            Arc::new(HttpImageInspector::new(&user_agent, config.image_probe_limit)?),
            metrics.clone(),
        );

        info!("Starting workers: {}", config.worker_count);
        let pool = Arc::new(WorkerPool::start(&config, Arc::new(service)));

        Ok(Self {
            config,
            metrics,
            pool,
        })
    }

    pub async fn run_server<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _collector = MetricsCollector::new(self.metrics.clone(), self.pool.clone()).start_collection();

        info!("All workers started. Starting server on {}", self.config.bind_address());
        let state = AppState {
            pool: self.pool.clone(),
            metrics: self.metrics.clone(),
        };

        crate::serve(&self.config, state, shutdown).await?;
        Ok(())
    }

    pub async fn run_preview(&self, url: String) -> anyhow::Result<()> {
        let result = crate::dispatch(&self.pool, &self.metrics, &url).await;
        println!("{}", result.body);

        if result.status != 200 {
            anyhow::bail!("preview failed with status {}", result.status);
        }
        Ok(())
    }
}

pub fn validate_config(config_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = Config::load(&config_path)?;
    config.validate()?;

    println!("Configuration is valid:");
    println!("  Workers: {}", config.worker_count);
    println!("  Queue capacity: {}", config.queue_capacity);
    println!("  Listen: {}", config.bind_address());
    println!("  Wait timeout: {:?}", config.wait_timeout);
    println!("  Max redirects: {}", config.max_redirects);

    Ok(())
}

pub fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    Ok(())
}
