use crate::{Config, PreviewError, PreviewService};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const INVALID_URL_BODY: &str = r#"{"status":"error","message":"Invalid URL"}"#;
pub const SCRAPE_FAILED_BODY: &str =
    r#"{"status":"error","message":"Unable to retrieve information from provided url"}"#;
pub const INTERNAL_ERROR_BODY: &str = r#"{"status":"error","message":"Internal error"}"#;

/// Outcome of one job: the HTTP status and the exact response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkResult {
    pub status: u16,
    pub body: String,
}

impl WorkResult {
    pub fn ok(body: String) -> Self {
        Self { status: 200, body }
    }

    pub fn invalid_url() -> Self {
        Self {
            status: 500,
            body: INVALID_URL_BODY.to_string(),
        }
    }

    pub fn scrape_failed() -> Self {
        Self {
            status: 400,
            body: SCRAPE_FAILED_BODY.to_string(),
        }
    }

    pub fn internal() -> Self {
        Self {
            status: 500,
            body: INTERNAL_ERROR_BODY.to_string(),
        }
    }
}

/// One preview request travelling from the dispatcher to a worker.
///
/// The reply sender is consumed by [`Job::respond`], so a job can be
/// answered at most once. The admission slot is held until then.
pub struct Job {
    pub id: String,
    pub url: String,
    reply: oneshot::Sender<WorkResult>,
    _slot: OwnedSemaphorePermit,
}

impl Job {
    /// Send the result to the waiting dispatcher. Returns `false` when the
    /// dispatcher has gone away (for example after a server timeout).
    pub fn respond(self, result: WorkResult) -> bool {
        self.reply.send(result).is_ok()
    }
}

pub struct PreviewWorker {
    id: usize,
    service: Arc<PreviewService>,
    is_running: Arc<AtomicBool>,
    processed_count: Arc<AtomicUsize>,
    error_count: Arc<AtomicUsize>,
}

impl PreviewWorker {
    pub fn new(id: usize, service: Arc<PreviewService>) -> Self {
        Self {
            id,
            service,
            is_running: Arc::new(AtomicBool::new(false)),
            processed_count: Arc::new(AtomicUsize::new(0)),
            error_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Take jobs from the shared queue until it is closed. A failing job
    /// never ends the loop.
    pub async fn run_with_shared_receiver(&self, jobs: Arc<Mutex<mpsc::Receiver<Job>>>) {
        debug!("Starting preview worker {}", self.id);
        self.is_running.store(true, Ordering::Relaxed);

        loop {
            let job = {
                let mut receiver = jobs.lock().await;
                receiver.recv().await
            };

            let Some(job) = job else { break };

            let result = self.process_job(&job).await;

            if result.status == 200 {
                self.processed_count.fetch_add(1, Ordering::Relaxed);
                debug!("Worker {} completed job {} for {}", self.id, job.id, job.url);
            } else {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                debug!("Worker {} finished job {} with status {}", self.id, job.id, result.status);
            }

            let (id, url) = (job.id.clone(), job.url.clone());
            if !job.respond(result) {
                warn!("Worker {} could not deliver job {} for {}: requester is gone", self.id, id, url);
            }
        }

        self.is_running.store(false, Ordering::Relaxed);
        debug!("Preview worker {} stopped", self.id);
    }

    async fn process_job(&self, job: &Job) -> WorkResult {
        let metrics = self.service.metrics().clone();
        let start = Instant::now();
        metrics.job_started();

        let result = match AssertUnwindSafe(self.service.build(&job.url)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!("Worker {} panicked while processing job {} for {}", self.id, job.id, job.url);
                WorkResult::internal()
            }
        };

        metrics.job_finished();
        metrics.record_job(start.elapsed(), result.status);
        debug!(
            "Job {} took {}",
            job.id,
            crate::format_duration(start.elapsed())
        );

        result
    }

    pub fn get_stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            is_running: self.is_running(),
            processed_count: self.processed_count(),
            error_count: self.error_count(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn processed_count(&self) -> usize {
        self.processed_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }
}

impl Clone for PreviewWorker {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            service: self.service.clone(),
            is_running: self.is_running.clone(),
            processed_count: self.processed_count.clone(),
            error_count: self.error_count.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub id: usize,
    pub is_running: bool,
    pub processed_count: usize,
    pub error_count: usize,
}

/// Fixed set of workers sharing one job queue.
///
/// Admission is limited to `worker_count + queue_capacity` outstanding jobs.
/// With the default capacity of 0 a job is only admitted when a worker is
/// free, and further callers wait in [`WorkerPool::enqueue`].
pub struct WorkerPool {
    workers: Vec<PreviewWorker>,
    _handles: Vec<JoinHandle<()>>,
    job_sender: mpsc::Sender<Job>,
    slots: Arc<Semaphore>,
    submitted: AtomicUsize,
}

impl WorkerPool {
    /// Spawn the workers. Must be called from within the tokio runtime.
    pub fn start(config: &Config, service: Arc<PreviewService>) -> Self {
        let worker_count = config.worker_count.max(1);
        let capacity = worker_count
            .saturating_add(config.queue_capacity)
            .min(Semaphore::MAX_PERMITS);

        // The semaphore bounds outstanding jobs, so the channel never fills.
        let (job_sender, job_receiver) = mpsc::channel(capacity);
        let shared_receiver = Arc::new(Mutex::new(job_receiver));

        let workers: Vec<PreviewWorker> = (0..worker_count)
            .map(|i| PreviewWorker::new(i, service.clone()))
            .collect();

        let handles = workers
            .iter()
            .map(|worker| {
                let worker = worker.clone();
                let rx = shared_receiver.clone();
                tokio::spawn(async move {
                    worker.run_with_shared_receiver(rx).await;
                })
            })
            .collect();

        info!("Started {} preview workers (queue capacity {})", worker_count, config.queue_capacity);

        Self {
            workers,
            _handles: handles,
            job_sender,
            slots: Arc::new(Semaphore::new(capacity)),
            submitted: AtomicUsize::new(0),
        }
    }

    /// Hand a URL to the pool, waiting for admission. Returns the receiving
    /// end of the job's reply channel.
    pub async fn enqueue(&self, url: String) -> Result<oneshot::Receiver<WorkResult>, PreviewError> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PreviewError::PoolClosed)?;

        let (reply, receiver) = oneshot::channel();
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            url,
            reply,
            _slot: slot,
        };

        debug!("Sending job {}: {}", job.id, job.url);
        self.job_sender
            .send(job)
            .await
            .map_err(|_| PreviewError::PoolClosed)?;
        self.submitted.fetch_add(1, Ordering::Relaxed);

        Ok(receiver)
    }

    /// Enqueue a URL and wait for its result.
    pub async fn submit(&self, url: String) -> Result<WorkResult, PreviewError> {
        let receiver = self.enqueue(url).await?;
        receiver.await.map_err(|_| PreviewError::PoolClosed)
    }

    /// Jobs that made it past admission into the queue.
    pub fn submitted_count(&self) -> usize {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Admission slots currently free.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn get_worker_stats(&self) -> Vec<WorkerStats> {
        self.workers.iter().map(|w| w.get_stats()).collect()
    }

    pub fn total_processed(&self) -> usize {
        self.workers.iter().map(|w| w.processed_count()).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.workers.iter().map(|w| w.error_count()).sum()
    }

    pub fn active_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.is_running()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImageInspector, Metrics, MockImageInspector, Preview, PreviewFields, Scraper};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready};

    /// Scraper that reports the URL back as the title and can be held
    /// closed to keep workers busy.
    struct GateScraper {
        entered: AtomicUsize,
        gate: Semaphore,
    }

    impl GateScraper {
        fn open() -> Self {
            Self {
                entered: AtomicUsize::new(0),
                gate: Semaphore::new(Semaphore::MAX_PERMITS),
            }
        }

        fn closed() -> Self {
            Self {
                entered: AtomicUsize::new(0),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl Scraper for GateScraper {
        async fn scrape(&self, url: &str, _max_redirects: usize) -> Result<PreviewFields, PreviewError> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.map_err(|_| PreviewError::PoolClosed)?;

            if url.contains("panic") {
                panic!("scraper blew up on {url}");
            }
            if url.contains("fail") {
                return Err(PreviewError::ScrapeFailed("upstream error".to_string()));
            }

            Ok(PreviewFields {
                title: url.to_string(),
                link: url.to_string(),
                ..Default::default()
            })
        }
    }

    fn pool_with(config: Config, scraper: Arc<dyn Scraper>) -> WorkerPool {
        let inspector: Arc<dyn ImageInspector> = Arc::new(MockImageInspector::new());
        let service = PreviewService::new(&config, scraper, inspector, Arc::new(Metrics::new()));
        WorkerPool::start(&config, Arc::new(service))
    }

    fn small_config(workers: usize) -> Config {
        Config {
            worker_count: workers,
            ..Default::default()
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn test_work_result_bodies() {
        assert_eq!(WorkResult::invalid_url().status, 500);
        assert_eq!(WorkResult::invalid_url().body, r#"{"status":"error","message":"Invalid URL"}"#);
        assert_eq!(WorkResult::scrape_failed().status, 400);
        assert_eq!(WorkResult::internal().status, 500);
        assert_eq!(WorkResult::ok("{}".to_string()), WorkResult { status: 200, body: "{}".to_string() });
    }

    #[tokio::test]
    async fn test_pool_starts_all_workers() {
        let pool = pool_with(small_config(4), Arc::new(GateScraper::open()));

        wait_until(|| pool.active_workers() == 4).await;
        assert_eq!(pool.worker_count(), 4);
        assert_eq!(pool.available_slots(), 4);
        assert_eq!(pool.submitted_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_returns_preview() {
        let pool = pool_with(small_config(2), Arc::new(GateScraper::open()));

        let result = pool.submit("https://example.com/".to_string()).await.unwrap();
        assert_eq!(result.status, 200);

        let preview: Preview = serde_json::from_str(&result.body).unwrap();
        assert_eq!(preview.title, "https://example.com/");
        assert_eq!(pool.submitted_count(), 1);
        assert_eq!(pool.total_processed(), 1);
    }

    #[tokio::test]
    async fn test_scrape_failure_does_not_stop_worker() {
        let pool = pool_with(small_config(1), Arc::new(GateScraper::open()));

        let failed = pool.submit("https://fail.example.com/".to_string()).await.unwrap();
        assert_eq!(failed, WorkResult::scrape_failed());

        let ok = pool.submit("https://example.com/".to_string()).await.unwrap();
        assert_eq!(ok.status, 200);
        assert_eq!(pool.total_errors(), 1);
        assert_eq!(pool.total_processed(), 1);
    }

    #[tokio::test]
    async fn test_panicking_job_is_contained() {
        let pool = pool_with(small_config(1), Arc::new(GateScraper::open()));

        let panicked = pool.submit("https://panic.example.com/".to_string()).await.unwrap();
        assert_eq!(panicked, WorkResult::internal());

        let ok = pool.submit("https://example.com/".to_string()).await.unwrap();
        assert_eq!(ok.status, 200);
        assert_eq!(pool.active_workers(), 1);
    }

    #[tokio::test]
    async fn test_extra_request_waits_for_free_worker() {
        let scraper = Arc::new(GateScraper::closed());
        let pool = Arc::new(pool_with(small_config(2), scraper.clone()));

        let busy: Vec<_> = (0..2)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.submit(format!("https://example.com/{i}")).await })
            })
            .collect();

        wait_until(|| scraper.entered.load(Ordering::SeqCst) == 2).await;
        assert_eq!(pool.available_slots(), 0);

        let mut extra = tokio_test::task::spawn(pool.enqueue("https://example.com/extra".to_string()));
        assert_pending!(extra.poll());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_pending!(extra.poll());
        assert_eq!(pool.submitted_count(), 2);

        scraper.gate.add_permits(3);

        let mut results = Vec::new();
        for handle in busy {
            results.push(handle.await.unwrap().unwrap());
        }

        wait_until(|| pool.available_slots() > 0).await;
        let receiver = assert_ready!(extra.poll()).unwrap();
        let extra_result = receiver.await.unwrap();
        results.push(extra_result);

        let mut titles: Vec<String> = results
            .iter()
            .map(|r| serde_json::from_str::<Preview>(&r.body).unwrap().title)
            .collect();
        titles.sort();
        assert_eq!(
            titles,
            vec![
                "https://example.com/0".to_string(),
                "https://example.com/1".to_string(),
                "https://example.com/extra".to_string(),
            ]
        );
        assert_eq!(pool.submitted_count(), 3);
        assert_eq!(scraper.entered.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_queue_capacity_admits_waiting_jobs() {
        let scraper = Arc::new(GateScraper::closed());
        let config = Config {
            worker_count: 1,
            queue_capacity: 2,
            ..Default::default()
        };
        let pool = Arc::new(pool_with(config, scraper.clone()));

        let mut receivers = Vec::new();
        for i in 0..3 {
            receivers.push(pool.enqueue(format!("https://example.com/{i}")).await.unwrap());
        }
        assert_eq!(pool.submitted_count(), 3);
        assert_eq!(pool.available_slots(), 0);

        let mut blocked = tokio_test::task::spawn(pool.enqueue("https://example.com/3".to_string()));
        assert_pending!(blocked.poll());

        scraper.gate.add_permits(4);
        for receiver in receivers {
            assert_eq!(receiver.await.unwrap().status, 200);
        }
    }

    #[tokio::test]
    async fn test_many_concurrent_requests_each_served_once() {
        let scraper = Arc::new(GateScraper::open());
        let pool = Arc::new(pool_with(small_config(4), scraper.clone()));

        let handles: Vec<_> = (0..40)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let url = format!("https://example.com/page/{i}");
                    let result = pool.submit(url.clone()).await.unwrap();
                    (url, result)
                })
            })
            .collect();

        for handle in handles {
            let (url, result) = handle.await.unwrap();
            let preview: Preview = serde_json::from_str(&result.body).unwrap();
            assert_eq!(preview.title, url);
        }

        assert_eq!(scraper.entered.load(Ordering::SeqCst), 40);
        assert_eq!(pool.submitted_count(), 40);
        assert_eq!(pool.total_processed(), 40);
    }

    #[tokio::test]
    async fn test_reply_to_departed_requester_is_dropped() {
        let scraper = Arc::new(GateScraper::closed());
        let pool = pool_with(small_config(1), scraper.clone());

        let receiver = pool.enqueue("https://example.com/gone".to_string()).await.unwrap();
        drop(receiver);
        scraper.gate.add_permits(2);

        let next = pool.submit("https://example.com/next".to_string()).await.unwrap();
        assert_eq!(next.status, 200);
    }
}
