//! Background upload worker.
//!
//! Drains the durable upload queue whenever the device is online and the
//! document server is reachable. The worker wakes on an explicit dispatch,
//! on connectivity changes, and on a safety-net poll interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use paperscan_core::defaults::EVENT_BUS_CAPACITY;
use paperscan_core::{
    BackgroundDispatcher, DocumentRepository, Error, ProgressCallback, QueueEntry,
    QueueRepository, QueueStatus, ReachabilityMonitor, Result,
};

use crate::retry::RetryPolicy;
use crate::stager::LocalFileStager;
use crate::DEFAULT_POLL_INTERVAL_MS;

/// Lower bound on the sleep before a deferred retry.
const MIN_RETRY_WAIT: Duration = Duration::from_millis(10);

/// Configuration for the upload worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Safety-net polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Whether to process the queue at all.
    pub enabled: bool,
    /// Backoff schedule for failed uploads.
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            enabled: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `UPLOAD_WORKER_ENABLED` | `true` | Enable/disable background uploads |
    /// | `UPLOAD_POLL_INTERVAL_MS` | `30000` | Polling interval when idle |
    pub fn from_env() -> Self {
        let enabled = std::env::var("UPLOAD_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var("UPLOAD_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        Self {
            poll_interval_ms,
            enabled,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Event emitted by the upload worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// An attempt started.
    UploadStarted { queue_id: Uuid, attempt: u32 },
    /// Upload progress, as a fraction.
    UploadProgress { queue_id: Uuid, progress: f32 },
    /// The server accepted the document.
    UploadCompleted { queue_id: Uuid, task_id: String },
    /// The attempt failed and the entry will be retried.
    UploadRetrying {
        queue_id: Uuid,
        attempt: u32,
        max_attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: String,
    },
    /// The entry failed for good.
    UploadFailed {
        queue_id: Uuid,
        error: String,
        retryable: bool,
    },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Wakes the worker. Cheap to clone; all clones share one signal.
#[derive(Debug, Clone, Default)]
pub struct NotifyDispatcher {
    wake: Arc<Notify>,
}

impl NotifyDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackgroundDispatcher for NotifyDispatcher {
    fn schedule_immediate_upload(&self) {
        // A stored permit survives until the worker next waits.
        self.wake.notify_one();
    }
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    dispatcher: NotifyDispatcher,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// Dispatcher waking this worker.
    pub fn dispatcher(&self) -> NotifyDispatcher {
        self.dispatcher.clone()
    }
}

/// Uploads queued entries in the background.
pub struct UploadWorker {
    queue: Arc<dyn QueueRepository>,
    uploader: Arc<dyn DocumentRepository>,
    reachability: Arc<dyn ReachabilityMonitor>,
    stager: Option<Arc<LocalFileStager>>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
    dispatcher: NotifyDispatcher,
}

impl UploadWorker {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        uploader: Arc<dyn DocumentRepository>,
        reachability: Arc<dyn ReachabilityMonitor>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            queue,
            uploader,
            reachability,
            stager: None,
            config,
            event_tx,
            dispatcher: NotifyDispatcher::new(),
        }
    }

    /// Dispatcher to hand to the upload queue.
    pub fn dispatcher(&self) -> NotifyDispatcher {
        self.dispatcher.clone()
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            dispatcher,
        }
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Upload worker is disabled, not starting");
            return;
        }

        match self.queue.recover_interrupted().await {
            Ok(0) => {}
            Ok(recovered) => info!(recovered, "Recovered interrupted uploads"),
            Err(e) => error!(error = ?e, "Failed to recover interrupted uploads"),
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_attempts = self.config.retry.max_attempts,
            "Upload worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut online_rx = self.reachability.observe_online();
        let mut online_open = true;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Upload worker received shutdown signal");
                break;
            }

            let wait = if self.can_upload().await {
                self.drain().await;
                self.next_wait(poll_interval).await
            } else {
                debug!("Offline or server unreachable, uploads deferred");
                poll_interval
            };

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Upload worker received shutdown signal");
                    break;
                }
                _ = self.dispatcher.wake.notified() => {
                    debug!("Upload worker woken by dispatch");
                }
                changed = online_rx.changed(), if online_open => {
                    if changed.is_err() {
                        online_open = false;
                    }
                }
                _ = sleep(wait) => {}
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Upload worker stopped");
    }

    async fn can_upload(&self) -> bool {
        let online = *self.reachability.observe_online().borrow();
        if !online {
            return false;
        }
        let reachable = *self.reachability.observe_server_reachable().borrow();
        reachable || self.reachability.check_now().await
    }

    /// Upload eligible entries one at a time until none is left.
    async fn drain(&self) {
        loop {
            match self.queue.claim_next(Utc::now()).await {
                Ok(Some(entry)) => self.process(entry).await,
                Ok(None) => break,
                Err(e) => {
                    error!(error = ?e, "Failed to claim queue entry");
                    break;
                }
            }
        }
    }

    /// Time until the earliest deferred retry becomes eligible, capped by the
    /// poll interval.
    async fn next_wait(&self, poll_interval: Duration) -> Duration {
        let entries = match self.queue.list().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = ?e, "Failed to read retry schedule");
                return poll_interval;
            }
        };
        let now = Utc::now();
        entries
            .iter()
            .filter(|entry| entry.status == QueueStatus::Pending)
            .filter_map(|entry| entry.next_attempt_at)
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
            .min()
            .map_or(poll_interval, |until| until.max(MIN_RETRY_WAIT).min(poll_interval))
    }

    /// Upload one claimed entry and record the outcome.
    async fn process(&self, entry: QueueEntry) {
        let start = Instant::now();
        let queue_id = entry.id;
        let attempt = entry.attempt_count;

        info!(
            %queue_id,
            attempt,
            max_attempts = entry.max_attempts,
            page_count = entry.files.len(),
            "Processing upload"
        );
        let _ = self
            .event_tx
            .send(WorkerEvent::UploadStarted { queue_id, attempt });

        match self.upload(&entry).await {
            Ok(task_id) => {
                if let Err(e) = self.queue.complete(queue_id, &task_id).await {
                    // Staged copies are still removed below, so a recovered
                    // entry fails as unreadable instead of uploading again.
                    error!(
                        error = ?e,
                        %queue_id,
                        %task_id,
                        "Upload accepted by server but queue entry could not be removed"
                    );
                }
                if let Some(stager) = &self.stager {
                    stager.cleanup(&entry.files).await;
                }
                info!(
                    %queue_id,
                    %task_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Upload completed"
                );
                let _ = self
                    .event_tx
                    .send(WorkerEvent::UploadCompleted { queue_id, task_id });
            }
            Err(err) => self.record_failure(&entry, err, start).await,
        }
    }

    async fn upload(&self, entry: &QueueEntry) -> Result<String> {
        let Some(first) = entry.files.first() else {
            return Err(Error::InvalidInput("queue entry has no files".to_string()));
        };
        for file in &entry.files {
            if !tokio::fs::try_exists(file).await.unwrap_or(false) {
                return Err(Error::FileUnreadable(format!(
                    "staged file missing: {}",
                    file.display()
                )));
            }
        }

        let event_tx = self.event_tx.clone();
        let queue_id = entry.id;
        let on_progress: ProgressCallback = Arc::new(move |progress| {
            let _ = event_tx.send(WorkerEvent::UploadProgress { queue_id, progress });
        });

        if entry.multi_page {
            self.uploader
                .upload_multi_page(&entry.files, &entry.metadata, on_progress)
                .await
        } else {
            self.uploader
                .upload_document(first, &entry.metadata, on_progress)
                .await
        }
    }

    async fn record_failure(&self, entry: &QueueEntry, err: Error, start: Instant) {
        let queue_id = entry.id;
        let retryable = err.is_retryable();
        let message = err.to_string();

        let retry_at = (retryable && entry.attempt_count < entry.max_attempts).then(|| {
            let delay = self.config.retry.delay_for(entry.attempt_count);
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero())
        });

        let status = match self.queue.fail(queue_id, &message, retry_at).await {
            Ok(status) => status,
            Err(e) => {
                error!(error = ?e, %queue_id, "Failed to record upload failure");
                return;
            }
        };

        match (status, retry_at) {
            (QueueStatus::Pending, Some(next_attempt_at)) => {
                warn!(
                    %queue_id,
                    attempt = entry.attempt_count,
                    max_attempts = entry.max_attempts,
                    error = %message,
                    %next_attempt_at,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Upload failed, will retry"
                );
                let _ = self.event_tx.send(WorkerEvent::UploadRetrying {
                    queue_id,
                    attempt: entry.attempt_count,
                    max_attempts: entry.max_attempts,
                    next_attempt_at,
                    error: message,
                });
            }
            _ => {
                warn!(
                    %queue_id,
                    attempt = entry.attempt_count,
                    retryable,
                    error = %message,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Upload failed"
                );
                let _ = self.event_tx.send(WorkerEvent::UploadFailed {
                    queue_id,
                    error: message,
                    retryable,
                });
            }
        }
    }
}

/// Builder for creating an upload worker.
pub struct WorkerBuilder {
    queue: Arc<dyn QueueRepository>,
    uploader: Arc<dyn DocumentRepository>,
    reachability: Arc<dyn ReachabilityMonitor>,
    config: WorkerConfig,
    stager: Option<Arc<LocalFileStager>>,
}

impl WorkerBuilder {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        uploader: Arc<dyn DocumentRepository>,
        reachability: Arc<dyn ReachabilityMonitor>,
    ) -> Self {
        Self {
            queue,
            uploader,
            reachability,
            config: WorkerConfig::default(),
            stager: None,
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Remove staged copies after successful uploads.
    pub fn with_stager(mut self, stager: Arc<LocalFileStager>) -> Self {
        self.stager = Some(stager);
        self
    }

    /// Build and return the worker.
    pub fn build(self) -> UploadWorker {
        let mut worker = UploadWorker::new(self.queue, self.uploader, self.reachability, self.config);
        worker.stager = self.stager;
        worker
    }
}

/// Wait until the worker reports `queue_id` finished, successfully or not.
///
/// Returns the terminal event, or `None` if the event stream closed first.
pub async fn wait_for_terminal(
    events: &mut broadcast::Receiver<WorkerEvent>,
    queue_id: Uuid,
) -> Option<WorkerEvent> {
    loop {
        match events.recv().await {
            Ok(event @ WorkerEvent::UploadCompleted { queue_id: id, .. })
            | Ok(event @ WorkerEvent::UploadFailed { queue_id: id, .. })
                if id == queue_id =>
            {
                return Some(event);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Worker event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
