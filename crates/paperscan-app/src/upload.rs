//! Upload screen state machine.
//!
//! One view-model serves both upload flows. `QueueFirst` hands the request to
//! the durable queue and stops at `Queued`; `Immediate` uploads in the
//! foreground with automatic retries of transient failures.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{info, instrument, warn};

use paperscan_core::{
    DocumentRepository, Error, ProgressCallback, Result, StateHolder, UploadFailure,
    UploadRequest, UploadUiState,
};
use paperscan_jobs::{retry_if, LocalFileStager, PreconditionChecker, RetryPolicy, UploadQueue};

/// Which flow the view-model runs. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadStrategy {
    #[default]
    QueueFirst,
    Immediate,
}

impl FromStr for UploadStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" | "queue_first" | "queue-first" => Ok(UploadStrategy::QueueFirst),
            "immediate" => Ok(UploadStrategy::Immediate),
            other => Err(Error::Config(format!("unknown upload strategy: {other}"))),
        }
    }
}

enum Flow {
    Queue(Arc<UploadQueue>),
    Immediate {
        stager: Arc<LocalFileStager>,
        uploader: Arc<dyn DocumentRepository>,
        retry: RetryPolicy,
    },
}

pub struct UploadViewModel {
    flow: Flow,
    preconditions: Arc<PreconditionChecker>,
    state: Arc<StateHolder<UploadUiState>>,
    last_request: Mutex<Option<UploadRequest>>,
}

impl UploadViewModel {
    /// Queue-first flow: submit ends at `Queued`.
    pub fn queue_first(preconditions: Arc<PreconditionChecker>, queue: Arc<UploadQueue>) -> Self {
        Self::with_flow(preconditions, Flow::Queue(queue))
    }

    /// Immediate flow: upload now, retrying transient failures.
    pub fn immediate(
        preconditions: Arc<PreconditionChecker>,
        stager: Arc<LocalFileStager>,
        uploader: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self::with_flow(
            preconditions,
            Flow::Immediate {
                stager,
                uploader,
                retry: RetryPolicy::default(),
            },
        )
    }

    fn with_flow(preconditions: Arc<PreconditionChecker>, flow: Flow) -> Self {
        Self {
            flow,
            preconditions,
            state: Arc::new(StateHolder::default()),
            last_request: Mutex::new(None),
        }
    }

    /// Retry schedule for the immediate flow. No effect on the queue flow,
    /// whose retries belong to the background worker.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        if let Flow::Immediate { retry, .. } = &mut self.flow {
            *retry = policy;
        }
        self
    }

    pub fn strategy(&self) -> UploadStrategy {
        match self.flow {
            Flow::Queue(_) => UploadStrategy::QueueFirst,
            Flow::Immediate { .. } => UploadStrategy::Immediate,
        }
    }

    pub fn state(&self) -> UploadUiState {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadUiState> {
        self.state.subscribe()
    }

    /// Run a submission to its terminal state and return that state.
    pub async fn submit(&self, request: UploadRequest) -> UploadUiState {
        self.store_request(Some(request.clone()));
        self.run(request).await
    }

    /// Replay the last submitted request. Without one, logs and does nothing.
    pub async fn retry(&self) -> UploadUiState {
        let request = self.stored_request();
        match request {
            Some(request) => self.run(request).await,
            None => {
                warn!(subsystem = "upload", op = "retry", "Retry requested with no stored request");
                self.state()
            }
        }
    }

    /// A retryable error is showing and there is a request to replay.
    pub fn can_retry(&self) -> bool {
        let retryable = matches!(self.state(), UploadUiState::Error(ref f) if f.is_retryable);
        retryable && self.stored_request().is_some()
    }

    /// Back to `Idle`, forgetting the stored request.
    pub fn reset_state(&self) {
        self.store_request(None);
        self.state.set(UploadUiState::Idle);
    }

    fn store_request(&self, request: Option<UploadRequest>) {
        if let Ok(mut slot) = self.last_request.lock() {
            *slot = request;
        }
    }

    fn stored_request(&self) -> Option<UploadRequest> {
        self.last_request.lock().ok().and_then(|slot| slot.clone())
    }

    #[instrument(skip(self, request), fields(page_count = request.pages.len(), strategy = ?self.strategy()))]
    async fn run(&self, request: UploadRequest) -> UploadUiState {
        let outcome = match &self.flow {
            Flow::Queue(queue) => self.run_queued(queue, &request).await,
            Flow::Immediate {
                stager,
                uploader,
                retry,
            } => self.run_immediate(stager, uploader, retry, &request).await,
        };

        let state = match outcome {
            Ok(state) => state,
            Err(e) => {
                warn!(subsystem = "upload", error = %e, retryable = e.is_retryable(), "Upload failed");
                UploadUiState::Error(UploadFailure::from_error(&e))
            }
        };
        self.state.set(state.clone());
        state
    }

    async fn run_queued(&self, queue: &UploadQueue, request: &UploadRequest) -> Result<UploadUiState> {
        self.state.set(UploadUiState::Queuing);
        if request.pages.is_empty() {
            return Err(Error::InvalidInput("no pages to upload".into()));
        }
        self.preconditions.check_storage(&request.pages).await?;

        let id = if request.is_multi_page() {
            queue
                .queue_multi_page_upload(&request.pages, request.metadata.clone())
                .await?
        } else {
            queue
                .queue_upload(request.pages[0].clone(), request.metadata.clone())
                .await?
        };
        info!(subsystem = "upload", queue_id = %id, "Upload queued");
        Ok(UploadUiState::Queued { queue_ids: vec![id] })
    }

    async fn run_immediate(
        &self,
        stager: &LocalFileStager,
        uploader: &Arc<dyn DocumentRepository>,
        policy: &RetryPolicy,
        request: &UploadRequest,
    ) -> Result<UploadUiState> {
        self.state.set(UploadUiState::Uploading { progress: 0.0 });
        if request.pages.is_empty() {
            return Err(Error::InvalidInput("no pages to upload".into()));
        }
        self.preconditions.check_storage(&request.pages).await?;
        let files = stager.stage_all(&request.pages).await?;

        let state = Arc::clone(&self.state);
        let on_progress: ProgressCallback = Arc::new(move |progress| {
            state.set(UploadUiState::Uploading { progress });
        });

        let pages: &[PathBuf] = &files;
        let result = retry_if(
            policy,
            || {
                let on_progress = on_progress.clone();
                async move {
                    on_progress(0.0);
                    if pages.len() > 1 {
                        uploader
                            .upload_multi_page(pages, &request.metadata, on_progress)
                            .await
                    } else {
                        uploader
                            .upload_document(&pages[0], &request.metadata, on_progress)
                            .await
                    }
                }
            },
            Error::is_retryable,
            |attempt| {
                let state = Arc::clone(&self.state);
                async move {
                    state.set(UploadUiState::Retrying {
                        attempt: attempt.attempt,
                        max_attempts: attempt.max_attempts,
                        next_delay: attempt.delay,
                    });
                    attempt.wait().await;
                }
            },
        )
        .await;

        stager.cleanup(&files).await;
        let task_id = result?;
        info!(subsystem = "upload", task_id = %task_id, "Upload succeeded");
        Ok(UploadUiState::Success { task_id })
    }
}
