//! Integration tests for the background upload worker.
//!
//! This test suite validates:
//! - Queued entries upload once the device is online and the server answers
//! - Nothing uploads while offline; going online drains the queue
//! - Transient failures are retried with backoff until the budget runs out
//! - Permanent failures stop immediately
//! - Multi-page entries go through the multi-page upload
//! - Interrupted uploads are recovered at startup
//! - Staged copies outlive the transient source they were taken from

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paperscan_db::Database;
use paperscan_jobs::worker::wait_for_terminal;
use paperscan_jobs::{
    DocumentRepository, Error, FileRef, FsContentSource, LocalFileStager, ProgressCallback,
    QueueEntry, QueueRepository, QueueStatus, ReachabilityMonitor, Result, RetryPolicy, UploadMetadata,
    UploadQueue, WorkerBuilder, WorkerConfig, WorkerEvent,
};
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::time::timeout;

// ============================================================================
// FAKES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum UploadCall {
    Single(PathBuf),
    MultiPage(Vec<PathBuf>),
}

/// Uploader that replays scripted outcomes, then succeeds.
#[derive(Default)]
struct ScriptedUploader {
    outcomes: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<UploadCall>>,
}

impl ScriptedUploader {
    fn with_outcomes(outcomes: Vec<Result<String>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<UploadCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self, call: UploadCall, on_progress: ProgressCallback) -> Result<String> {
        self.calls.lock().unwrap().push(call);
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("task-ok".to_string()));
        if outcome.is_ok() {
            on_progress(1.0);
        }
        outcome
    }
}

#[async_trait]
impl DocumentRepository for ScriptedUploader {
    async fn upload_document(
        &self,
        file: &Path,
        _metadata: &UploadMetadata,
        on_progress: ProgressCallback,
    ) -> Result<String> {
        self.next(UploadCall::Single(file.to_path_buf()), on_progress)
    }

    async fn upload_multi_page(
        &self,
        files: &[PathBuf],
        _metadata: &UploadMetadata,
        on_progress: ProgressCallback,
    ) -> Result<String> {
        self.next(UploadCall::MultiPage(files.to_vec()), on_progress)
    }
}

struct SwitchableReachability {
    online: watch::Sender<bool>,
    reachable: watch::Sender<bool>,
}

impl SwitchableReachability {
    fn new(online: bool) -> Self {
        Self {
            online: watch::channel(online).0,
            reachable: watch::channel(online).0,
        }
    }

    fn set_online(&self, online: bool) {
        self.reachable.send_replace(online);
        self.online.send_replace(online);
    }
}

#[async_trait]
impl ReachabilityMonitor for SwitchableReachability {
    fn observe_online(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }
    fn observe_server_reachable(&self) -> watch::Receiver<bool> {
        self.reachable.subscribe()
    }
    fn is_on_wifi(&self) -> bool {
        *self.online.borrow()
    }
    async fn check_now(&self) -> bool {
        *self.reachable.borrow()
    }
}

/// Queue store that cannot remove completed entries.
struct StuckCompletionQueue {
    inner: Arc<dyn QueueRepository>,
}

#[async_trait]
impl QueueRepository for StuckCompletionQueue {
    async fn insert(&self, entry: &QueueEntry) -> Result<()> {
        self.inner.insert(entry).await
    }
    async fn get(&self, id: uuid::Uuid) -> Result<Option<QueueEntry>> {
        self.inner.get(id).await
    }
    async fn list(&self) -> Result<Vec<QueueEntry>> {
        self.inner.list().await
    }
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<QueueEntry>> {
        self.inner.claim_next(now).await
    }
    async fn complete(&self, _id: uuid::Uuid, _task_id: &str) -> Result<()> {
        Err(Error::Internal("database is locked".into()))
    }
    async fn fail(
        &self,
        id: uuid::Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<QueueStatus> {
        self.inner.fail(id, error, retry_at).await
    }
    async fn reset(&self, id: uuid::Uuid) -> Result<()> {
        self.inner.reset(id).await
    }
    async fn delete(&self, id: uuid::Uuid) -> Result<()> {
        self.inner.delete(id).await
    }
    async fn pending_count(&self) -> Result<i64> {
        self.inner.pending_count().await
    }
    async fn recover_interrupted(&self) -> Result<u64> {
        self.inner.recover_interrupted().await
    }
}

// ============================================================================
// HELPERS
// ============================================================================

struct Harness {
    dir: TempDir,
    repo: Arc<dyn QueueRepository>,
    stager: Arc<LocalFileStager>,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::connect_in_memory().await.unwrap();
        let stager = Arc::new(LocalFileStager::new(
            dir.path().join("staging"),
            Arc::new(FsContentSource::new()),
        ));
        Self {
            dir,
            repo: Arc::new(db.queue),
            stager,
        }
    }

    fn transient(&self, name: &str) -> FileRef {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"scan bytes").unwrap();
        FileRef::transient(format!("file://{}", path.display()))
    }

    fn config(&self, max_attempts: u32) -> WorkerConfig {
        WorkerConfig::default()
            .with_poll_interval(50)
            .with_retry_policy(
                RetryPolicy::new(max_attempts)
                    .with_initial_delay(Duration::from_millis(20))
                    .with_max_delay(Duration::from_millis(100)),
            )
    }
}

async fn wait_for_removal(repo: &Arc<dyn QueueRepository>, id: uuid::Uuid) -> bool {
    for _ in 0..100 {
        if let Ok(None) = repo.get(id).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_worker_uploads_queued_entry() {
    let h = Harness::new().await;
    let uploader = Arc::new(ScriptedUploader::default());
    let reachability = Arc::new(SwitchableReachability::new(false));

    let worker = WorkerBuilder::new(h.repo.clone(), uploader.clone(), reachability.clone())
        .with_config(h.config(3))
        .with_stager(h.stager.clone())
        .build();
    let queue = UploadQueue::new(h.repo.clone(), h.stager.clone(), Arc::new(worker.dispatcher()));
    let handle = worker.start();
    let mut events = handle.events();

    let id = queue
        .queue_upload(h.transient("a.jpg"), UploadMetadata::new())
        .await
        .unwrap();
    let staged = h.repo.get(id).await.unwrap().unwrap().files[0].clone();
    reachability.set_online(true);

    let event = timeout(Duration::from_secs(5), wait_for_terminal(&mut events, id))
        .await
        .expect("worker did not finish in time");
    assert!(matches!(
        event,
        Some(WorkerEvent::UploadCompleted { ref task_id, .. }) if task_id == "task-ok"
    ));

    assert!(wait_for_removal(&h.repo, id).await, "completed entry should be deleted");
    assert_eq!(uploader.calls(), vec![UploadCall::Single(staged.clone())]);
    assert!(!staged.exists(), "staged copy should be removed after upload");
    assert_eq!(queue.pending_count().await.unwrap(), 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_waits_for_connectivity() {
    let h = Harness::new().await;
    let uploader = Arc::new(ScriptedUploader::default());
    let reachability = Arc::new(SwitchableReachability::new(false));

    let worker = WorkerBuilder::new(h.repo.clone(), uploader.clone(), reachability.clone())
        .with_config(h.config(3))
        .build();
    let queue = UploadQueue::new(h.repo.clone(), h.stager.clone(), Arc::new(worker.dispatcher()));
    let handle = worker.start();

    let id = queue
        .queue_upload(h.transient("a.jpg"), UploadMetadata::new())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(uploader.calls().is_empty());
    assert_eq!(
        h.repo.get(id).await.unwrap().unwrap().status,
        QueueStatus::Pending
    );

    reachability.set_online(true);
    assert!(wait_for_removal(&h.repo, id).await);
    assert_eq!(uploader.calls().len(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_retries_transient_failures() {
    let h = Harness::new().await;
    let uploader = Arc::new(ScriptedUploader::with_outcomes(vec![
        Err(Error::Timeout("upload".into())),
        Err(Error::Http {
            status: 503,
            message: "Service Unavailable".into(),
        }),
    ]));
    let reachability = Arc::new(SwitchableReachability::new(true));

    let worker = WorkerBuilder::new(h.repo.clone(), uploader.clone(), reachability)
        .with_config(h.config(3))
        .build();
    let queue = UploadQueue::new(h.repo.clone(), h.stager.clone(), Arc::new(worker.dispatcher()));
    let handle = worker.start();
    let mut events = handle.events();

    let id = queue
        .queue_upload(h.transient("a.jpg"), UploadMetadata::new())
        .await
        .unwrap();

    let mut retries = Vec::new();
    let terminal = timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await.unwrap() {
                WorkerEvent::UploadRetrying {
                    queue_id,
                    attempt,
                    max_attempts,
                    ..
                } if queue_id == id => retries.push((attempt, max_attempts)),
                event @ WorkerEvent::UploadCompleted { .. } => break event,
                _ => {}
            }
        }
    })
    .await
    .expect("worker did not finish in time");

    assert!(matches!(terminal, WorkerEvent::UploadCompleted { .. }));
    assert_eq!(retries, vec![(1, 3), (2, 3)]);
    assert_eq!(uploader.calls().len(), 3);
    assert!(wait_for_removal(&h.repo, id).await);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_retry_follows_backoff_not_poll_interval() {
    let h = Harness::new().await;
    let uploader = Arc::new(ScriptedUploader::with_outcomes(vec![Err(Error::Timeout(
        "upload".into(),
    ))]));
    let reachability = Arc::new(SwitchableReachability::new(true));

    // The poll interval alone would never get to the second attempt in time.
    let worker = WorkerBuilder::new(h.repo.clone(), uploader.clone(), reachability)
        .with_config(h.config(3).with_poll_interval(60_000))
        .build();
    let queue = UploadQueue::new(h.repo.clone(), h.stager.clone(), Arc::new(worker.dispatcher()));
    let handle = worker.start();
    let mut events = handle.events();

    let id = queue
        .queue_upload(h.transient("a.jpg"), UploadMetadata::new())
        .await
        .unwrap();

    let event = timeout(Duration::from_secs(5), wait_for_terminal(&mut events, id))
        .await
        .expect("retry waited for the poll interval");
    assert!(matches!(event, Some(WorkerEvent::UploadCompleted { .. })));
    assert_eq!(uploader.calls().len(), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_drops_staged_copy_when_completion_cannot_be_recorded() {
    let h = Harness::new().await;
    let uploader = Arc::new(ScriptedUploader::default());
    let reachability = Arc::new(SwitchableReachability::new(false));
    let stuck: Arc<dyn QueueRepository> = Arc::new(StuckCompletionQueue {
        inner: h.repo.clone(),
    });

    let worker = WorkerBuilder::new(stuck.clone(), uploader.clone(), reachability.clone())
        .with_config(h.config(3))
        .with_stager(h.stager.clone())
        .build();
    let queue = UploadQueue::new(stuck, h.stager.clone(), Arc::new(worker.dispatcher()));
    let handle = worker.start();
    let mut events = handle.events();

    let id = queue
        .queue_upload(h.transient("a.jpg"), UploadMetadata::new())
        .await
        .unwrap();
    let staged = h.repo.get(id).await.unwrap().unwrap().files[0].clone();

    reachability.set_online(true);
    let event = timeout(Duration::from_secs(5), wait_for_terminal(&mut events, id))
        .await
        .unwrap();
    assert!(matches!(
        event,
        Some(WorkerEvent::UploadCompleted { ref task_id, .. }) if task_id == "task-ok"
    ));
    assert!(!staged.exists());
    handle.shutdown().await.unwrap();

    // A restart recovers the entry, but nothing is sent to the server again.
    let worker = WorkerBuilder::new(h.repo.clone(), uploader.clone(), reachability)
        .with_config(h.config(3))
        .build();
    let mut events = worker.events();
    let handle = worker.start();
    let event = timeout(Duration::from_secs(5), wait_for_terminal(&mut events, id))
        .await
        .unwrap();
    assert!(matches!(
        event,
        Some(WorkerEvent::UploadFailed { retryable: false, .. })
    ));
    assert_eq!(uploader.calls().len(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_exhausts_attempts() {
    let h = Harness::new().await;
    let uploader = Arc::new(ScriptedUploader::with_outcomes(vec![
        Err(Error::NetworkUnreachable("connection refused".into())),
        Err(Error::NetworkUnreachable("connection refused".into())),
    ]));
    let reachability = Arc::new(SwitchableReachability::new(true));

    let worker = WorkerBuilder::new(h.repo.clone(), uploader.clone(), reachability)
        .with_config(h.config(2))
        .build();
    let queue = UploadQueue::new(h.repo.clone(), h.stager.clone(), Arc::new(worker.dispatcher()))
        .with_max_attempts(2);
    let handle = worker.start();
    let mut events = handle.events();

    let id = queue
        .queue_upload(h.transient("a.jpg"), UploadMetadata::new())
        .await
        .unwrap();

    let event = timeout(Duration::from_secs(5), wait_for_terminal(&mut events, id))
        .await
        .unwrap();
    assert!(matches!(
        event,
        Some(WorkerEvent::UploadFailed { retryable: true, .. })
    ));

    let entry = h.repo.get(id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Failed);
    assert_eq!(entry.attempt_count, 2);
    assert!(entry.last_error.unwrap().contains("connection refused"));
    assert_eq!(uploader.calls().len(), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_permanent_failure_is_not_retried() {
    let h = Harness::new().await;
    let uploader = Arc::new(ScriptedUploader::with_outcomes(vec![Err(Error::Http {
        status: 401,
        message: "Unauthorized".into(),
    })]));
    let reachability = Arc::new(SwitchableReachability::new(true));

    let worker = WorkerBuilder::new(h.repo.clone(), uploader.clone(), reachability)
        .with_config(h.config(3))
        .build();
    let queue = UploadQueue::new(h.repo.clone(), h.stager.clone(), Arc::new(worker.dispatcher()));
    let handle = worker.start();
    let mut events = handle.events();

    let id = queue
        .queue_upload(h.transient("a.jpg"), UploadMetadata::new())
        .await
        .unwrap();

    let event = timeout(Duration::from_secs(5), wait_for_terminal(&mut events, id))
        .await
        .unwrap();
    assert!(matches!(
        event,
        Some(WorkerEvent::UploadFailed { retryable: false, .. })
    ));
    assert_eq!(uploader.calls().len(), 1);
    assert_eq!(
        h.repo.get(id).await.unwrap().unwrap().status,
        QueueStatus::Failed
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_multi_page_entry() {
    let h = Harness::new().await;
    let uploader = Arc::new(ScriptedUploader::default());
    let reachability = Arc::new(SwitchableReachability::new(false));

    let worker = WorkerBuilder::new(h.repo.clone(), uploader.clone(), reachability.clone())
        .with_config(h.config(3))
        .build();
    let queue = UploadQueue::new(h.repo.clone(), h.stager.clone(), Arc::new(worker.dispatcher()));
    let handle = worker.start();

    let id = queue
        .queue_multi_page_upload(
            &[h.transient("p1.jpg"), h.transient("p2.jpg")],
            UploadMetadata::new(),
        )
        .await
        .unwrap();
    let files = h.repo.get(id).await.unwrap().unwrap().files;

    reachability.set_online(true);
    assert!(wait_for_removal(&h.repo, id).await);
    assert_eq!(uploader.calls(), vec![UploadCall::MultiPage(files)]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_recovers_interrupted_upload() {
    let h = Harness::new().await;
    let queue = UploadQueue::new(
        h.repo.clone(),
        h.stager.clone(),
        Arc::new(paperscan_jobs::NotifyDispatcher::new()),
    );
    let id = queue
        .queue_upload(h.transient("a.jpg"), UploadMetadata::new())
        .await
        .unwrap();

    // Simulate a process that died mid-upload.
    let claimed = h.repo.claim_next(chrono::Utc::now()).await.unwrap().unwrap();
    assert_eq!(claimed.id, id);

    let uploader = Arc::new(ScriptedUploader::default());
    let reachability = Arc::new(SwitchableReachability::new(true));
    let handle = WorkerBuilder::new(h.repo.clone(), uploader.clone(), reachability)
        .with_config(h.config(3))
        .build()
        .start();

    assert!(wait_for_removal(&h.repo, id).await);
    assert_eq!(uploader.calls().len(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_uploads_staged_copy_after_source_is_deleted() {
    let h = Harness::new().await;
    let uploader = Arc::new(ScriptedUploader::default());
    let reachability = Arc::new(SwitchableReachability::new(false));

    let worker = WorkerBuilder::new(h.repo.clone(), uploader.clone(), reachability.clone())
        .with_config(h.config(3))
        .with_stager(h.stager.clone())
        .build();
    let queue = UploadQueue::new(h.repo.clone(), h.stager.clone(), Arc::new(worker.dispatcher()));
    let handle = worker.start();
    let mut events = handle.events();

    let id = queue
        .queue_upload(h.transient("receipt.jpg"), UploadMetadata::new())
        .await
        .unwrap();
    // The transient grant is gone before the device comes back online.
    std::fs::remove_file(h.dir.path().join("receipt.jpg")).unwrap();

    reachability.set_online(true);
    let event = timeout(Duration::from_secs(5), wait_for_terminal(&mut events, id))
        .await
        .expect("worker did not finish in time");
    assert!(matches!(event, Some(WorkerEvent::UploadCompleted { .. })));

    let calls = uploader.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        UploadCall::Single(path) => {
            assert!(path.starts_with(h.dir.path().join("staging")));
        }
        other => panic!("unexpected upload call: {other:?}"),
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_missing_staged_file_fails() {
    let h = Harness::new().await;
    let uploader = Arc::new(ScriptedUploader::default());
    let reachability = Arc::new(SwitchableReachability::new(false));

    let worker = WorkerBuilder::new(h.repo.clone(), uploader.clone(), reachability.clone())
        .with_config(h.config(3))
        .build();
    let queue = UploadQueue::new(h.repo.clone(), h.stager.clone(), Arc::new(worker.dispatcher()));
    let handle = worker.start();
    let mut events = handle.events();

    let id = queue
        .queue_upload(h.transient("a.jpg"), UploadMetadata::new())
        .await
        .unwrap();
    let staged = h.repo.get(id).await.unwrap().unwrap().files[0].clone();
    std::fs::remove_file(&staged).unwrap();

    reachability.set_online(true);
    let event = timeout(Duration::from_secs(5), wait_for_terminal(&mut events, id))
        .await
        .unwrap();
    assert!(matches!(
        event,
        Some(WorkerEvent::UploadFailed { retryable: false, .. })
    ));
    assert!(uploader.calls().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_lifecycle_events() {
    let h = Harness::new().await;
    let worker = WorkerBuilder::new(
        h.repo.clone(),
        Arc::new(ScriptedUploader::default()),
        Arc::new(SwitchableReachability::new(true)),
    )
    .with_config(h.config(3))
    .build();
    let mut events = worker.events();
    let handle = worker.start();

    let started = timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap();
    assert!(matches!(started, WorkerEvent::WorkerStarted));

    handle.shutdown().await.unwrap();
    let stopped = timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(WorkerEvent::WorkerStopped) = events.recv().await {
                return true;
            }
        }
    })
    .await
    .unwrap();
    assert!(stopped);
}
