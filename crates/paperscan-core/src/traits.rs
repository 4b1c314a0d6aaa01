//! Core traits for paperscan abstractions.
//!
//! Every external collaborator of the upload core is expressed here so that
//! concrete implementations (HTTP client, SQLite store, platform bindings) can
//! be swapped and tests can inject counting fakes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

/// Upload progress callback, called with a fraction in `0.0..=1.0`.
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Progress callback that discards updates.
pub fn no_progress() -> ProgressCallback {
    Arc::new(|_| {})
}

// =============================================================================
// DOCUMENT SERVER
// =============================================================================

/// Uploads documents to the document server.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Upload one file. Returns the server's consumption task id.
    async fn upload_document(
        &self,
        file: &Path,
        metadata: &UploadMetadata,
        on_progress: ProgressCallback,
    ) -> Result<String>;

    /// Upload several pages merged into one document. Returns the task id.
    async fn upload_multi_page(
        &self,
        files: &[PathBuf],
        metadata: &UploadMetadata,
        on_progress: ProgressCallback,
    ) -> Result<String>;
}

/// Server-side matching for documents that already exist on the server.
#[async_trait]
pub trait SuggestionApi: Send + Sync {
    async fn document_suggestions(&self, document_id: i64) -> Result<ServerSuggestions>;
}

/// Tag catalog with a shared latest-value stream.
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Observe the cached tag list.
    fn observe_tags(&self) -> watch::Receiver<Vec<Tag>>;

    /// Fetch tags from the server and publish them.
    async fn refresh_tags(&self) -> Result<Vec<Tag>>;

    /// Create a tag. A name collision fails with `Error::Duplicate`.
    async fn create_tag(&self, name: &str, color: Option<&str>) -> Result<Tag>;
}

/// Document type catalog.
#[async_trait]
pub trait DocumentTypeRepository: Send + Sync {
    fn observe_document_types(&self) -> watch::Receiver<Vec<DocumentType>>;

    async fn refresh_document_types(&self) -> Result<Vec<DocumentType>>;
}

/// Correspondent catalog.
#[async_trait]
pub trait CorrespondentRepository: Send + Sync {
    fn observe_correspondents(&self) -> watch::Receiver<Vec<Correspondent>>;

    async fn refresh_correspondents(&self) -> Result<Vec<Correspondent>>;
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Durable store for upload queue entries.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Persist a new entry.
    async fn insert(&self, entry: &QueueEntry) -> Result<()>;

    /// Get an entry by id.
    async fn get(&self, id: Uuid) -> Result<Option<QueueEntry>>;

    /// All entries, oldest first.
    async fn list(&self) -> Result<Vec<QueueEntry>>;

    /// Atomically move the oldest eligible pending entry to `Uploading` and
    /// count the attempt. Entries whose `next_attempt_at` lies after `now`
    /// are not eligible.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<QueueEntry>>;

    /// Remove an entry after the server accepted it as `task_id`.
    async fn complete(&self, id: Uuid, task_id: &str) -> Result<()>;

    /// Record a failed attempt.
    ///
    /// With `retry_at` set and attempts remaining, the entry goes back to
    /// `Pending` and becomes eligible at `retry_at`; otherwise it is `Failed`.
    /// Returns the resulting status.
    async fn fail(&self, id: Uuid, error: &str, retry_at: Option<DateTime<Utc>>)
        -> Result<QueueStatus>;

    /// Reset a failed entry to pending with a fresh attempt budget.
    async fn reset(&self, id: Uuid) -> Result<()>;

    /// Delete an entry.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Number of entries that still need to be uploaded.
    async fn pending_count(&self) -> Result<i64>;

    /// Return entries left in `Uploading` by a dead process to `Pending`.
    async fn recover_interrupted(&self) -> Result<u64>;
}

/// Ledger of AI calls, bucketed by month.
#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Append a record. Returns the new call count for the record's month.
    async fn record(&self, record: &UsageRecord) -> Result<u64>;

    /// Call count for a `YYYY-MM` month key.
    async fn monthly_count(&self, month: &str) -> Result<u64>;
}

// =============================================================================
// PLATFORM
// =============================================================================

/// Network and server reachability signals.
#[async_trait]
pub trait ReachabilityMonitor: Send + Sync {
    /// Device has a validated network connection.
    fn observe_online(&self) -> watch::Receiver<bool>;

    /// Document server answered its last probe.
    fn observe_server_reachable(&self) -> watch::Receiver<bool>;

    /// Current connection is unmetered WiFi.
    fn is_on_wifi(&self) -> bool;

    /// Point-in-time check: online and the server answers now.
    async fn check_now(&self) -> bool;
}

/// Hands queued uploads to background processing.
pub trait BackgroundDispatcher: Send + Sync {
    /// Request processing of queued uploads as soon as connectivity allows.
    fn schedule_immediate_upload(&self);
}

/// Resolves transient file handles to byte streams.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Open the handle for reading.
    async fn open(&self, uri: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;

    /// Size in bytes, if the provider reports one.
    async fn size(&self, uri: &str) -> Result<Option<u64>>;
}

/// Device storage statistics for the staging volume.
#[async_trait]
pub trait StorageStats: Send + Sync {
    async fn available_bytes(&self) -> Result<u64>;
}

/// User settings and entitlements that gate the remote AI source.
pub trait AiSettings: Send + Sync {
    /// Premium entitlement unlocks the remote AI source.
    fn is_premium(&self) -> bool;

    /// Only use image-uploading AI analysis on WiFi.
    fn wifi_only(&self) -> bool;
}

/// Fixed settings, used by the CLI and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAiSettings {
    pub premium: bool,
    pub wifi_only: bool,
}

impl AiSettings for StaticAiSettings {
    fn is_premium(&self) -> bool {
        self.premium
    }

    fn wifi_only(&self) -> bool {
        self.wifi_only
    }
}
