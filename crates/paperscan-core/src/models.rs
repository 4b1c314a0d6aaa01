//! Domain models for paperscan.
//!
//! Catalog entities mirror what the document server exposes; upload and
//! suggestion types are owned by the client.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::Error;

// =============================================================================
// CATALOG
// =============================================================================

/// A tag known to the document server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    /// Server-side auto-matching pattern, reused by local matching.
    #[serde(default, rename = "match")]
    pub match_pattern: Option<String>,
    #[serde(default)]
    pub document_count: Option<i64>,
}

/// A document type known to the document server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentType {
    pub id: i64,
    pub name: String,
}

/// A correspondent known to the document server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correspondent {
    pub id: i64,
    pub name: String,
}

// =============================================================================
// UPLOADS
// =============================================================================

/// User-confirmed metadata attached to an upload.
///
/// Tag ids are a set: two metadata values with the same tags in a different
/// order are equal, which is what page grouping relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub title: Option<String>,
    pub tag_ids: BTreeSet<i64>,
    pub document_type_id: Option<i64>,
    pub correspondent_id: Option<i64>,
}

impl UploadMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_tags(mut self, tag_ids: impl IntoIterator<Item = i64>) -> Self {
        self.tag_ids.extend(tag_ids);
        self
    }

    pub fn with_document_type(mut self, id: i64) -> Self {
        self.document_type_id = Some(id);
        self
    }

    pub fn with_correspondent(mut self, id: i64) -> Self {
        self.correspondent_id = Some(id);
        self
    }

    /// Copy with the title suffixed `" (index/total)"`; untitled stays untitled.
    pub fn with_page_suffix(&self, index: usize, total: usize) -> Self {
        let mut meta = self.clone();
        meta.title = self
            .title
            .as_ref()
            .map(|t| format!("{} ({}/{})", t, index, total));
        meta
    }
}

/// Opaque handle to file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileRef {
    /// App-readable path that stays valid across process restarts.
    Local(PathBuf),
    /// Permission-scoped handle that may stop being readable later.
    Transient {
        uri: String,
        display_name: Option<String>,
    },
}

impl FileRef {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        FileRef::Local(path.into())
    }

    pub fn transient(uri: impl Into<String>) -> Self {
        FileRef::Transient {
            uri: uri.into(),
            display_name: None,
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, FileRef::Local(_))
    }

    /// Human-readable name for messages and logs.
    pub fn display_name(&self) -> String {
        match self {
            FileRef::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            FileRef::Transient { uri, display_name } => display_name
                .clone()
                .or_else(|| uri.rsplit('/').next().map(str::to_string))
                .unwrap_or_else(|| uri.clone()),
        }
    }

    /// Lowercased file extension, if the name carries one.
    pub fn extension(&self) -> Option<String> {
        let name = self.display_name();
        Path::new(&name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// An upload confirmed by the user. `pages[0]` is the source reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub pages: Vec<FileRef>,
    pub metadata: UploadMetadata,
}

impl UploadRequest {
    pub fn single(file: FileRef, metadata: UploadMetadata) -> Self {
        Self {
            pages: vec![file],
            metadata,
        }
    }

    pub fn multi_page(pages: Vec<FileRef>, metadata: UploadMetadata) -> Self {
        Self { pages, metadata }
    }

    pub fn source(&self) -> Option<&FileRef> {
        self.pages.first()
    }

    pub fn is_multi_page(&self) -> bool {
        self.pages.len() > 1
    }
}

/// Lifecycle status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Uploading,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Uploading => "uploading",
            QueueStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "uploading" => Ok(QueueStatus::Uploading),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(Error::Serialization(format!("unknown queue status: {other}"))),
        }
    }
}

/// Durably persisted upload awaiting background processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    /// Durable copies, in page order.
    pub files: Vec<PathBuf>,
    /// Whether `files` are merged into one document on upload.
    pub multi_page: bool,
    pub metadata: UploadMetadata,
    pub status: QueueStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    /// Earliest time the worker may claim this entry again.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    /// New pending entry with a fresh attempt budget.
    pub fn new(files: Vec<PathBuf>, multi_page: bool, metadata: UploadMetadata) -> Self {
        let now = Utc::now();
        Self {
            id: crate::new_v7(),
            files,
            multi_page,
            metadata,
            status: QueueStatus::Pending,
            attempt_count: 0,
            max_attempts: defaults::UPLOAD_MAX_ATTEMPTS,
            last_error: None,
            next_attempt_at: None,
            enqueued_at: now,
            updated_at: now,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt_count)
    }
}

// =============================================================================
// UPLOAD UI STATE
// =============================================================================

/// User-facing failure: short message, optional detail, retry affordance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    pub user_message: String,
    pub technical_details: Option<String>,
    pub is_retryable: bool,
}

impl UploadFailure {
    pub fn new(user_message: impl Into<String>, is_retryable: bool) -> Self {
        Self {
            user_message: user_message.into(),
            technical_details: None,
            is_retryable,
        }
    }

    /// Classify an error into its user-facing form.
    pub fn from_error(error: &Error) -> Self {
        let user_message = match error {
            Error::StorageInsufficient { .. } => "Not enough free storage to prepare this upload.",
            Error::FileTooLarge { .. } => "The file is too large to upload.",
            Error::FileUnreadable(_) | Error::Staging(_) => "The selected file could not be read.",
            Error::NetworkUnreachable(_) => {
                "The server could not be reached. Check your connection."
            }
            Error::Timeout(_) => "The server took too long to respond.",
            Error::Http { status: 401, .. } => "Authentication failed. Please sign in again.",
            Error::Http { status: 403, .. } => "You don't have permission to upload documents.",
            Error::Http { status: 413, .. } => "The server rejected the file because it is too large.",
            Error::Http { status, .. } if *status >= 500 => {
                "The server ran into a problem. Please try again."
            }
            Error::Http { .. } => "The server rejected the upload.",
            Error::QueuePersistence(_) | Error::Database(_) => "The upload could not be queued.",
            Error::Io(_) | Error::Request(_) => "A connection problem interrupted the upload.",
            _ => "The upload failed.",
        };
        Self {
            user_message: user_message.to_string(),
            technical_details: Some(error.to_string()),
            is_retryable: error.is_retryable(),
        }
    }
}

/// The upload screen's observable state. Exactly one variant is active.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum UploadUiState {
    #[default]
    Idle,
    Queuing,
    Uploading {
        /// Fraction in `0.0..=1.0`.
        progress: f32,
    },
    Retrying {
        attempt: u32,
        max_attempts: u32,
        next_delay: Duration,
    },
    Queued {
        queue_ids: Vec<Uuid>,
    },
    Success {
        task_id: String,
    },
    Error(UploadFailure),
}

impl UploadUiState {
    /// Success, Error and Queued end a submission from the screen's view.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadUiState::Success { .. } | UploadUiState::Error(_) | UploadUiState::Queued { .. }
        )
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            UploadUiState::Queuing | UploadUiState::Uploading { .. } | UploadUiState::Retrying { .. }
        )
    }
}

// =============================================================================
// SUGGESTIONS
// =============================================================================

/// Provider that produced an analysis. Declaration order is merge priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    RemoteAi,
    RemoteDocumentApi,
    LocalMatching,
}

impl SuggestionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionSource::RemoteAi => "remote_ai",
            SuggestionSource::RemoteDocumentApi => "remote_document_api",
            SuggestionSource::LocalMatching => "local_matching",
        }
    }
}

impl fmt::Display for SuggestionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A suggested tag. `tag_id` is absent for tags the server does not know yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSuggestion {
    pub tag_id: Option<i64>,
    pub tag_name: String,
    /// Score in `0.0..=1.0`.
    pub confidence: f32,
}

impl TagSuggestion {
    pub fn new(tag_id: Option<i64>, tag_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            tag_id,
            tag_name: tag_name.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Suggestions for one document. Created per analysis call, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub suggested_title: Option<String>,
    #[serde(default)]
    pub suggested_tags: Vec<TagSuggestion>,
    pub suggested_correspondent: Option<String>,
    pub suggested_document_type: Option<String>,
    pub suggested_date: Option<NaiveDate>,
    #[serde(default)]
    pub confidence: f32,
}

impl DocumentAnalysis {
    pub fn is_empty(&self) -> bool {
        self.suggested_title.is_none()
            && self.suggested_tags.is_empty()
            && self.suggested_correspondent.is_none()
            && self.suggested_document_type.is_none()
            && self.suggested_date.is_none()
    }
}

/// The document server's own matching for an uploaded document.
///
/// The server answers with catalog ids; names are resolved client-side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSuggestions {
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub correspondents: Vec<i64>,
    #[serde(default)]
    pub document_types: Vec<i64>,
    #[serde(default)]
    pub dates: Vec<NaiveDate>,
}

/// Outcome of a suggestion request.
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionResult {
    Success {
        analysis: DocumentAnalysis,
        source: SuggestionSource,
    },
    Error {
        message: String,
    },
    Loading,
    WifiRequired,
}

/// Tiered classification of the monthly AI call counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageLimitStatus {
    WithinLimits,
    SoftLimit100,
    SoftLimit200,
    HardLimitReached,
}

impl UsageLimitStatus {
    /// Status for a monthly call count. Monotonic in `count`.
    pub fn from_count(count: u64) -> Self {
        if count >= defaults::USAGE_HARD_LIMIT {
            UsageLimitStatus::HardLimitReached
        } else if count >= defaults::USAGE_SOFT_LIMIT_200 {
            UsageLimitStatus::SoftLimit200
        } else if count >= defaults::USAGE_SOFT_LIMIT_100 {
            UsageLimitStatus::SoftLimit100
        } else {
            UsageLimitStatus::WithinLimits
        }
    }

    /// Whether the remote AI source may still be called.
    pub fn allows_remote_ai(&self) -> bool {
        *self != UsageLimitStatus::HardLimitReached
    }
}

/// One AI call in the usage ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub source: SuggestionSource,
    pub estimated_tokens: u64,
    pub image_bytes: u64,
    pub recorded_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Ledger month key, `YYYY-MM` in UTC.
    pub fn month_key(&self) -> String {
        month_key(self.recorded_at)
    }
}

/// Month key (`YYYY-MM`, UTC) used to bucket usage.
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}
