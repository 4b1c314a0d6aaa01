//! Structured logging schema and field name constants for paperscan.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by the same field names across the queue,
//! the worker, and the suggestion pipeline.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Data loss risk or a broken invariant |
//! | WARN  | Recoverable issue, automatic fallback or retry applied |
//! | INFO  | Lifecycle events, queue writes, upload completions |
//! | DEBUG | Decision points, source eligibility, config choices |
//! | TRACE | Per-item iteration (individual tag matches, pages) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "jobs", "inference", "db", "client", "catalog", "upload", "app"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "stager", "preconditions", "retry", "orchestrator", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "stage", "queue_upload", "claim_next", "get_suggestions"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Queue entry UUID.
pub const QUEUE_ID: &str = "queue_id";

/// Server-side consumption task id returned by an upload.
pub const TASK_ID: &str = "task_id";

/// Server document id (post-upload suggestion context).
pub const DOCUMENT_ID: &str = "document_id";

/// Suggestion source tag ("remote_ai", "remote_document_api", "local_matching").
pub const SOURCE: &str = "source";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of pages/files in an upload.
pub const PAGE_COUNT: &str = "page_count";

/// Byte size of a file or payload.
pub const BYTES: &str = "bytes";

/// Retry attempt number (1-based).
pub const ATTEMPT: &str = "attempt";

/// Maximum attempts allowed.
pub const MAX_ATTEMPTS: &str = "max_attempts";

/// Backoff delay before the next attempt in milliseconds.
pub const DELAY_MS: &str = "delay_ms";

/// Number of tag suggestions produced.
pub const TAG_COUNT: &str = "tag_count";

/// Monthly AI usage counter value.
pub const USAGE_COUNT: &str = "usage_count";

/// Estimated tokens for an AI call.
pub const ESTIMATED_TOKENS: &str = "estimated_tokens";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Whether a failure was classified as retryable.
pub const RETRYABLE: &str = "retryable";
