//! Centralized default constants for paperscan.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// UPLOAD PRECONDITIONS
// =============================================================================

/// Maximum size of a single file accepted for upload (100 MiB).
pub const MAX_FILE_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Free space that must remain on the staging volume after copying (50 MiB).
pub const STORAGE_SAFETY_MARGIN_BYTES: u64 = 50 * 1024 * 1024;

/// Directory (under the data dir) holding durable copies of queued files.
pub const STAGING_DIR_NAME: &str = "staging";

// =============================================================================
// RETRY
// =============================================================================

/// Maximum attempts per upload (first attempt included).
pub const UPLOAD_MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry in milliseconds.
pub const RETRY_INITIAL_DELAY_MS: u64 = 2_000;

/// Exponential backoff multiplier.
pub const RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Upper bound for a single backoff delay in milliseconds.
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

// =============================================================================
// BACKGROUND WORKER
// =============================================================================

/// Safety-net poll interval for the upload worker in milliseconds.
///
/// The worker sleeps until the dispatcher notifies it; this interval only
/// covers missed notifications and connectivity that came back silently.
pub const WORKER_POLL_INTERVAL_MS: u64 = 30_000;

/// Worker event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Delay before refetching after a resume event (server-side eventual consistency).
pub const REFRESH_DELAY_MS: u64 = 1_500;

// =============================================================================
// HTTP
// =============================================================================

/// Timeout for document server requests in seconds (uploads included).
pub const HTTP_TIMEOUT_SECS: u64 = 120;

/// Timeout for the server reachability probe in seconds.
pub const REACHABILITY_TIMEOUT_SECS: u64 = 5;

/// Timeout for remote AI analysis requests in seconds.
pub const AI_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// SUGGESTIONS
// =============================================================================

/// Maximum tag suggestions in a merged analysis.
pub const MAX_TAG_SUGGESTIONS: usize = 5;

/// Monthly AI call count at which the first soft warning appears.
pub const USAGE_SOFT_LIMIT_100: u64 = 100;

/// Monthly AI call count at which the second soft warning appears.
pub const USAGE_SOFT_LIMIT_200: u64 = 200;

/// Monthly AI call count at which the remote AI source is disabled.
pub const USAGE_HARD_LIMIT: u64 = 300;

/// Flat token estimate for one document image sent to the AI service.
pub const IMAGE_TOKEN_ESTIMATE: u64 = 1_500;

/// Characters per token used when estimating text tokens.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Confidence assigned to server-side matching suggestions.
pub const SERVER_MATCH_CONFIDENCE: f32 = 0.75;

/// Minimum confidence for a local heuristic tag match to be reported.
pub const LOCAL_MATCH_MIN_CONFIDENCE: f32 = 0.3;

// =============================================================================
// ENVIRONMENT VARIABLES
// =============================================================================

/// Base URL of the document server.
pub const ENV_PAPERLESS_URL: &str = "PAPERLESS_URL";

/// API token for the document server.
pub const ENV_PAPERLESS_TOKEN: &str = "PAPERLESS_TOKEN";

/// Base URL of the remote AI analysis service.
pub const ENV_AI_SERVICE_URL: &str = "AI_SERVICE_URL";

/// API key for the remote AI analysis service.
pub const ENV_AI_SERVICE_KEY: &str = "AI_SERVICE_KEY";
