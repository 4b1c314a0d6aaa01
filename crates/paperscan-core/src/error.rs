//! Error types for paperscan.

use thiserror::Error;

/// Result type alias using paperscan's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for paperscan operations.
///
/// Variants follow the upload pipeline's failure taxonomy: precondition
/// failures, file integrity failures, transport failures, server rejections,
/// persistence failures and suggestion failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Not enough free device storage for the candidate files
    #[error("Insufficient storage: {required} bytes required, {available} bytes available")]
    StorageInsufficient { required: u64, available: u64 },

    /// A single file exceeds the per-file size policy
    #[error("File too large: {name} is {size} bytes (limit {limit})")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    /// File bytes could not be opened or read
    #[error("File unreadable: {0}")]
    FileUnreadable(String),

    /// Copying a file into durable storage failed
    #[error("Staging failed: {0}")]
    Staging(String),

    /// Host unreachable, DNS failure or connection refused
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// Request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Entity with the same unique name already exists on the server
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// Writing to the upload queue failed
    #[error("Queue persistence failed: {0}")]
    QueuePersistence(String),

    /// Input image could not be decoded
    #[error("Image could not be decoded: {0}")]
    AnalysisDecode(String),

    /// A suggestion source failed
    #[error("Suggestion source failed: {0}")]
    AnalysisSource(String),

    /// Monthly AI usage hard limit reached
    #[error("Usage limit reached: {0}")]
    UsageLimitReached(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request failed for a reason other than connect/timeout/status
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same request can change the outcome.
    ///
    /// Transport failures, 5xx, 408 and 429 and generic I/O are transient.
    /// Authorization, permission and payload rejections, unreadable files,
    /// invalid input and precondition failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NetworkUnreachable(_) | Error::Timeout(_) | Error::Request(_) | Error::Io(_) => {
                true
            }
            Error::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_connect() {
            Error::NetworkUnreachable(e.to_string())
        } else if let Some(status) = e.status() {
            Error::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Error::Request(e.to_string())
        }
    }
}
