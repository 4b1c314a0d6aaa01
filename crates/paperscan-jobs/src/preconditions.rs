//! Storage and file size preconditions.
//!
//! Checks run before anything is staged or queued, so a failed check leaves
//! no side effects behind.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use paperscan_core::defaults::{MAX_FILE_SIZE_BYTES, STORAGE_SAFETY_MARGIN_BYTES};
use paperscan_core::{ContentSource, Error, FileRef, Result, StorageStats};

/// Free space on the volume holding `path`, via `fs2`.
#[derive(Debug, Clone)]
pub struct FsStorageStats {
    path: PathBuf,
}

impl FsStorageStats {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StorageStats for FsStorageStats {
    async fn available_bytes(&self) -> Result<u64> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            // The staging directory may not exist yet; measure its nearest
            // existing ancestor.
            let probe = path
                .ancestors()
                .find(|p| p.exists())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            fs2::available_space(&probe).map_err(Error::Io)
        })
        .await
        .map_err(|e| Error::Internal(format!("storage stats task failed: {e}")))?
    }
}

/// Validates candidate files against size policy and free storage.
pub struct PreconditionChecker {
    content: Arc<dyn ContentSource>,
    storage: Arc<dyn StorageStats>,
    max_file_size: u64,
    safety_margin: u64,
}

impl PreconditionChecker {
    pub fn new(content: Arc<dyn ContentSource>, storage: Arc<dyn StorageStats>) -> Self {
        Self {
            content,
            storage,
            max_file_size: MAX_FILE_SIZE_BYTES,
            safety_margin: STORAGE_SAFETY_MARGIN_BYTES,
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_safety_margin(mut self, bytes: u64) -> Self {
        self.safety_margin = bytes;
        self
    }

    /// Size of one file in bytes.
    pub async fn file_size(&self, file: &FileRef) -> Result<u64> {
        match file {
            FileRef::Local(path) => {
                let meta = tokio::fs::metadata(path)
                    .await
                    .map_err(|e| Error::FileUnreadable(format!("{}: {}", path.display(), e)))?;
                Ok(meta.len())
            }
            FileRef::Transient { uri, .. } => self.content.size(uri).await?.ok_or_else(|| {
                Error::FileUnreadable(format!("size of {} is unknown", file.display_name()))
            }),
        }
    }

    /// Fail with `FileTooLarge` or `StorageInsufficient` when the files
    /// cannot be staged.
    pub async fn check_storage(&self, files: &[FileRef]) -> Result<()> {
        let mut required: u64 = 0;
        for file in files {
            let size = self.file_size(file).await?;
            if size > self.max_file_size {
                warn!(
                    subsystem = "jobs",
                    component = "preconditions",
                    bytes = size,
                    limit = self.max_file_size,
                    "File exceeds size limit"
                );
                return Err(Error::FileTooLarge {
                    name: file.display_name(),
                    size,
                    limit: self.max_file_size,
                });
            }
            required = required.saturating_add(size);
        }

        let required = required.saturating_add(self.safety_margin);
        let available = self.storage.available_bytes().await?;
        if available < required {
            warn!(
                subsystem = "jobs",
                component = "preconditions",
                required,
                available,
                "Insufficient storage"
            );
            return Err(Error::StorageInsufficient {
                required,
                available,
            });
        }

        debug!(
            subsystem = "jobs",
            component = "preconditions",
            page_count = files.len(),
            required,
            available,
            "Storage preconditions satisfied"
        );
        Ok(())
    }
}
