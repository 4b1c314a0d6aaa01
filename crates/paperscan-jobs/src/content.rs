//! Filesystem-backed content source.
//!
//! Resolves `file://` URIs and bare paths. Used where transient handles are
//! plain files, such as the command line and tests.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use paperscan_core::{ContentSource, Error, Result};

#[derive(Debug, Clone, Default)]
pub struct FsContentSource;

impl FsContentSource {
    pub fn new() -> Self {
        Self
    }

    fn path_for(uri: &str) -> PathBuf {
        PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
    }
}

#[async_trait]
impl ContentSource for FsContentSource {
    async fn open(&self, uri: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = tokio::fs::File::open(Self::path_for(uri))
            .await
            .map_err(|e| Error::FileUnreadable(format!("{uri}: {e}")))?;
        Ok(Box::new(file))
    }

    async fn size(&self, uri: &str) -> Result<Option<u64>> {
        match tokio::fs::metadata(Self::path_for(uri)).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::FileUnreadable(format!("{uri}: {e}"))),
        }
    }
}
