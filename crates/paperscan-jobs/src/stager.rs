//! Local file stager.
//!
//! Copies transient file handles into app-owned storage so queued uploads
//! survive the loss of the original permission grant and process restarts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use paperscan_core::{ContentSource, Error, FileRef, Result};

/// Stages files into a private staging directory.
pub struct LocalFileStager {
    staging_dir: PathBuf,
    content: Arc<dyn ContentSource>,
}

impl LocalFileStager {
    pub fn new(staging_dir: impl Into<PathBuf>, content: Arc<dyn ContentSource>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            content,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Whether `path` is a copy this stager owns.
    pub fn is_staged(&self, path: &Path) -> bool {
        path.starts_with(&self.staging_dir)
    }

    /// Return a durable path for `file`.
    ///
    /// Local files are returned as-is after checking they exist and are not
    /// empty. Transient handles are copied; the source is never modified.
    pub async fn stage(&self, file: &FileRef) -> Result<PathBuf> {
        match file {
            FileRef::Local(path) => {
                let meta = fs::metadata(path)
                    .await
                    .map_err(|e| Error::FileUnreadable(format!("{}: {}", path.display(), e)))?;
                if !meta.is_file() || meta.len() == 0 {
                    return Err(Error::FileUnreadable(format!(
                        "{} is empty or not a file",
                        path.display()
                    )));
                }
                Ok(path.clone())
            }
            FileRef::Transient { uri, .. } => {
                let target = self.target_path(file);
                match self.copy_into(uri, &target).await {
                    Ok(bytes) => {
                        debug!(
                            subsystem = "jobs",
                            component = "stager",
                            op = "stage",
                            bytes,
                            target = %target.display(),
                            "Staged transient file"
                        );
                        Ok(target)
                    }
                    Err(e) => {
                        remove_quietly(&target).await;
                        remove_quietly(&partial_path(&target)).await;
                        warn!(
                            subsystem = "jobs",
                            component = "stager",
                            op = "stage",
                            error = %e,
                            "Staging failed"
                        );
                        Err(match e {
                            Error::Staging(_) => e,
                            other => Error::Staging(format!("{}: {}", file.display_name(), other)),
                        })
                    }
                }
            }
        }
    }

    /// Stage every page in order. If one fails, copies already made by this
    /// call are removed before the error is returned.
    pub async fn stage_all(&self, files: &[FileRef]) -> Result<Vec<PathBuf>> {
        let mut staged = Vec::with_capacity(files.len());
        for file in files {
            match self.stage(file).await {
                Ok(path) => staged.push(path),
                Err(e) => {
                    self.rollback(files, &staged).await;
                    return Err(e);
                }
            }
        }
        Ok(staged)
    }

    /// Remove staged copies. Paths outside the staging directory are left
    /// alone, so durable originals passed through `stage` are never deleted.
    pub async fn cleanup(&self, paths: &[PathBuf]) {
        let mut removed = 0usize;
        for path in paths.iter().filter(|p| self.is_staged(p)) {
            match fs::remove_file(path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    subsystem = "jobs",
                    component = "stager",
                    op = "cleanup",
                    path = %path.display(),
                    error = %e,
                    "Failed to remove staged file"
                ),
            }
        }
        if removed > 0 {
            info!(
                subsystem = "jobs",
                component = "stager",
                op = "cleanup",
                removed,
                "Removed staged files"
            );
        }
    }

    async fn rollback(&self, files: &[FileRef], staged: &[PathBuf]) {
        // Only copies of transient handles were created by this call.
        let copies: Vec<PathBuf> = files
            .iter()
            .zip(staged)
            .filter(|(file, _)| !file.is_durable())
            .map(|(_, path)| path.clone())
            .collect();
        self.cleanup(&copies).await;
    }

    fn target_path(&self, file: &FileRef) -> PathBuf {
        let mut name = paperscan_core::new_v7().to_string();
        if let Some(ext) = file.extension() {
            name.push('.');
            name.push_str(&ext);
        }
        self.staging_dir.join(name)
    }

    async fn copy_into(&self, uri: &str, target: &Path) -> Result<u64> {
        fs::create_dir_all(&self.staging_dir).await?;

        let mut reader = self.content.open(uri).await?;

        // Atomic write: partial file + rename
        let partial = partial_path(target);
        let mut out = fs::File::create(&partial).await?;
        let copied = tokio::io::copy(&mut reader, &mut out).await?;
        out.flush().await?;
        out.sync_all().await?;
        drop(out);
        fs::rename(&partial, target).await?;

        let written = fs::metadata(target).await?.len();
        if copied == 0 || written != copied {
            return Err(Error::Staging(format!(
                "integrity check failed: copied {copied} bytes, found {written}"
            )));
        }
        Ok(copied)
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn remove_quietly(path: &Path) {
    let _ = fs::remove_file(path).await;
}
