//! Upload queue service.
//!
//! Every enqueue stages first, so the store only ever references durable
//! files. Once a `queue_*` call returns, the upload belongs to the store and
//! the background worker; nothing the caller does afterwards cancels it.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use paperscan_core::defaults::UPLOAD_MAX_ATTEMPTS;
use paperscan_core::{
    BackgroundDispatcher, Error, FileRef, QueueEntry, QueueRepository, QueueStatus, Result,
    UploadMetadata,
};

use crate::stager::LocalFileStager;

pub struct UploadQueue {
    repo: Arc<dyn QueueRepository>,
    stager: Arc<LocalFileStager>,
    dispatcher: Arc<dyn BackgroundDispatcher>,
    max_attempts: u32,
}

impl UploadQueue {
    pub fn new(
        repo: Arc<dyn QueueRepository>,
        stager: Arc<LocalFileStager>,
        dispatcher: Arc<dyn BackgroundDispatcher>,
    ) -> Self {
        Self {
            repo,
            stager,
            dispatcher,
            max_attempts: UPLOAD_MAX_ATTEMPTS,
        }
    }

    /// Attempt budget given to new entries.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Queue a single file as one document.
    pub async fn queue_upload(&self, file: FileRef, metadata: UploadMetadata) -> Result<Uuid> {
        let staged = self.stager.stage(&file).await?;
        let entry = self.entry(vec![staged], false, metadata);
        let id = entry.id;
        self.persist(vec![entry]).await?;
        Ok(id)
    }

    /// Queue several pages merged into one document.
    pub async fn queue_multi_page_upload(
        &self,
        files: &[FileRef],
        metadata: UploadMetadata,
    ) -> Result<Uuid> {
        if files.is_empty() {
            return Err(Error::InvalidInput("no pages to upload".to_string()));
        }
        let staged = self.stager.stage_all(files).await?;
        let multi_page = staged.len() > 1;
        let entry = self.entry(staged, multi_page, metadata);
        let id = entry.id;
        self.persist(vec![entry]).await?;
        Ok(id)
    }

    /// Queue each page as its own document. With more than one page, titles
    /// get a `" (i/N)"` suffix.
    pub async fn queue_pages_separately(
        &self,
        files: &[FileRef],
        metadata: UploadMetadata,
    ) -> Result<Vec<Uuid>> {
        if files.is_empty() {
            return Err(Error::InvalidInput("no pages to upload".to_string()));
        }
        let staged = self.stager.stage_all(files).await?;
        let total = staged.len();

        let entries: Vec<QueueEntry> = staged
            .into_iter()
            .enumerate()
            .map(|(i, path)| {
                let meta = if total > 1 {
                    metadata.with_page_suffix(i + 1, total)
                } else {
                    metadata.clone()
                };
                self.entry(vec![path], false, meta)
            })
            .collect();

        let ids = entries.iter().map(|e| e.id).collect();
        self.persist(entries).await?;
        Ok(ids)
    }

    /// Queue pages grouped by identical metadata: one document per group.
    ///
    /// Groups are ordered by first appearance and pages keep their relative
    /// order within a group.
    pub async fn queue_page_groups(
        &self,
        pages: Vec<(FileRef, UploadMetadata)>,
    ) -> Result<Vec<Uuid>> {
        if pages.is_empty() {
            return Err(Error::InvalidInput("no pages to upload".to_string()));
        }

        let mut groups: Vec<(UploadMetadata, Vec<FileRef>)> = Vec::new();
        for (file, metadata) in pages {
            match groups.iter_mut().find(|(m, _)| *m == metadata) {
                Some((_, files)) => files.push(file),
                None => groups.push((metadata, vec![file])),
            }
        }

        let ordered: Vec<FileRef> = groups.iter().flat_map(|(_, f)| f.iter().cloned()).collect();
        let mut staged = self.stager.stage_all(&ordered).await?.into_iter();

        let entries: Vec<QueueEntry> = groups
            .into_iter()
            .map(|(metadata, files)| {
                let paths: Vec<PathBuf> = staged.by_ref().take(files.len()).collect();
                let multi_page = paths.len() > 1;
                self.entry(paths, multi_page, metadata)
            })
            .collect();

        info!(
            subsystem = "jobs",
            component = "upload_queue",
            op = "queue_page_groups",
            page_count = ordered.len(),
            groups = entries.len(),
            "Grouped pages by metadata"
        );

        let ids = entries.iter().map(|e| e.id).collect();
        self.persist(entries).await?;
        Ok(ids)
    }

    /// Entries still waiting for, or in, an upload.
    pub async fn pending_count(&self) -> Result<i64> {
        self.repo.pending_count().await
    }

    pub async fn list(&self) -> Result<Vec<QueueEntry>> {
        self.repo.list().await
    }

    /// Drop a failed entry and its staged files.
    pub async fn abandon(&self, id: Uuid) -> Result<()> {
        let entry = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("queue entry {id}")))?;
        if entry.status != QueueStatus::Failed {
            return Err(Error::InvalidInput(format!(
                "queue entry {id} is {}, only failed entries can be abandoned",
                entry.status
            )));
        }
        self.repo.delete(id).await?;
        self.stager.cleanup(&entry.files).await;
        info!(
            subsystem = "jobs",
            component = "upload_queue",
            op = "abandon",
            queue_id = %id,
            "Abandoned failed upload"
        );
        Ok(())
    }

    /// Give a failed entry a fresh attempt budget and wake the worker.
    pub async fn retry_failed(&self, id: Uuid) -> Result<()> {
        self.repo.reset(id).await?;
        self.dispatcher.schedule_immediate_upload();
        info!(
            subsystem = "jobs",
            component = "upload_queue",
            op = "retry_failed",
            queue_id = %id,
            "Failed upload requeued"
        );
        Ok(())
    }

    fn entry(&self, files: Vec<PathBuf>, multi_page: bool, metadata: UploadMetadata) -> QueueEntry {
        QueueEntry::new(files, multi_page, metadata).with_max_attempts(self.max_attempts)
    }

    /// Insert entries, then hand them to the dispatcher. On failure the
    /// entries and staged copies from this call are removed again.
    async fn persist(&self, entries: Vec<QueueEntry>) -> Result<()> {
        let mut inserted = Vec::with_capacity(entries.len());

        for entry in &entries {
            if let Err(e) = self.repo.insert(entry).await {
                warn!(
                    subsystem = "jobs",
                    component = "upload_queue",
                    op = "persist",
                    queue_id = %entry.id,
                    error = %e,
                    "Queue write failed, rolling back"
                );
                for id in inserted {
                    if let Err(e) = self.repo.delete(id).await {
                        warn!(
                            subsystem = "jobs",
                            component = "upload_queue",
                            queue_id = %id,
                            error = %e,
                            "Rollback delete failed"
                        );
                    }
                }
                let staged: Vec<PathBuf> =
                    entries.iter().flat_map(|e| e.files.iter().cloned()).collect();
                self.stager.cleanup(&staged).await;
                return Err(match e {
                    Error::QueuePersistence(_) => e,
                    other => Error::QueuePersistence(other.to_string()),
                });
            }
            inserted.push(entry.id);
        }

        for entry in &entries {
            info!(
                subsystem = "jobs",
                component = "upload_queue",
                op = "enqueue",
                queue_id = %entry.id,
                page_count = entry.files.len(),
                "Upload queued"
            );
        }
        self.dispatcher.schedule_immediate_upload();
        Ok(())
    }
}
