//! # paperscan-jobs
//!
//! Offline-first upload pipeline for paperscan.
//!
//! This crate provides:
//! - Staging of transient file handles into durable app storage
//! - Storage and file size preconditions
//! - The upload queue service over a durable `QueueRepository`
//! - A bounded exponential-backoff retry controller
//! - The background upload worker, with events via broadcast channels
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use paperscan_jobs::{LocalFileStager, UploadQueue, WorkerBuilder, WorkerConfig};
//!
//! let worker = WorkerBuilder::new(queue_repo.clone(), client.clone(), reachability)
//!     .with_config(WorkerConfig::from_env())
//!     .with_stager(stager.clone())
//!     .build();
//! let queue = UploadQueue::new(queue_repo, stager, Arc::new(worker.dispatcher()));
//!
//! let handle = worker.start();
//! let id = queue.queue_upload(FileRef::local("/scans/a.jpg"), UploadMetadata::new()).await?;
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//! handle.shutdown().await?;
//! ```

pub mod content;
pub mod preconditions;
pub mod queue;
pub mod retry;
pub mod stager;
pub mod worker;

// Re-export core types
pub use paperscan_core::*;

pub use content::FsContentSource;
pub use preconditions::{FsStorageStats, PreconditionChecker};
pub use queue::UploadQueue;
pub use retry::{retry_if, retry_with_backoff, RetryAttempt, RetryPolicy};
pub use stager::LocalFileStager;
pub use worker::{
    wait_for_terminal, NotifyDispatcher, UploadWorker, WorkerBuilder, WorkerConfig, WorkerEvent,
    WorkerHandle,
};

/// Default polling interval for the upload worker (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = paperscan_core::defaults::WORKER_POLL_INTERVAL_MS;
