//! # paperscan-app
//!
//! Composition root and platform adapters for the paperscan upload client.
//!
//! This crate provides:
//! - `PaperlessClient`, the document server API client
//! - `HttpReachabilityMonitor`, connectivity and server reachability
//! - `CatalogService` and the delayed double refresh
//! - `UploadViewModel`, the upload screen state machine
//! - `AppConfig` and logging setup for the `paperscan` binary

pub mod app;
pub mod catalog;
pub mod client;
pub mod config;
pub mod logging;
pub mod reachability;
pub mod refresh;
pub mod upload;

pub use app::App;
pub use catalog::CatalogService;
pub use client::PaperlessClient;
pub use config::AppConfig;
pub use reachability::HttpReachabilityMonitor;
pub use refresh::{delayed_refresh, REFRESH_DELAY};
pub use upload::{UploadStrategy, UploadViewModel};
