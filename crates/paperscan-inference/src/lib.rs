//! # paperscan-inference
//!
//! Tag, title and metadata suggestions for scanned documents.
//!
//! This crate provides:
//! - The `SuggestionProvider` trait shared by every suggestion source
//! - A remote AI analysis provider (HTTP)
//! - The document server's own matching as a secondary source
//! - Offline tag matching against the known tag catalog
//! - Priority merge of provider results
//! - Monthly AI usage tracking with tiered limits
//! - `SuggestionOrchestrator`, the fallback chain tying it together
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use paperscan_inference::{SuggestionOrchestrator, UsageTracker};
//!
//! let orchestrator = SuggestionOrchestrator::new(settings, reachability, usage)
//!     .with_remote_ai(Arc::new(RemoteAiProvider::from_env().unwrap()));
//! let result = orchestrator.get_suggestions(&bytes, Some(text), None, false).await;
//! ```

pub mod image;
pub mod local;
pub mod merge;
pub mod orchestrator;
pub mod provider;
pub mod remote_ai;
pub mod server_match;
pub mod usage;

// Mock suggestion sources for testing
#[cfg(test)]
pub mod mock;

// Re-export core types
pub use paperscan_core::*;

pub use image::{decode_image, DecodedImage};
pub use local::LocalTagMatcher;
pub use merge::merge_analyses;
pub use orchestrator::SuggestionOrchestrator;
pub use provider::{AnalysisInput, CatalogSnapshot, SuggestionProvider};
pub use remote_ai::RemoteAiProvider;
pub use server_match::ServerMatchProvider;
pub use usage::{estimate_tokens, UsageTracker};
