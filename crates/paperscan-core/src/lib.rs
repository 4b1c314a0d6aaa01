//! # paperscan-core
//!
//! Core types, traits, and abstractions for the paperscan upload client.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other paperscan crates depend on: upload requests and queue
//! entries, the upload state machine's states, suggestion results, the error
//! taxonomy, and the interfaces of every external collaborator (document
//! server, catalog repositories, reachability, storage, persistence).

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod state;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use state::StateHolder;
pub use traits::*;

/// Generate a new time-ordered UUIDv7.
pub fn new_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}
