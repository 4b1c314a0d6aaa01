//! # paperscan-db
//!
//! SQLite persistence layer for paperscan.
//!
//! This crate provides:
//! - Connection pool management
//! - The durable upload queue (`SqliteQueueRepository`)
//! - The monthly AI usage ledger (`SqliteUsageRepository`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use paperscan_db::{Database, QueueEntry, QueueRepository, UploadMetadata};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("sqlite://paperscan.db").await?;
//!     db.migrate().await?;
//!
//!     let entry = QueueEntry::new(vec!["/data/staging/a.pdf".into()], false, UploadMetadata::new());
//!     db.queue.insert(&entry).await?;
//!     Ok(())
//! }
//! ```
pub mod pool;
pub mod queue;
pub mod usage;

// Re-export core types
pub use paperscan_core::*;

pub use pool::{
    create_memory_pool, create_pool, create_pool_with_config, log_pool_metrics, PoolConfig,
};
pub use queue::SqliteQueueRepository;
pub use usage::SqliteUsageRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Sqlite>,
    /// Durable upload queue.
    pub queue: SqliteQueueRepository,
    /// AI usage ledger.
    pub usage: SqliteUsageRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Sqlite>) -> Self {
        Self {
            queue: SqliteQueueRepository::new(pool.clone()),
            usage: SqliteUsageRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Private in-memory database with migrations applied. Used by tests and
    /// dry runs.
    pub async fn connect_in_memory() -> Result<Self> {
        let db = Self::new(create_memory_pool().await?);
        db.migrate().await?;
        Ok(db)
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        &self.pool
    }
}
