use std::path::PathBuf;

use thiserror::Error;

use crate::media::CatalogId;
use crate::providers::CatalogError;

/// Failures raised by a [`RecordStore`](crate::database::RecordStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint on a natural key rejected the write.
    #[error("Conflicting record for natural key: {0}")]
    Conflict(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Failures that abort a library probe.
///
/// Per-file parse failures and dangling symlinks never surface here; they are
/// logged and counted in the [`ScanSummary`](crate::scanner::ScanSummary).
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Library root does not exist or is not a directory: {0}")]
    RootMissing(PathBuf),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Walk task failed: {0}")]
    Task(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failures returned from the reconciliation passes.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Catalog search for '{title}' failed: {source}")]
    Search {
        title: String,
        #[source]
        source: CatalogError,
    },

    /// Movie and series passes persist the search fields instead of
    /// returning this.
    #[error("Catalog lookup for id {catalog_id} failed: {source}")]
    Fetch {
        catalog_id: CatalogId,
        #[source]
        source: CatalogError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Parent record is missing: {0}")]
    UnresolvedParent(String),

    #[error("Episode number '{0}' is not numeric")]
    InvalidEpisodeNumber(String),

    #[error("Worker pool is shut down")]
    PoolClosed,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
