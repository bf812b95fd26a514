pub mod database;
pub mod error;
pub mod filename_parser;
pub mod library_manager;
pub mod media;
pub mod providers;
pub mod reconciler;
pub mod refresh;
pub mod scanner;
pub mod settings;
pub mod worker_pool;

pub use database::*;
pub use error::*;
pub use filename_parser::{FilenameParser, ParsedEpisode, ParsedMovie};
pub use library_manager::{ActivationReport, LibraryManager, LibraryOutcome};
pub use media::*;
pub use providers::{CatalogError, MetadataCatalog, SearchOptions, TmdbCatalog, TmdbOptions};
pub use reconciler::{ReconcileReport, Reconciler, Resolution};
pub use refresh::{Refresh, RefreshHandle, RefreshReason, spawn_refresh_loop};
pub use scanner::{ScanSummary, Scanner};
pub use settings::*;
pub use worker_pool::{JobFailure, PoolClosed, PoolReport, WorkerPool};

/// Embedded schema migrations for [`PostgresStore`].
#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
