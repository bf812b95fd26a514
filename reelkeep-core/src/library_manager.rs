use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::database::RecordStore;
use crate::error::{ReconcileError, ScanError, StoreError, StoreResult};
use crate::filename_parser::FilenameParser;
use crate::media::{Library, LibraryKind};
use crate::providers::MetadataCatalog;
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::scanner::{ScanSummary, Scanner};
use crate::settings::CoreSettings;
use crate::worker_pool::WorkerPool;

/// What one activation did to one library.
#[derive(Debug)]
pub struct LibraryOutcome {
    pub library: Library,
    pub scan: Result<ScanSummary, ScanError>,
    pub reconcile: Result<ReconcileReport, ReconcileError>,
}

impl LibraryOutcome {
    pub fn is_ok(&self) -> bool {
        self.scan.is_ok() && self.reconcile.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct ActivationReport {
    pub outcomes: Vec<LibraryOutcome>,
    pub elapsed: Duration,
}

impl ActivationReport {
    pub fn failed_libraries(&self) -> usize {
        self.outcomes.iter().filter(|outcome| !outcome.is_ok()).count()
    }
}

/// Runs probe then reconcile for every stored library.
pub struct LibraryManager {
    store: Arc<dyn RecordStore>,
    scanner: Scanner,
    reconciler: Reconciler,
    pool: WorkerPool,
    activation: Mutex<()>,
}

impl fmt::Debug for LibraryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryManager")
            .field("scanner", &self.scanner)
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

impl LibraryManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        catalog: Arc<dyn MetadataCatalog>,
        settings: CoreSettings,
    ) -> Self {
        let pool = WorkerPool::new(settings.reconciler.max_in_flight);
        let scanner = Scanner::new(
            Arc::clone(&store),
            FilenameParser::new(settings.parser),
            settings.scanner,
        );
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            catalog,
            pool.clone(),
            settings.reconciler,
        );
        Self {
            store,
            scanner,
            reconciler,
            pool,
            activation: Mutex::new(()),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub async fn libraries(&self) -> StoreResult<Vec<Library>> {
        self.store.libraries().await
    }

    /// Registers a library, or returns the one already stored for its root.
    pub async fn ensure_library(&self, library: Library) -> StoreResult<Library> {
        let stored = self.store.find_or_create_library(library).await?;
        info!(
            library = %stored.name,
            path = %stored.root_path.display(),
            kind = %stored.kind,
            "Library registered"
        );
        Ok(stored)
    }

    /// Creates a movies library at `root` when the store has no library at
    /// all.
    pub async fn seed_default_library(&self, root: &Path) -> StoreResult<Option<Library>> {
        if !self.store.libraries().await?.is_empty() {
            return Ok(None);
        }
        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Movies".to_string());
        let library = self
            .ensure_library(Library::new(name, root, LibraryKind::Movies))
            .await?;
        Ok(Some(library))
    }

    /// Probes and reconciles every library, one after the other.
    ///
    /// Calls are serialized; a second caller waits for the running pass.
    /// Per-library failures are reported in the outcome, only failing to
    /// list the libraries is an error.
    pub async fn activate_all(&self) -> Result<ActivationReport, StoreError> {
        let _guard = self.activation.lock().await;
        let started = Instant::now();

        let libraries = self.store.libraries().await?;
        info!("Activating {} libraries", libraries.len());

        let mut report = ActivationReport::default();
        for library in libraries {
            report.outcomes.push(self.activate(library).await);
        }
        report.elapsed = started.elapsed();

        info!(
            "Activation finished in {:?}, {} libraries failed",
            report.elapsed,
            report.failed_libraries()
        );
        Ok(report)
    }

    async fn activate(&self, library: Library) -> LibraryOutcome {
        let scan = self.scanner.probe(&library).await;
        if let Err(err) = &scan {
            error!(library = %library.name, "Probe failed: {}", err);
        }

        // Records stored before a failed probe still deserve a lookup.
        let reconcile = self.reconciler.update_md(&library).await;
        if let Err(err) = &reconcile {
            warn!(library = %library.name, "Reconcile failed: {}", err);
        }

        LibraryOutcome {
            library,
            scan,
            reconcile,
        }
    }

    /// Waits for running catalog jobs and refuses new ones.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        info!("Library manager stopped");
    }
}
