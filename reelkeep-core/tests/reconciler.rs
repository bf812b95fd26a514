mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use reelkeep_core::{
    CatalogError, FilenameParser, InMemoryStore, Library, LibraryKind, MediaItem,
    MetadataCatalog, MovieItem, ReconcileError, Reconciler, ReconcilerSettings, RecordFilter,
    RecordStore, Scanner, ScannerSettings, SearchErrorPolicy, WorkerPool,
};
use support::{StubCatalog, create_test_file, movie_candidate, series_candidate};
use tempfile::TempDir;

fn settings(timeout_ms: u64, policy: SearchErrorPolicy) -> ReconcilerSettings {
    ReconcilerSettings {
        catalog_timeout_ms: timeout_ms,
        search_error_policy: policy,
        max_in_flight: 4,
    }
}

fn reconciler(
    store: Arc<InMemoryStore>,
    catalog: Arc<dyn MetadataCatalog>,
    settings: ReconcilerSettings,
) -> Reconciler {
    let pool = WorkerPool::new(settings.max_in_flight);
    Reconciler::new(store, catalog, pool, settings)
}

async fn movie_library(store: &InMemoryStore) -> Result<Library> {
    Ok(store
        .find_or_create_library(Library::new("Movies", "/media/movies", LibraryKind::Movies))
        .await?)
}

async fn unresolved_movie(
    store: &InMemoryStore,
    library: &Library,
    title: &str,
) -> Result<MovieItem> {
    let file_name = format!("{title}.mkv");
    let movie = MovieItem::new(MediaItem {
        file_path: library.root_path.join(&file_name),
        file_name,
        size: 1024,
        title: title.to_string(),
        year: None,
        library_id: library.id,
    });
    store.create_movie(&movie).await?;
    Ok(movie)
}

#[tokio::test]
async fn exact_title_beats_first_result() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let library = movie_library(&store).await?;
    let movie = unresolved_movie(&store, &library, "The Walking Dead").await?;

    let catalog = StubCatalog::with_movies(
        "The Walking Dead",
        vec![
            movie_candidate(1, "Fear the Walking Dead"),
            movie_candidate(2, "The Walking Dead"),
        ],
    );
    let reconciler = reconciler(
        store.clone(),
        Arc::new(catalog),
        settings(1_000, SearchErrorPolicy::Abort),
    );

    let report = reconciler.update_movie_md(&library).await?;
    assert_eq!(report.resolved, 1);

    let stored = store.get_movie(movie.id).await?.unwrap();
    assert_eq!(stored.media.title, "The Walking Dead");
    assert_eq!(stored.catalog_id, Some(2));
    Ok(())
}

#[tokio::test]
async fn no_results_leaves_record_unresolved() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let library = movie_library(&store).await?;
    let movie = unresolved_movie(&store, &library, "Nobody Knows This").await?;

    let reconciler = reconciler(
        store.clone(),
        Arc::new(StubCatalog::default()),
        settings(1_000, SearchErrorPolicy::Abort),
    );
    let report = reconciler.update_movie_md(&library).await?;
    assert_eq!(report.unmatched, 1);

    let stored = store.get_movie(movie.id).await?.unwrap();
    assert_eq!(stored.catalog_id, None);
    assert_eq!(stored, movie);
    Ok(())
}

#[tokio::test]
async fn matched_records_leave_the_unresolved_set() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let library = movie_library(&store).await?;
    let known = unresolved_movie(&store, &library, "Heat").await?;
    let unknown = unresolved_movie(&store, &library, "Obscure Thing").await?;

    let unresolved = store
        .query_movies(&RecordFilter::unresolved_in(library.id))
        .await?;
    assert_eq!(unresolved.len(), 2);

    let catalog = Arc::new(StubCatalog::with_movies("Heat", vec![movie_candidate(949, "Heat")]));
    let reconciler = reconciler(
        store.clone(),
        catalog.clone(),
        settings(1_000, SearchErrorPolicy::Abort),
    );
    reconciler.update_movie_md(&library).await?;

    let unresolved = store
        .query_movies(&RecordFilter::unresolved_in(library.id))
        .await?;
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].id, unknown.id);
    assert!(unresolved.iter().all(|movie| movie.id != known.id));

    // The second pass only retries what is still unresolved.
    let calls_before = catalog.calls();
    let report = reconciler.update_movie_md(&library).await?;
    assert_eq!(report.attempted, 1);
    assert_eq!(catalog.calls() - calls_before, 1);
    Ok(())
}

#[tokio::test]
async fn search_timeout_follows_error_policy() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let library = movie_library(&store).await?;
    let movie = unresolved_movie(&store, &library, "Heat").await?;

    let mut slow = StubCatalog::with_movies("Heat", vec![movie_candidate(949, "Heat")]);
    slow.search_delay = Some(Duration::from_secs(5));
    let catalog: Arc<dyn MetadataCatalog> = Arc::new(slow);

    let aborting = reconciler(
        store.clone(),
        catalog.clone(),
        settings(50, SearchErrorPolicy::Abort),
    );
    let err = aborting.update_movie_md(&library).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Search {
            source: CatalogError::Timeout(_),
            ..
        }
    ));

    let skipping = reconciler(store.clone(), catalog, settings(50, SearchErrorPolicy::Skip));
    let report = skipping.update_movie_md(&library).await?;
    assert_eq!(report.failed, 1);
    assert_eq!(store.get_movie(movie.id).await?.unwrap().catalog_id, None);
    Ok(())
}

#[tokio::test]
async fn stuck_episode_lookup_does_not_hold_back_other_series() -> Result<()> {
    let dir = TempDir::new()?;
    for episode in 1..=3 {
        create_test_file(dir.path(), &format!("Fast Show/Fast Show S01E0{episode}.mkv"));
        create_test_file(dir.path(), &format!("Stuck Show/Stuck Show S01E0{episode}.mkv"));
    }

    let store = Arc::new(InMemoryStore::new());
    let library = store
        .find_or_create_library(Library::new("Shows", dir.path(), LibraryKind::Series))
        .await?;
    Scanner::new(store.clone(), FilenameParser::default(), ScannerSettings::default())
        .probe(&library)
        .await?;

    let mut stub = StubCatalog::default();
    stub.series
        .insert("Fast Show".to_string(), vec![series_candidate(10, "Fast Show")]);
    stub.series
        .insert("Stuck Show".to_string(), vec![series_candidate(20, "Stuck Show")]);
    stub.slow_series.push(20);

    let reconciler = reconciler(
        store.clone(),
        Arc::new(stub),
        settings(200, SearchErrorPolicy::Abort),
    );

    let started = Instant::now();
    let report = reconciler.update_tv_md(&library).await?;
    // Each stuck lookup is cut off by its own timeout, never by the others.
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(report.failures.len(), 3);
    assert!(report.failures.iter().all(|failure| matches!(
        failure.error,
        ReconcileError::Fetch {
            catalog_id: 20,
            source: CatalogError::Timeout(_)
        }
    )));

    let unresolved = store
        .query_episodes(&RecordFilter::unresolved_in(library.id))
        .await?;
    assert_eq!(unresolved.len(), 3);
    assert!(unresolved.iter().all(|episode| episode.media.title == "Stuck Show"));
    Ok(())
}

#[tokio::test]
async fn failed_season_lookup_does_not_stop_episodes() -> Result<()> {
    let dir = TempDir::new()?;
    create_test_file(dir.path(), "Broken Show/Broken Show S01E01.mkv");
    create_test_file(dir.path(), "Broken Show/Broken Show S01E02.mkv");

    let store = Arc::new(InMemoryStore::new());
    let library = store
        .find_or_create_library(Library::new("Shows", dir.path(), LibraryKind::Series))
        .await?;
    Scanner::new(store.clone(), FilenameParser::default(), ScannerSettings::default())
        .probe(&library)
        .await?;

    let mut stub = StubCatalog::default();
    stub.series
        .insert("Broken Show".to_string(), vec![series_candidate(5, "Broken Show")]);
    stub.failing_seasons.push(5);

    let reconciler = reconciler(
        store.clone(),
        Arc::new(stub),
        settings(1_000, SearchErrorPolicy::Abort),
    );
    let report = reconciler.update_tv_md(&library).await?;

    assert_eq!(report.failed, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0].error,
        ReconcileError::Fetch {
            catalog_id: 5,
            source: CatalogError::Api(_)
        }
    ));

    let seasons = store
        .query_seasons(&RecordFilter::unresolved_in(library.id))
        .await?;
    assert_eq!(seasons.len(), 1);
    let episodes = store
        .query_episodes(&RecordFilter::unresolved_in(library.id))
        .await?;
    assert!(episodes.is_empty());
    Ok(())
}

#[tokio::test]
async fn rematch_overrides_previous_match() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let library = movie_library(&store).await?;
    let movie = unresolved_movie(&store, &library, "Heat").await?;

    let mut stub = StubCatalog::with_movies("Heat", vec![movie_candidate(949, "Heat")]);
    stub.movies
        .insert("Heat 1986".to_string(), vec![movie_candidate(1986, "Heat (1986)")]);
    let reconciler = reconciler(
        store.clone(),
        Arc::new(stub),
        settings(1_000, SearchErrorPolicy::Abort),
    );
    reconciler.update_movie_md(&library).await?;
    assert_eq!(store.get_movie(movie.id).await?.unwrap().catalog_id, Some(949));

    let updated = reconciler.rematch_movie(movie.id, 1986).await?;
    assert_eq!(updated.catalog_id, Some(1986));
    assert_eq!(updated.imdb_id.as_deref(), Some("tt0001986"));
    assert_eq!(store.get_movie(movie.id).await?.unwrap(), updated);
    Ok(())
}
