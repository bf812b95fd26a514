mod support;

use std::sync::Arc;

use anyhow::Result;
use reelkeep_core::{
    FilenameParser, InMemoryStore, Library, LibraryKind, RecordFilter, RecordKind,
    RecordStore, ScanError, Scanner, ScannerSettings,
};
use support::{FailingStore, create_test_file};
use tempfile::TempDir;

fn scanner(store: Arc<dyn RecordStore>) -> Scanner {
    Scanner::new(store, FilenameParser::default(), ScannerSettings::default())
}

#[tokio::test]
async fn second_probe_of_unchanged_tree_creates_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    create_test_file(dir.path(), "North of the Sun (2016).mkv");
    create_test_file(dir.path(), "nested/Heat (1995).mp4");
    create_test_file(dir.path(), "The.Dark.Knight.2008.1080p.BluRay.x264-GROUP.mkv");
    create_test_file(dir.path(), "nested/cover.jpg");

    let store = Arc::new(InMemoryStore::new());
    let library = store
        .find_or_create_library(Library::new("Movies", dir.path(), LibraryKind::Movies))
        .await?;
    let scanner = scanner(store.clone());

    let first = scanner.probe(&library).await?;
    assert_eq!(first.created, 3);
    assert_eq!(first.unsupported, 1);

    let second = scanner.probe(&library).await?;
    assert_eq!(second.created, 0);
    assert_eq!(second.existing, 3);

    let total = store
        .count_where(RecordKind::Movie, &RecordFilter::in_library(library.id))
        .await?;
    assert_eq!(total, 3);

    let movies = store.query_movies(&RecordFilter::in_library(library.id)).await?;
    let mut titles: Vec<_> = movies
        .iter()
        .map(|movie| (movie.media.title.as_str(), movie.media.year))
        .collect();
    titles.sort();
    assert_eq!(
        titles,
        vec![
            ("Heat", Some(1995)),
            ("North of the Sun", Some(2016)),
            ("The Dark Knight", Some(2008)),
        ]
    );
    assert!(movies.iter().all(|movie| movie.catalog_id.is_none()));
    Ok(())
}

#[tokio::test]
async fn concurrent_probes_never_duplicate_paths() -> Result<()> {
    let dir = TempDir::new()?;
    for show in ["Alpha", "Beta", "Gamma"] {
        for episode in 1..=4 {
            create_test_file(dir.path(), &format!("{show}/{show} S01E0{episode}.mkv"));
        }
    }

    let store = Arc::new(InMemoryStore::new());
    let library = store
        .find_or_create_library(Library::new("Shows", dir.path(), LibraryKind::Series))
        .await?;
    let first = scanner(store.clone());
    let second = scanner(store.clone());

    let (a, b) = tokio::join!(first.probe(&library), second.probe(&library));
    let (a, b) = (a?, b?);
    assert_eq!(a.created + b.created, 12);

    let filter = RecordFilter::in_library(library.id);
    assert_eq!(store.count_where(RecordKind::Episode, &filter).await?, 12);
    assert_eq!(store.count_where(RecordKind::Series, &filter).await?, 3);
    assert_eq!(store.count_where(RecordKind::Season, &filter).await?, 3);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn broken_symlink_is_skipped() -> Result<()> {
    let dir = TempDir::new()?;
    create_test_file(dir.path(), "Heat (1995).mkv");
    std::os::unix::fs::symlink(
        dir.path().join("gone (2001).mkv"),
        dir.path().join("Dangling (2001).mkv"),
    )?;

    let store = Arc::new(InMemoryStore::new());
    let library = store
        .find_or_create_library(Library::new("Movies", dir.path(), LibraryKind::Movies))
        .await?;

    let summary = scanner(store.clone()).probe(&library).await?;
    assert_eq!(summary.created, 1);
    assert_eq!(summary.broken_links, 1);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_directory_aborts_before_any_write() -> Result<()> {
    use std::fs::{Permissions, set_permissions};
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new()?;
    create_test_file(dir.path(), "North of the Sun (2016).mkv");
    create_test_file(dir.path(), "locked/Heat (1995).mkv");
    let locked = dir.path().join("locked");
    set_permissions(&locked, Permissions::from_mode(0o000))?;
    if std::fs::read_dir(&locked).is_ok() {
        // Permission bits do not bind root.
        set_permissions(&locked, Permissions::from_mode(0o755))?;
        return Ok(());
    }

    let store = Arc::new(InMemoryStore::new());
    let library = store
        .find_or_create_library(Library::new("Movies", dir.path(), LibraryKind::Movies))
        .await?;

    let result = scanner(store.clone()).probe(&library).await;
    set_permissions(&locked, Permissions::from_mode(0o755))?;

    assert!(matches!(result, Err(ScanError::Walk(_))));
    let filter = RecordFilter::in_library(library.id);
    assert_eq!(store.count_where(RecordKind::Movie, &filter).await?, 0);
    Ok(())
}

#[tokio::test]
async fn store_failure_aborts_probe() -> Result<()> {
    let dir = TempDir::new()?;
    create_test_file(dir.path(), "A Movie (2001).mkv");
    create_test_file(dir.path(), "B Movie (2002).mkv");
    create_test_file(dir.path(), "C Movie (2003).mkv");

    let store = Arc::new(FailingStore::new(1));
    let library = store
        .find_or_create_library(Library::new("Movies", dir.path(), LibraryKind::Movies))
        .await?;

    let err = scanner(store.clone()).probe(&library).await.unwrap_err();
    assert!(matches!(err, ScanError::Store(_)));

    // The walk is sorted, so only the first file made it in.
    let stored = store.inner.query_movies(&RecordFilter::default()).await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].media.title, "A Movie");
    Ok(())
}

#[tokio::test]
async fn unparsable_episode_does_not_stop_siblings() -> Result<()> {
    let dir = TempDir::new()?;
    create_test_file(dir.path(), "Show/Show S01E01.mkv");
    create_test_file(dir.path(), "Show/behind the scenes.mkv");
    create_test_file(dir.path(), "Show/Show S01E02.mkv");

    let store = Arc::new(InMemoryStore::new());
    let library = store
        .find_or_create_library(Library::new("Shows", dir.path(), LibraryKind::Series))
        .await?;

    let summary = scanner(store.clone()).probe(&library).await?;
    assert_eq!(summary.created, 2);
    assert_eq!(summary.unparsed, 1);
    Ok(())
}
