#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reelkeep_core::providers::{
    EpisodeDetails, MovieCandidate, MovieDetails, SeasonDetails, SeriesCandidate,
    SeriesDetails,
};
use reelkeep_core::{
    CatalogError, CatalogId, InMemoryStore, Library, MetadataCatalog, MovieId, MovieItem,
    RecordFilter, RecordKind, RecordStore, SearchOptions, SeasonKey, SeriesKey, StoreError,
    StoreResult, TvEpisode, TvSeason, TvSeries,
};

pub fn create_test_file(root: &Path, relative: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, b"fake video content").unwrap();
    path
}

pub fn movie_candidate(id: CatalogId, title: &str) -> MovieCandidate {
    MovieCandidate {
        id,
        title: title.to_string(),
        original_title: None,
        release_date: None,
        overview: None,
        poster_path: None,
        backdrop_path: None,
        popularity: None,
        vote_count: None,
    }
}

pub fn series_candidate(id: CatalogId, name: &str) -> SeriesCandidate {
    SeriesCandidate {
        id,
        name: name.to_string(),
        original_name: None,
        first_air_date: None,
        overview: None,
        poster_path: None,
        backdrop_path: None,
        popularity: None,
        vote_count: None,
    }
}

/// Catalog answering from fixed tables.
///
/// Searches for unknown titles return no results. Lookups for unknown ids
/// return [`CatalogError::NotFound`]. Episode lookups of series listed in
/// `slow_series` never answer; season lookups of series listed in
/// `failing_seasons` answer with an API error.
#[derive(Debug, Default)]
pub struct StubCatalog {
    pub movies: HashMap<String, Vec<MovieCandidate>>,
    pub series: HashMap<String, Vec<SeriesCandidate>>,
    pub slow_series: Vec<CatalogId>,
    pub failing_seasons: Vec<CatalogId>,
    pub search_delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl StubCatalog {
    pub fn with_movies(title: &str, candidates: Vec<MovieCandidate>) -> Self {
        let mut stub = Self::default();
        stub.movies.insert(title.to_string(), candidates);
        stub
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn movie_by_id(&self, id: CatalogId) -> Option<&MovieCandidate> {
        self.movies.values().flatten().find(|movie| movie.id == id)
    }

    fn series_by_id(&self, id: CatalogId) -> Option<&SeriesCandidate> {
        self.series.values().flatten().find(|series| series.id == id)
    }
}

#[async_trait]
impl MetadataCatalog for StubCatalog {
    async fn search_movie(
        &self,
        title: &str,
        _options: SearchOptions,
    ) -> Result<Vec<MovieCandidate>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.movies.get(title).cloned().unwrap_or_default())
    }

    async fn search_tv(
        &self,
        title: &str,
        _options: SearchOptions,
    ) -> Result<Vec<SeriesCandidate>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.series.get(title).cloned().unwrap_or_default())
    }

    async fn movie_info(&self, id: CatalogId) -> Result<MovieDetails, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let movie = self.movie_by_id(id).ok_or(CatalogError::NotFound)?;
        Ok(MovieDetails {
            id,
            title: movie.title.clone(),
            original_title: Some(movie.title.clone()),
            overview: Some(format!("About {}", movie.title)),
            imdb_id: Some(format!("tt{id:07}")),
            release_date: movie.release_date,
            poster_path: Some(format!("/posters/{id}.jpg")),
            backdrop_path: None,
        })
    }

    async fn tv_info(&self, id: CatalogId) -> Result<SeriesDetails, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let series = self.series_by_id(id).ok_or(CatalogError::NotFound)?;
        Ok(SeriesDetails {
            id,
            name: series.name.clone(),
            original_name: None,
            overview: Some(format!("About {}", series.name)),
            first_air_date: series.first_air_date,
            status: Some("Returning Series".to_string()),
            series_type: Some("Scripted".to_string()),
            poster_path: None,
            backdrop_path: None,
        })
    }

    async fn tv_season_info(
        &self,
        series_id: CatalogId,
        season_number: u32,
    ) -> Result<SeasonDetails, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_seasons.contains(&series_id) {
            return Err(CatalogError::Api("503 Service Unavailable".to_string()));
        }
        self.series_by_id(series_id).ok_or(CatalogError::NotFound)?;
        Ok(SeasonDetails {
            id: series_id * 100 + u64::from(season_number),
            season_number,
            name: format!("Season {season_number}"),
            overview: None,
            air_date: None,
            poster_path: None,
        })
    }

    async fn tv_episode_info(
        &self,
        series_id: CatalogId,
        season_number: u32,
        episode_number: u32,
    ) -> Result<EpisodeDetails, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.slow_series.contains(&series_id) {
            std::future::pending::<()>().await;
        }
        self.series_by_id(series_id).ok_or(CatalogError::NotFound)?;
        Ok(EpisodeDetails {
            id: series_id * 10_000 + u64::from(season_number) * 100 + u64::from(episode_number),
            season_number,
            episode_number,
            name: format!("Episode {episode_number}"),
            overview: None,
            air_date: None,
            still_path: None,
        })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// In-memory store whose record writes start failing once `fail_after`
/// writes went through.
#[derive(Debug)]
pub struct FailingStore {
    pub inner: InMemoryStore,
    fail_after: usize,
    writes: AtomicUsize,
}

impl FailingStore {
    pub fn new(fail_after: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_after,
            writes: AtomicUsize::new(0),
        }
    }

    fn write(&self) -> StoreResult<()> {
        if self.writes.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
            return Err(StoreError::Corrupt("disk full".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FailingStore {
    async fn libraries(&self) -> StoreResult<Vec<Library>> {
        self.inner.libraries().await
    }

    async fn find_or_create_library(&self, library: Library) -> StoreResult<Library> {
        self.inner.find_or_create_library(library).await
    }

    async fn count_where(&self, kind: RecordKind, filter: &RecordFilter) -> StoreResult<u64> {
        self.inner.count_where(kind, filter).await
    }

    async fn create_movie(&self, movie: &MovieItem) -> StoreResult<()> {
        self.write()?;
        self.inner.create_movie(movie).await
    }

    async fn save_movie(&self, movie: &MovieItem) -> StoreResult<()> {
        self.write()?;
        self.inner.save_movie(movie).await
    }

    async fn get_movie(&self, id: MovieId) -> StoreResult<Option<MovieItem>> {
        self.inner.get_movie(id).await
    }

    async fn query_movies(&self, filter: &RecordFilter) -> StoreResult<Vec<MovieItem>> {
        self.inner.query_movies(filter).await
    }

    async fn find_or_create_series(&self, key: &SeriesKey) -> StoreResult<TvSeries> {
        self.write()?;
        self.inner.find_or_create_series(key).await
    }

    async fn save_series(&self, series: &TvSeries) -> StoreResult<()> {
        self.write()?;
        self.inner.save_series(series).await
    }

    async fn query_series(&self, filter: &RecordFilter) -> StoreResult<Vec<TvSeries>> {
        self.inner.query_series(filter).await
    }

    async fn find_or_create_season(&self, key: &SeasonKey) -> StoreResult<TvSeason> {
        self.write()?;
        self.inner.find_or_create_season(key).await
    }

    async fn save_season(&self, season: &TvSeason) -> StoreResult<()> {
        self.write()?;
        self.inner.save_season(season).await
    }

    async fn query_seasons(&self, filter: &RecordFilter) -> StoreResult<Vec<TvSeason>> {
        self.inner.query_seasons(filter).await
    }

    async fn create_episode(&self, episode: &TvEpisode) -> StoreResult<()> {
        self.write()?;
        self.inner.create_episode(episode).await
    }

    async fn save_episode(&self, episode: &TvEpisode) -> StoreResult<()> {
        self.write()?;
        self.inner.save_episode(episode).await
    }

    async fn query_episodes(&self, filter: &RecordFilter) -> StoreResult<Vec<TvEpisode>> {
        self.inner.query_episodes(filter).await
    }

    fn backend_name(&self) -> &'static str {
        "failing-memory"
    }
}
