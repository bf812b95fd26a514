use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::{RecordFilter, RecordKind, RecordStore, SeasonKey, SeriesKey};
use crate::error::{StoreError, StoreResult};
use crate::media::{
    EpisodeId, Library, LibraryId, MovieId, MovieItem, SeasonId, SeriesId, TvEpisode,
    TvSeason, TvSeries,
};

#[derive(Debug, Default)]
struct Tables {
    libraries: Vec<Library>,
    movies: BTreeMap<MovieId, MovieItem>,
    series: BTreeMap<SeriesId, TvSeries>,
    seasons: BTreeMap<SeasonId, TvSeason>,
    episodes: BTreeMap<EpisodeId, TvEpisode>,
    /// Every file path owned by a movie or an episode.
    paths: HashSet<PathBuf>,
}

impl Tables {
    fn season_library(&self, season: &TvSeason) -> Option<LibraryId> {
        self.series.get(&season.series_id).map(|series| series.library_id)
    }

    fn movies<'a>(
        &'a self,
        filter: &'a RecordFilter,
    ) -> impl Iterator<Item = &'a MovieItem> + 'a {
        self.movies.values().filter(move |movie| {
            filter.matches_library(movie.media.library_id)
                && filter.matches_path(&movie.media.file_path)
                && filter.matches_resolution(movie.is_resolved())
        })
    }

    fn series<'a>(
        &'a self,
        filter: &'a RecordFilter,
    ) -> impl Iterator<Item = &'a TvSeries> + 'a {
        self.series.values().filter(move |series| {
            filter.file_path.is_none()
                && filter.matches_library(series.library_id)
                && filter.matches_resolution(series.is_resolved())
        })
    }

    fn seasons<'a>(
        &'a self,
        filter: &'a RecordFilter,
    ) -> impl Iterator<Item = &'a TvSeason> + 'a {
        self.seasons.values().filter(move |season| {
            filter.file_path.is_none()
                && filter.library_id.is_none_or(|wanted| {
                    self.season_library(season) == Some(wanted)
                })
                && filter.matches_resolution(season.is_resolved())
        })
    }

    fn episodes<'a>(
        &'a self,
        filter: &'a RecordFilter,
    ) -> impl Iterator<Item = &'a TvEpisode> + 'a {
        self.episodes.values().filter(move |episode| {
            filter.matches_library(episode.media.library_id)
                && filter.matches_path(&episode.media.file_path)
                && filter.matches_resolution(episode.is_resolved())
        })
    }

    fn claim_path(&mut self, path: &Path) -> StoreResult<()> {
        if !self.paths.insert(path.to_path_buf()) {
            return Err(StoreError::Conflict(format!(
                "file_path {}",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Process local [`RecordStore`].
///
/// A single lock guards all tables, so every find-or-create is atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn libraries(&self) -> StoreResult<Vec<Library>> {
        Ok(self.tables.lock().await.libraries.clone())
    }

    async fn find_or_create_library(&self, library: Library) -> StoreResult<Library> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .libraries
            .iter()
            .find(|existing| existing.root_path == library.root_path)
        {
            return Ok(existing.clone());
        }
        tables.libraries.push(library.clone());
        Ok(library)
    }

    async fn count_where(
        &self,
        kind: RecordKind,
        filter: &RecordFilter,
    ) -> StoreResult<u64> {
        let tables = self.tables.lock().await;
        let count = match kind {
            RecordKind::Movie => tables.movies(filter).count(),
            RecordKind::Series => tables.series(filter).count(),
            RecordKind::Season => tables.seasons(filter).count(),
            RecordKind::Episode => tables.episodes(filter).count(),
        };
        Ok(count as u64)
    }

    async fn create_movie(&self, movie: &MovieItem) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.claim_path(&movie.media.file_path)?;
        tables.movies.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn save_movie(&self, movie: &MovieItem) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.movies.get_mut(&movie.id) {
            Some(stored) => {
                *stored = movie.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("movie {}", movie.id))),
        }
    }

    async fn get_movie(&self, id: MovieId) -> StoreResult<Option<MovieItem>> {
        Ok(self.tables.lock().await.movies.get(&id).cloned())
    }

    async fn query_movies(&self, filter: &RecordFilter) -> StoreResult<Vec<MovieItem>> {
        Ok(self.tables.lock().await.movies(filter).cloned().collect())
    }

    async fn find_or_create_series(&self, key: &SeriesKey) -> StoreResult<TvSeries> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.series.values().find(|series| {
            series.library_id == key.library_id
                && series.name == key.name
                && series.first_air_year == key.first_air_year
        }) {
            return Ok(existing.clone());
        }
        let series = TvSeries::new(key.library_id, key.name.clone(), key.first_air_year);
        tables.series.insert(series.id, series.clone());
        Ok(series)
    }

    async fn save_series(&self, series: &TvSeries) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.series.get_mut(&series.id) {
            // The natural key columns are write-once.
            Some(stored) => {
                stored.catalog_id = series.catalog_id;
                stored.catalog_name = series.catalog_name.clone();
                stored.overview = series.overview.clone();
                stored.status = series.status.clone();
                stored.series_type = series.series_type.clone();
                stored.first_air_date = series.first_air_date;
                stored.original_name = series.original_name.clone();
                stored.backdrop_path = series.backdrop_path.clone();
                stored.poster_path = series.poster_path.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("series {}", series.id))),
        }
    }

    async fn query_series(&self, filter: &RecordFilter) -> StoreResult<Vec<TvSeries>> {
        Ok(self.tables.lock().await.series(filter).cloned().collect())
    }

    async fn find_or_create_season(&self, key: &SeasonKey) -> StoreResult<TvSeason> {
        let mut tables = self.tables.lock().await;
        if !tables.series.contains_key(&key.series_id) {
            return Err(StoreError::NotFound(format!("series {}", key.series_id)));
        }
        if let Some(existing) = tables.seasons.values().find(|season| {
            season.series_id == key.series_id && season.season_number == key.season_number
        }) {
            return Ok(existing.clone());
        }
        let season = TvSeason::new(key.series_id, key.name.clone(), key.season_number);
        tables.seasons.insert(season.id, season.clone());
        Ok(season)
    }

    async fn save_season(&self, season: &TvSeason) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.seasons.get_mut(&season.id) {
            Some(stored) => {
                stored.name = season.name.clone();
                stored.catalog_id = season.catalog_id;
                stored.overview = season.overview.clone();
                stored.air_date = season.air_date;
                stored.poster_path = season.poster_path.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("season {}", season.id))),
        }
    }

    async fn query_seasons(&self, filter: &RecordFilter) -> StoreResult<Vec<TvSeason>> {
        Ok(self.tables.lock().await.seasons(filter).cloned().collect())
    }

    async fn create_episode(&self, episode: &TvEpisode) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if !tables.seasons.contains_key(&episode.season_id) {
            return Err(StoreError::NotFound(format!("season {}", episode.season_id)));
        }
        tables.claim_path(&episode.media.file_path)?;
        tables.episodes.insert(episode.id, episode.clone());
        Ok(())
    }

    async fn save_episode(&self, episode: &TvEpisode) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.episodes.get_mut(&episode.id) {
            Some(stored) => {
                *stored = episode.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("episode {}", episode.id))),
        }
    }

    async fn query_episodes(&self, filter: &RecordFilter) -> StoreResult<Vec<TvEpisode>> {
        Ok(self.tables.lock().await.episodes(filter).cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
