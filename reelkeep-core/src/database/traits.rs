use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::media::{
    Library, LibraryId, MovieId, MovieItem, SeriesId, TvEpisode, TvSeason, TvSeries,
};

/// Record tables that can be counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Movie,
    Series,
    Season,
    Episode,
}

/// Conjunctive filter shared by every query and count.
///
/// Seasons are scoped to a library through their series; every other kind
/// carries the library directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub library_id: Option<LibraryId>,
    pub unresolved_only: bool,
    pub file_path: Option<PathBuf>,
}

impl RecordFilter {
    pub fn in_library(library_id: LibraryId) -> Self {
        Self {
            library_id: Some(library_id),
            ..Self::default()
        }
    }

    /// Records of `library_id` that have no catalog id yet.
    pub fn unresolved_in(library_id: LibraryId) -> Self {
        Self {
            library_id: Some(library_id),
            unresolved_only: true,
            file_path: None,
        }
    }

    pub fn by_path(path: impl AsRef<Path>) -> Self {
        Self {
            file_path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    pub fn matches_path(&self, path: &Path) -> bool {
        self.file_path.as_deref().is_none_or(|wanted| wanted == path)
    }

    pub fn matches_library(&self, library_id: LibraryId) -> bool {
        self.library_id.is_none_or(|wanted| wanted == library_id)
    }

    pub fn matches_resolution(&self, resolved: bool) -> bool {
        !self.unresolved_only || !resolved
    }
}

/// Natural key of a series: title plus first-air year, within one library.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub library_id: LibraryId,
    pub name: String,
    pub first_air_year: Option<u16>,
}

/// Natural key of a season. `name` is only used when the season is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeasonKey {
    pub series_id: SeriesId,
    pub season_number: u32,
    pub name: String,
}

/// Persistence for libraries and media records.
///
/// Implementations must make every `find_or_create_*` atomic per natural key
/// and must reject a second record for an already stored file path with
/// [`StoreError::Conflict`](crate::error::StoreError::Conflict), across both
/// movies and episodes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn libraries(&self) -> StoreResult<Vec<Library>>;

    /// Returns the stored library with the same root path, or stores `library`.
    async fn find_or_create_library(&self, library: Library) -> StoreResult<Library>;

    async fn count_where(
        &self,
        kind: RecordKind,
        filter: &RecordFilter,
    ) -> StoreResult<u64>;

    async fn create_movie(&self, movie: &MovieItem) -> StoreResult<()>;

    async fn save_movie(&self, movie: &MovieItem) -> StoreResult<()>;

    async fn get_movie(&self, id: MovieId) -> StoreResult<Option<MovieItem>>;

    async fn query_movies(&self, filter: &RecordFilter) -> StoreResult<Vec<MovieItem>>;

    async fn find_or_create_series(&self, key: &SeriesKey) -> StoreResult<TvSeries>;

    async fn save_series(&self, series: &TvSeries) -> StoreResult<()>;

    async fn query_series(&self, filter: &RecordFilter) -> StoreResult<Vec<TvSeries>>;

    async fn find_or_create_season(&self, key: &SeasonKey) -> StoreResult<TvSeason>;

    async fn save_season(&self, season: &TvSeason) -> StoreResult<()>;

    async fn query_seasons(&self, filter: &RecordFilter) -> StoreResult<Vec<TvSeason>>;

    async fn create_episode(&self, episode: &TvEpisode) -> StoreResult<()>;

    async fn save_episode(&self, episode: &TvEpisode) -> StoreResult<()>;

    async fn query_episodes(&self, filter: &RecordFilter) -> StoreResult<Vec<TvEpisode>>;

    /// Backend label for logs.
    fn backend_name(&self) -> &'static str;
}
