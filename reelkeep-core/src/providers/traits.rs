use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::media::CatalogId;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Not found")]
    NotFound,

    #[error("Rate limited")]
    RateLimited,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Catalog call timed out after {0:?}")]
    Timeout(Duration),
}

/// Optional narrowing for a catalog search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub year: Option<u16>,
}

impl SearchOptions {
    pub fn with_year(year: Option<u16>) -> Self {
        Self { year }
    }

    /// Query parameters for a movie search (`year`).
    pub fn movie_params(&self) -> Vec<(&'static str, String)> {
        self.year
            .map(|year| vec![("year", year.to_string())])
            .unwrap_or_default()
    }

    /// Query parameters for a series search (`first_air_date_year`).
    pub fn tv_params(&self) -> Vec<(&'static str, String)> {
        self.year
            .map(|year| vec![("first_air_date_year", year.to_string())])
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieCandidate {
    pub id: CatalogId,
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub popularity: Option<f64>,
    pub vote_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesCandidate {
    pub id: CatalogId,
    pub name: String,
    pub original_name: Option<String>,
    pub first_air_date: Option<NaiveDate>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub popularity: Option<f64>,
    pub vote_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieDetails {
    pub id: CatalogId,
    pub title: String,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub imdb_id: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesDetails {
    pub id: CatalogId,
    pub name: String,
    pub original_name: Option<String>,
    pub overview: Option<String>,
    pub first_air_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub series_type: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeasonDetails {
    pub id: CatalogId,
    pub season_number: u32,
    pub name: String,
    pub overview: Option<String>,
    pub air_date: Option<NaiveDate>,
    pub poster_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeDetails {
    pub id: CatalogId,
    pub season_number: u32,
    pub episode_number: u32,
    pub name: String,
    pub overview: Option<String>,
    pub air_date: Option<NaiveDate>,
    pub still_path: Option<String>,
}

/// Read-only view of an external metadata catalog.
///
/// Search results are returned in the catalog's own order; ranking against
/// the parsed title happens in [`super::matching`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    async fn search_movie(
        &self,
        title: &str,
        options: SearchOptions,
    ) -> Result<Vec<MovieCandidate>, CatalogError>;

    async fn search_tv(
        &self,
        title: &str,
        options: SearchOptions,
    ) -> Result<Vec<SeriesCandidate>, CatalogError>;

    async fn movie_info(&self, id: CatalogId) -> Result<MovieDetails, CatalogError>;

    async fn tv_info(&self, id: CatalogId) -> Result<SeriesDetails, CatalogError>;

    async fn tv_season_info(
        &self,
        series_id: CatalogId,
        season_number: u32,
    ) -> Result<SeasonDetails, CatalogError>;

    async fn tv_episode_info(
        &self,
        series_id: CatalogId,
        season_number: u32,
        episode_number: u32,
    ) -> Result<EpisodeDetails, CatalogError>;

    /// Get the provider name
    fn name(&self) -> &'static str;
}
