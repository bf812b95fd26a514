use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::traits::{
    CatalogError, EpisodeDetails, MetadataCatalog, MovieCandidate, MovieDetails,
    SearchOptions, SeasonDetails, SeriesCandidate, SeriesDetails,
};
use crate::media::CatalogId;

pub const TMDB_API_BASE: &str = "https://api.themoviedb.org/3/";

/// Connection options for [`TmdbCatalog`].
#[derive(Debug, Clone)]
pub struct TmdbOptions {
    pub base_url: Url,
    pub language: Option<String>,
    pub request_timeout: Duration,
}

impl Default for TmdbOptions {
    fn default() -> Self {
        Self {
            base_url: Url::parse(TMDB_API_BASE)
                .expect("TMDB base url should parse"),
            language: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// [`MetadataCatalog`] backed by the TMDB v3 REST API.
#[derive(Debug, Clone)]
pub struct TmdbCatalog {
    api_key: String,
    options: TmdbOptions,
    client: Client,
}

impl TmdbCatalog {
    pub fn new(
        api_key: impl Into<String>,
        options: TmdbOptions,
    ) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            options,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        self.options
            .base_url
            .join(path)
            .map_err(|e| CatalogError::Api(format!("invalid endpoint '{path}': {e}")))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&'static str, String)],
    ) -> Result<T, CatalogError> {
        let url = self.endpoint(path)?;
        tracing::debug!("TMDB request: {}", url);

        let mut params: Vec<(&str, &str)> = vec![("api_key", self.api_key.as_str())];
        if let Some(language) = &self.options.language {
            params.push(("language", language.as_str()));
        }
        params.extend(extra.iter().map(|(k, v)| (*k, v.as_str())));

        let response = self.client.get(url).query(&params).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(CatalogError::InvalidApiKey),
            StatusCode::NOT_FOUND => return Err(CatalogError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => return Err(CatalogError::RateLimited),
            status if !status.is_success() => {
                return Err(CatalogError::Api(format!(
                    "TMDB API returned status: {status}"
                )));
            }
            _ => {}
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct TmdbPage<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovieResult {
    id: CatalogId,
    title: String,
    original_title: Option<String>,
    release_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    popularity: Option<f64>,
    vote_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvResult {
    id: CatalogId,
    name: String,
    original_name: Option<String>,
    first_air_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    popularity: Option<f64>,
    vote_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovieDetails {
    id: CatalogId,
    title: String,
    original_title: Option<String>,
    imdb_id: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvDetails {
    id: CatalogId,
    name: String,
    original_name: Option<String>,
    overview: Option<String>,
    first_air_date: Option<String>,
    status: Option<String>,
    #[serde(rename = "type")]
    series_type: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbSeasonDetails {
    id: CatalogId,
    season_number: u32,
    name: String,
    overview: Option<String>,
    air_date: Option<String>,
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbEpisodeDetails {
    id: CatalogId,
    season_number: u32,
    episode_number: u32,
    name: String,
    overview: Option<String>,
    air_date: Option<String>,
    still_path: Option<String>,
}

/// TMDB sends `""` for unknown dates.
fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.filter(|d| !d.is_empty())
        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty())
}

impl From<TmdbMovieResult> for MovieCandidate {
    fn from(r: TmdbMovieResult) -> Self {
        Self {
            id: r.id,
            title: r.title,
            original_title: non_empty(r.original_title),
            release_date: parse_date(r.release_date),
            overview: non_empty(r.overview),
            poster_path: non_empty(r.poster_path),
            backdrop_path: non_empty(r.backdrop_path),
            popularity: r.popularity,
            vote_count: r.vote_count,
        }
    }
}

impl From<TmdbTvResult> for SeriesCandidate {
    fn from(r: TmdbTvResult) -> Self {
        Self {
            id: r.id,
            name: r.name,
            original_name: non_empty(r.original_name),
            first_air_date: parse_date(r.first_air_date),
            overview: non_empty(r.overview),
            poster_path: non_empty(r.poster_path),
            backdrop_path: non_empty(r.backdrop_path),
            popularity: r.popularity,
            vote_count: r.vote_count,
        }
    }
}

impl From<TmdbMovieDetails> for MovieDetails {
    fn from(d: TmdbMovieDetails) -> Self {
        Self {
            id: d.id,
            title: d.title,
            original_title: non_empty(d.original_title),
            overview: non_empty(d.overview),
            imdb_id: non_empty(d.imdb_id),
            release_date: parse_date(d.release_date),
            poster_path: non_empty(d.poster_path),
            backdrop_path: non_empty(d.backdrop_path),
        }
    }
}

impl From<TmdbTvDetails> for SeriesDetails {
    fn from(d: TmdbTvDetails) -> Self {
        Self {
            id: d.id,
            name: d.name,
            original_name: non_empty(d.original_name),
            overview: non_empty(d.overview),
            first_air_date: parse_date(d.first_air_date),
            status: non_empty(d.status),
            series_type: non_empty(d.series_type),
            poster_path: non_empty(d.poster_path),
            backdrop_path: non_empty(d.backdrop_path),
        }
    }
}

impl From<TmdbSeasonDetails> for SeasonDetails {
    fn from(d: TmdbSeasonDetails) -> Self {
        Self {
            id: d.id,
            season_number: d.season_number,
            name: d.name,
            overview: non_empty(d.overview),
            air_date: parse_date(d.air_date),
            poster_path: non_empty(d.poster_path),
        }
    }
}

impl From<TmdbEpisodeDetails> for EpisodeDetails {
    fn from(d: TmdbEpisodeDetails) -> Self {
        Self {
            id: d.id,
            season_number: d.season_number,
            episode_number: d.episode_number,
            name: d.name,
            overview: non_empty(d.overview),
            air_date: parse_date(d.air_date),
            still_path: non_empty(d.still_path),
        }
    }
}

#[async_trait]
impl MetadataCatalog for TmdbCatalog {
    async fn search_movie(
        &self,
        title: &str,
        options: SearchOptions,
    ) -> Result<Vec<MovieCandidate>, CatalogError> {
        tracing::info!("TMDB movie search for: {} ({:?})", title, options.year);
        let mut params = vec![("query", title.to_string())];
        params.extend(options.movie_params());

        let page: TmdbPage<TmdbMovieResult> =
            self.get_json("search/movie", &params).await?;
        tracing::debug!("TMDB search returned {} results", page.results.len());
        Ok(page.results.into_iter().map(Into::into).collect())
    }

    async fn search_tv(
        &self,
        title: &str,
        options: SearchOptions,
    ) -> Result<Vec<SeriesCandidate>, CatalogError> {
        tracing::info!("TMDB tv search for: {} ({:?})", title, options.year);
        let mut params = vec![("query", title.to_string())];
        params.extend(options.tv_params());

        let page: TmdbPage<TmdbTvResult> = self.get_json("search/tv", &params).await?;
        tracing::debug!("TMDB search returned {} results", page.results.len());
        Ok(page.results.into_iter().map(Into::into).collect())
    }

    async fn movie_info(&self, id: CatalogId) -> Result<MovieDetails, CatalogError> {
        let details: TmdbMovieDetails =
            self.get_json(&format!("movie/{id}"), &[]).await?;
        Ok(details.into())
    }

    async fn tv_info(&self, id: CatalogId) -> Result<SeriesDetails, CatalogError> {
        let details: TmdbTvDetails = self.get_json(&format!("tv/{id}"), &[]).await?;
        Ok(details.into())
    }

    async fn tv_season_info(
        &self,
        series_id: CatalogId,
        season_number: u32,
    ) -> Result<SeasonDetails, CatalogError> {
        let details: TmdbSeasonDetails = self
            .get_json(&format!("tv/{series_id}/season/{season_number}"), &[])
            .await?;
        Ok(details.into())
    }

    async fn tv_episode_info(
        &self,
        series_id: CatalogId,
        season_number: u32,
        episode_number: u32,
    ) -> Result<EpisodeDetails, CatalogError> {
        let details: TmdbEpisodeDetails = self
            .get_json(
                &format!(
                    "tv/{series_id}/season/{season_number}/episode/{episode_number}"
                ),
                &[],
            )
            .await?;
        Ok(details.into())
    }

    fn name(&self) -> &'static str {
        "TMDB"
    }
}
