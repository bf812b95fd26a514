use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::database::{RecordFilter, RecordStore};
use crate::error::{ReconcileError, StoreError};
use crate::media::{
    CatalogId, ContentKind, Library, MovieId, MovieItem, SeasonId, SeriesId, TvEpisode,
    TvSeason, TvSeries,
};
use crate::providers::matching::best_candidate;
use crate::providers::{
    CatalogError, EpisodeDetails, MetadataCatalog, MovieCandidate, MovieDetails,
    SearchOptions, SeasonDetails, SeriesCandidate, SeriesDetails,
};
use crate::settings::{ReconcilerSettings, SearchErrorPolicy};
use crate::worker_pool::{JobFailure, WorkerPool};

/// How a single record left the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Search and full fetch both succeeded.
    Resolved,
    /// Only the identity fields from the search result were stored.
    Partial,
    Unmatched,
    Skipped,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub attempted: usize,
    pub resolved: usize,
    pub partial: usize,
    pub unmatched: usize,
    /// Records that could not be looked up yet, e.g. an unresolved parent.
    pub skipped: usize,
    pub failed: usize,
    /// Season and episode lookups that failed. Each one is also counted in
    /// `failed`.
    pub failures: Vec<JobFailure<ReconcileError>>,
}

impl ReconcileReport {
    fn record(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Resolved => self.resolved += 1,
            Resolution::Partial => self.partial += 1,
            Resolution::Unmatched => self.unmatched += 1,
            Resolution::Skipped => self.skipped += 1,
        }
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.attempted += other.attempted;
        self.resolved += other.resolved;
        self.partial += other.partial;
        self.unmatched += other.unmatched;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.failures.extend(other.failures);
    }

    /// Records that now carry a catalog id.
    pub fn matched(&self) -> usize {
        self.resolved + self.partial
    }
}

/// Enriches unresolved records with catalog metadata.
///
/// Only records without a catalog id are ever selected, so running a pass
/// again retries exactly the records that did not match before.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    catalog: Arc<dyn MetadataCatalog>,
    pool: WorkerPool,
    settings: ReconcilerSettings,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.store.backend_name())
            .field("catalog", &self.catalog.name())
            .field("pool", &self.pool)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        catalog: Arc<dyn MetadataCatalog>,
        pool: WorkerPool,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            pool,
            settings,
        }
    }

    /// Runs the pipeline matching the library's kind.
    pub async fn update_md(&self, library: &Library) -> Result<ReconcileReport, ReconcileError> {
        match library.kind.content() {
            Some(ContentKind::Movie) => self.update_movie_md(library).await,
            Some(ContentKind::Episodic) => self.update_tv_md(library).await,
            None => {
                debug!(library = %library.name, kind = %library.kind, "Nothing to reconcile");
                Ok(ReconcileReport::default())
            }
        }
    }

    pub async fn update_movie_md(
        &self,
        library: &Library,
    ) -> Result<ReconcileReport, ReconcileError> {
        let movies = self
            .store
            .query_movies(&RecordFilter::unresolved_in(library.id))
            .await?;
        info!(library = %library.name, "Reconciling {} unresolved movies", movies.len());

        let mut report = ReconcileReport::default();
        for movie in movies {
            report.attempted += 1;
            match self.reconcile_movie(movie).await {
                Ok(resolution) => report.record(resolution),
                Err(err) => self.absorb(err, &mut report)?,
            }
        }

        info!(
            library = %library.name,
            "Movie pass done: {} matched, {} unmatched, {} failed",
            report.matched(),
            report.unmatched,
            report.failed
        );
        Ok(report)
    }

    /// Series, then seasons, then episodes. Each level needs the catalog id
    /// of the one above it.
    pub async fn update_tv_md(&self, library: &Library) -> Result<ReconcileReport, ReconcileError> {
        let mut report = self.update_series_md(library).await?;
        report.merge(self.update_season_md(library).await?);
        report.merge(self.update_episode_md(library).await?);

        info!(
            library = %library.name,
            "TV pass done: {} matched, {} unmatched, {} skipped, {} failed",
            report.matched(),
            report.unmatched,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    pub async fn update_series_md(
        &self,
        library: &Library,
    ) -> Result<ReconcileReport, ReconcileError> {
        let series_list = self
            .store
            .query_series(&RecordFilter::unresolved_in(library.id))
            .await?;
        debug!(library = %library.name, "Reconciling {} unresolved series", series_list.len());

        let mut report = ReconcileReport::default();
        for series in series_list {
            report.attempted += 1;
            match self.reconcile_series(series).await {
                Ok(resolution) => report.record(resolution),
                Err(err) => self.absorb(err, &mut report)?,
            }
        }
        Ok(report)
    }

    pub async fn update_season_md(
        &self,
        library: &Library,
    ) -> Result<ReconcileReport, ReconcileError> {
        let series = self.series_by_id(library).await?;
        let seasons = self
            .store
            .query_seasons(&RecordFilter::unresolved_in(library.id))
            .await?;
        debug!(library = %library.name, "Reconciling {} unresolved seasons", seasons.len());

        let mut report = ReconcileReport::default();
        for season in seasons {
            let Some(series_catalog_id) = series.get(&season.series_id).and_then(|s| s.catalog_id)
            else {
                debug!(season = %season.name, "Series not resolved yet, skipping season");
                report.skipped += 1;
                continue;
            };

            report.attempted += 1;
            let label = season.name.clone();
            match self.reconcile_season(series_catalog_id, season).await {
                Ok(resolution) => report.record(resolution),
                Err(err @ ReconcileError::Fetch { .. }) => {
                    warn!(season = %label, series_catalog_id, "Season lookup failed: {}", err);
                    report.failed += 1;
                    report.failures.push(JobFailure { label, error: err });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(report)
    }

    /// Fans the library's unresolved episodes out over the worker pool and
    /// waits for all of them.
    ///
    /// Catalog failures of single episodes end up in
    /// [`ReconcileReport::failures`]; a store failure in any job is
    /// returned as the error of the whole pass.
    pub async fn update_episode_md(
        &self,
        library: &Library,
    ) -> Result<ReconcileReport, ReconcileError> {
        let series = self.series_by_id(library).await?;
        let seasons: HashMap<SeasonId, TvSeason> = self
            .store
            .query_seasons(&RecordFilter::in_library(library.id))
            .await?
            .into_iter()
            .map(|season| (season.id, season))
            .collect();
        let episodes = self
            .store
            .query_episodes(&RecordFilter::unresolved_in(library.id))
            .await?;
        debug!(library = %library.name, "Reconciling {} unresolved episodes", episodes.len());

        let mut report = ReconcileReport::default();
        let mut rejected = Vec::new();
        let mut batch = self.pool.batch::<Resolution, ReconcileError>();
        for episode in episodes {
            let Some(season) = seasons.get(&episode.season_id) else {
                warn!(episode = %episode, "Episode has no stored season");
                rejected.push(JobFailure {
                    label: episode.to_string(),
                    error: ReconcileError::UnresolvedParent(format!(
                        "season {}",
                        episode.season_id
                    )),
                });
                continue;
            };
            let Some(series_catalog_id) = series.get(&season.series_id).and_then(|s| s.catalog_id)
            else {
                debug!(episode = %episode, "Series not resolved yet, skipping episode");
                report.skipped += 1;
                continue;
            };
            let Some(episode_number) = episode.episode_number() else {
                warn!(episode = %episode, "Episode number is not numeric, skipping");
                rejected.push(JobFailure {
                    label: episode.to_string(),
                    error: ReconcileError::InvalidEpisodeNumber(episode.episode_num.clone()),
                });
                continue;
            };

            report.attempted += 1;
            let season_number = season.season_number;
            let this = self.clone();
            batch
                .submit(episode.to_string(), async move {
                    this.reconcile_episode(
                        series_catalog_id,
                        season_number,
                        episode_number,
                        episode,
                    )
                    .await
                })
                .map_err(|_| ReconcileError::PoolClosed)?;
        }

        let pool_report = batch.finish().await;
        for resolution in pool_report.outputs {
            report.record(resolution);
        }
        report.failed += pool_report.lost;

        let mut failures = pool_report.failures;
        if let Some(pos) = failures
            .iter()
            .position(|failure| matches!(failure.error, ReconcileError::Store(_)))
        {
            return Err(failures.swap_remove(pos).error);
        }
        failures.extend(rejected);
        report.failed += failures.len();
        report.failures = failures;
        Ok(report)
    }

    /// Applies the catalog record `catalog_id` to a stored movie, resolved
    /// or not.
    ///
    /// Unlike the automatic pass, a failed lookup leaves the record as it was
    /// and is returned to the caller.
    pub async fn rematch_movie(
        &self,
        movie_id: MovieId,
        catalog_id: CatalogId,
    ) -> Result<MovieItem, ReconcileError> {
        let mut movie = self
            .store
            .get_movie(movie_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("movie {movie_id}")))?;

        let details = self
            .bounded(self.catalog.movie_info(catalog_id))
            .await
            .map_err(|source| ReconcileError::Fetch { catalog_id, source })?;

        apply_movie_details(&mut movie, details);
        self.store.save_movie(&movie).await?;
        info!(movie = %movie, catalog_id, "Re-matched movie");
        Ok(movie)
    }

    async fn reconcile_movie(&self, mut movie: MovieItem) -> Result<Resolution, ReconcileError> {
        if movie.media.title.trim().is_empty() {
            debug!(movie = %movie, "No title to search for");
            return Ok(Resolution::Skipped);
        }

        let title = movie.media.title.clone();
        let year = movie.media.year;
        let results = self
            .bounded(self.catalog.search_movie(&title, SearchOptions::with_year(year)))
            .await
            .map_err(|source| ReconcileError::Search {
                title: title.clone(),
                source,
            })?;

        let Some(best) = best_candidate(&title, year, &results) else {
            debug!(movie = %movie, "No catalog results");
            return Ok(Resolution::Unmatched);
        };
        let catalog_id = best.id;
        apply_movie_candidate(&mut movie, best);

        let resolution = match self.bounded(self.catalog.movie_info(catalog_id)).await {
            Ok(details) => {
                apply_movie_details(&mut movie, details);
                Resolution::Resolved
            }
            Err(err) => {
                warn!(
                    movie = %movie,
                    catalog_id,
                    "Full lookup failed, keeping search result: {}", err
                );
                Resolution::Partial
            }
        };

        self.store.save_movie(&movie).await?;
        debug!(movie = %movie, catalog_id, "Matched movie");
        Ok(resolution)
    }

    async fn reconcile_series(&self, mut series: TvSeries) -> Result<Resolution, ReconcileError> {
        let name = series.name.clone();
        let year = series.first_air_year;
        let results = self
            .bounded(self.catalog.search_tv(&name, SearchOptions::with_year(year)))
            .await
            .map_err(|source| ReconcileError::Search {
                title: name.clone(),
                source,
            })?;

        let Some(best) = best_candidate(&name, year, &results) else {
            debug!(series = %name, "No catalog results");
            return Ok(Resolution::Unmatched);
        };
        let catalog_id = best.id;
        apply_series_candidate(&mut series, best);

        let resolution = match self.bounded(self.catalog.tv_info(catalog_id)).await {
            Ok(details) => {
                apply_series_details(&mut series, details);
                Resolution::Resolved
            }
            Err(err) => {
                warn!(
                    series = %name,
                    catalog_id,
                    "Full lookup failed, keeping search result: {}", err
                );
                Resolution::Partial
            }
        };

        self.store.save_series(&series).await?;
        debug!(series = %name, catalog_id, "Matched series");
        Ok(resolution)
    }

    async fn reconcile_season(
        &self,
        series_catalog_id: CatalogId,
        mut season: TvSeason,
    ) -> Result<Resolution, ReconcileError> {
        let lookup = self
            .bounded(
                self.catalog
                    .tv_season_info(series_catalog_id, season.season_number),
            )
            .await;
        let details = match lookup {
            Ok(details) => details,
            Err(CatalogError::NotFound) => {
                debug!(season = %season.name, series_catalog_id, "Season not in catalog");
                return Ok(Resolution::Unmatched);
            }
            Err(source) => {
                return Err(ReconcileError::Fetch {
                    catalog_id: series_catalog_id,
                    source,
                });
            }
        };

        apply_season_details(&mut season, details);
        self.store.save_season(&season).await?;
        debug!(season = %season.name, series_catalog_id, "Matched season");
        Ok(Resolution::Resolved)
    }

    async fn reconcile_episode(
        &self,
        series_catalog_id: CatalogId,
        season_number: u32,
        episode_number: u32,
        mut episode: TvEpisode,
    ) -> Result<Resolution, ReconcileError> {
        let lookup = self
            .bounded(self.catalog.tv_episode_info(
                series_catalog_id,
                season_number,
                episode_number,
            ))
            .await;
        let details = match lookup {
            Ok(details) => details,
            Err(CatalogError::NotFound) => {
                debug!(episode = %episode, "Episode not in catalog");
                return Ok(Resolution::Unmatched);
            }
            Err(source) => {
                return Err(ReconcileError::Fetch {
                    catalog_id: series_catalog_id,
                    source,
                });
            }
        };

        apply_episode_details(&mut episode, details);
        self.store.save_episode(&episode).await?;
        Ok(Resolution::Resolved)
    }

    async fn series_by_id(
        &self,
        library: &Library,
    ) -> Result<HashMap<SeriesId, TvSeries>, ReconcileError> {
        Ok(self
            .store
            .query_series(&RecordFilter::in_library(library.id))
            .await?
            .into_iter()
            .map(|series| (series.id, series))
            .collect())
    }

    /// Catalog call with the configured deadline; running out of time is a
    /// catalog error like any other.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, CatalogError>>,
    ) -> Result<T, CatalogError> {
        let limit = self.settings.catalog_timeout();
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| CatalogError::Timeout(limit))?
    }

    /// Search errors obey the search error policy, everything else ends the
    /// pass.
    fn absorb(
        &self,
        err: ReconcileError,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        let search_failure = matches!(err, ReconcileError::Search { .. });
        if search_failure && self.settings.search_error_policy == SearchErrorPolicy::Skip {
            warn!("Skipping record: {}", err);
            report.failed += 1;
            return Ok(());
        }
        Err(err)
    }
}

fn apply_movie_candidate(movie: &mut MovieItem, candidate: &MovieCandidate) {
    movie.catalog_id = Some(candidate.id);
    movie.media.title = candidate.title.clone();
    movie.original_title = candidate.original_title.clone();
    movie.release_date = candidate.release_date;
    movie.overview = candidate.overview.clone();
    movie.poster_path = candidate.poster_path.clone();
    movie.backdrop_path = candidate.backdrop_path.clone();
}

fn apply_movie_details(movie: &mut MovieItem, details: MovieDetails) {
    movie.catalog_id = Some(details.id);
    movie.media.title = details.title;
    movie.original_title = details.original_title.or(movie.original_title.take());
    movie.overview = details.overview.or(movie.overview.take());
    movie.imdb_id = details.imdb_id;
    movie.release_date = details.release_date.or(movie.release_date);
    movie.poster_path = details.poster_path.or(movie.poster_path.take());
    movie.backdrop_path = details.backdrop_path.or(movie.backdrop_path.take());
}

fn apply_series_candidate(series: &mut TvSeries, candidate: &SeriesCandidate) {
    series.catalog_id = Some(candidate.id);
    series.catalog_name = Some(candidate.name.clone());
    series.original_name = candidate.original_name.clone();
    series.first_air_date = candidate.first_air_date;
    series.overview = candidate.overview.clone();
    series.poster_path = candidate.poster_path.clone();
    series.backdrop_path = candidate.backdrop_path.clone();
}

fn apply_series_details(series: &mut TvSeries, details: SeriesDetails) {
    series.catalog_id = Some(details.id);
    series.catalog_name = Some(details.name);
    series.original_name = details.original_name.or(series.original_name.take());
    series.overview = details.overview.or(series.overview.take());
    series.first_air_date = details.first_air_date.or(series.first_air_date);
    series.status = details.status;
    series.series_type = details.series_type;
    series.poster_path = details.poster_path.or(series.poster_path.take());
    series.backdrop_path = details.backdrop_path.or(series.backdrop_path.take());
}

fn apply_season_details(season: &mut TvSeason, details: SeasonDetails) {
    season.catalog_id = Some(details.id);
    if !details.name.is_empty() {
        season.name = details.name;
    }
    season.overview = details.overview;
    season.air_date = details.air_date;
    season.poster_path = details.poster_path;
}

fn apply_episode_details(episode: &mut TvEpisode, details: EpisodeDetails) {
    episode.catalog_id = Some(details.id);
    episode.name = Some(details.name).filter(|name| !name.is_empty());
    episode.overview = details.overview;
    episode.air_date = details.air_date;
    episode.still_path = details.still_path;
}
