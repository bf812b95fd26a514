use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::traits::{RecordFilter, RecordKind, RecordStore, SeasonKey, SeriesKey};
use crate::error::{StoreError, StoreResult};
use crate::media::{
    CatalogId, EpisodeId, Library, LibraryId, MediaItem, MovieId, MovieItem, SeasonId,
    SeriesId, TvEpisode, TvSeason, TvSeries,
};

const MOVIE_COLUMNS: &str = r#"
    SELECT m.id, m.catalog_id, m.overview, m.backdrop_path, m.poster_path,
           m.imdb_id, m.release_date, m.original_title,
           f.file_path, f.file_name, f.file_size, f.title, f.year, f.library_id
    FROM movies m
    JOIN media_files f ON f.file_path = m.file_path
    WHERE 1=1
"#;

const SERIES_COLUMNS: &str = r#"
    SELECT s.id, s.library_id, s.name, s.first_air_year, s.catalog_id,
           s.catalog_name, s.overview, s.status, s.series_type, s.first_air_date,
           s.original_name, s.backdrop_path, s.poster_path
    FROM tv_series s
    WHERE 1=1
"#;

const SEASON_COLUMNS: &str = r#"
    SELECT t.id, t.series_id, t.name, t.season_number, t.catalog_id,
           t.overview, t.air_date, t.poster_path
    FROM tv_seasons t
    JOIN tv_series s ON s.id = t.series_id
    WHERE 1=1
"#;

const EPISODE_COLUMNS: &str = r#"
    SELECT e.id, e.season_id, e.season_num, e.episode_num, e.catalog_id,
           e.name, e.overview, e.air_date, e.still_path,
           f.file_path, f.file_name, f.file_size, f.title, f.year, f.library_id
    FROM tv_episodes e
    JOIN media_files f ON f.file_path = e.file_path
    WHERE 1=1
"#;

/// Column names a [`RecordFilter`] binds against for one record kind.
#[derive(Debug, Clone, Copy)]
struct FilterColumns {
    library: &'static str,
    path: Option<&'static str>,
    catalog: &'static str,
    order: &'static str,
}

impl FilterColumns {
    fn for_kind(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Movie => Self {
                library: "f.library_id",
                path: Some("f.file_path"),
                catalog: "m.catalog_id",
                order: "m.id",
            },
            RecordKind::Series => Self {
                library: "s.library_id",
                path: None,
                catalog: "s.catalog_id",
                order: "s.id",
            },
            RecordKind::Season => Self {
                library: "s.library_id",
                path: None,
                catalog: "t.catalog_id",
                order: "t.id",
            },
            RecordKind::Episode => Self {
                library: "f.library_id",
                path: Some("f.file_path"),
                catalog: "e.catalog_id",
                order: "e.id",
            },
        }
    }

    fn count_source(kind: RecordKind) -> &'static str {
        match kind {
            RecordKind::Movie => concat!(
                "SELECT COUNT(*) FROM movies m ",
                "JOIN media_files f ON f.file_path = m.file_path WHERE 1=1"
            ),
            RecordKind::Series => "SELECT COUNT(*) FROM tv_series s WHERE 1=1",
            RecordKind::Season => {
                "SELECT COUNT(*) FROM tv_seasons t JOIN tv_series s ON s.id = t.series_id WHERE 1=1"
            }
            RecordKind::Episode => concat!(
                "SELECT COUNT(*) FROM tv_episodes e ",
                "JOIN media_files f ON f.file_path = e.file_path WHERE 1=1"
            ),
        }
    }
}

fn push_filter(
    builder: &mut QueryBuilder<'_, Postgres>,
    filter: &RecordFilter,
    columns: FilterColumns,
) {
    if let Some(library_id) = filter.library_id {
        builder.push(format!(" AND {} = ", columns.library));
        builder.push_bind(library_id.as_uuid());
    }
    if filter.unresolved_only {
        builder.push(format!(" AND {} IS NULL", columns.catalog));
    }
    if let Some(path) = &filter.file_path {
        match columns.path {
            Some(column) => {
                builder.push(format!(" AND {column} = "));
                builder.push_bind(path_text(path));
            }
            None => {
                builder.push(" AND FALSE");
            }
        }
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn map_insert_error(err: sqlx::Error, key: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.code().as_deref() == Some("23505")
    {
        return StoreError::Conflict(key());
    }
    StoreError::Database(err)
}

fn catalog_to_db(id: Option<CatalogId>) -> StoreResult<Option<i64>> {
    id.map(|id| {
        i64::try_from(id)
            .map_err(|_| StoreError::Corrupt(format!("catalog id {id} exceeds BIGINT")))
    })
    .transpose()
}

fn catalog_from_db(raw: Option<i64>) -> StoreResult<Option<CatalogId>> {
    raw.map(|id| {
        CatalogId::try_from(id)
            .map_err(|_| StoreError::Corrupt(format!("negative catalog id {id}")))
    })
    .transpose()
}

/// Unknown years are stored as NULL for files and as 0 for series keys.
fn year_from_db(raw: Option<i32>) -> Option<u16> {
    raw.and_then(|year| u16::try_from(year).ok())
        .filter(|year| *year != 0)
}

fn media_from_row(row: &PgRow) -> StoreResult<MediaItem> {
    let size: i64 = row.try_get("file_size")?;
    Ok(MediaItem {
        file_name: row.try_get("file_name")?,
        file_path: PathBuf::from(row.try_get::<String, _>("file_path")?),
        size: u64::try_from(size)
            .map_err(|_| StoreError::Corrupt(format!("negative file size {size}")))?,
        title: row.try_get("title")?,
        year: year_from_db(row.try_get("year")?),
        library_id: LibraryId(row.try_get("library_id")?),
    })
}

fn movie_from_row(row: &PgRow) -> StoreResult<MovieItem> {
    Ok(MovieItem {
        id: MovieId(row.try_get("id")?),
        media: media_from_row(row)?,
        catalog_id: catalog_from_db(row.try_get("catalog_id")?)?,
        overview: row.try_get("overview")?,
        backdrop_path: row.try_get("backdrop_path")?,
        poster_path: row.try_get("poster_path")?,
        imdb_id: row.try_get("imdb_id")?,
        release_date: row.try_get("release_date")?,
        original_title: row.try_get("original_title")?,
    })
}

fn series_from_row(row: &PgRow) -> StoreResult<TvSeries> {
    Ok(TvSeries {
        id: SeriesId(row.try_get("id")?),
        library_id: LibraryId(row.try_get("library_id")?),
        name: row.try_get("name")?,
        first_air_year: year_from_db(row.try_get("first_air_year")?),
        catalog_id: catalog_from_db(row.try_get("catalog_id")?)?,
        catalog_name: row.try_get("catalog_name")?,
        overview: row.try_get("overview")?,
        status: row.try_get("status")?,
        series_type: row.try_get("series_type")?,
        first_air_date: row.try_get("first_air_date")?,
        original_name: row.try_get("original_name")?,
        backdrop_path: row.try_get("backdrop_path")?,
        poster_path: row.try_get("poster_path")?,
    })
}

fn season_from_row(row: &PgRow) -> StoreResult<TvSeason> {
    let number: i32 = row.try_get("season_number")?;
    Ok(TvSeason {
        id: SeasonId(row.try_get("id")?),
        series_id: SeriesId(row.try_get("series_id")?),
        name: row.try_get("name")?,
        season_number: u32::try_from(number)
            .map_err(|_| StoreError::Corrupt(format!("negative season number {number}")))?,
        catalog_id: catalog_from_db(row.try_get("catalog_id")?)?,
        overview: row.try_get("overview")?,
        air_date: row.try_get("air_date")?,
        poster_path: row.try_get("poster_path")?,
    })
}

fn episode_from_row(row: &PgRow) -> StoreResult<TvEpisode> {
    Ok(TvEpisode {
        id: EpisodeId(row.try_get("id")?),
        season_id: SeasonId(row.try_get("season_id")?),
        media: media_from_row(row)?,
        season_num: row.try_get("season_num")?,
        episode_num: row.try_get("episode_num")?,
        catalog_id: catalog_from_db(row.try_get("catalog_id")?)?,
        name: row.try_get("name")?,
        overview: row.try_get("overview")?,
        air_date: row.try_get("air_date")?,
        still_path: row.try_get("still_path")?,
    })
}

fn library_from_row(row: &PgRow) -> StoreResult<Library> {
    let kind: String = row.try_get("kind")?;
    Ok(Library {
        id: LibraryId(row.try_get("id")?),
        name: row.try_get("name")?,
        root_path: PathBuf::from(row.try_get::<String, _>("root_path")?),
        kind: kind.parse().map_err(StoreError::Corrupt)?,
    })
}

/// [`RecordStore`] over PostgreSQL.
///
/// Natural keys are enforced by unique constraints (see the migrations), so
/// concurrent probes of the same library cannot create duplicate rows.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        info!("Connecting to PostgreSQL database");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("Successfully connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        info!("Running database migrations");
        crate::MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_filtered<T>(
        &self,
        source: &str,
        kind: RecordKind,
        filter: &RecordFilter,
        map: fn(&PgRow) -> StoreResult<T>,
    ) -> StoreResult<Vec<T>> {
        let columns = FilterColumns::for_kind(kind);
        let mut builder = QueryBuilder::<Postgres>::new(source);
        push_filter(&mut builder, filter, columns);
        builder.push(format!(" ORDER BY {}", columns.order));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(map).collect()
    }

    async fn insert_media_file(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        media: &MediaItem,
    ) -> StoreResult<()> {
        let size = i64::try_from(media.size)
            .map_err(|_| StoreError::Corrupt(format!("file size {} exceeds BIGINT", media.size)))?;
        sqlx::query(
            r#"
            INSERT INTO media_files (file_path, library_id, file_name, file_size, title, year)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(path_text(&media.file_path))
        .bind(media.library_id.as_uuid())
        .bind(&media.file_name)
        .bind(size)
        .bind(&media.title)
        .bind(media.year.map(i32::from))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_insert_error(e, || format!("file_path {}", media.file_path.display())))?;
        Ok(())
    }

    async fn update_media_file(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        media: &MediaItem,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE media_files SET title = $2, year = $3 WHERE file_path = $1")
            .bind(path_text(&media.file_path))
            .bind(&media.title)
            .bind(media.year.map(i32::from))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn libraries(&self) -> StoreResult<Vec<Library>> {
        let rows =
            sqlx::query("SELECT id, name, root_path, kind FROM libraries ORDER BY created_at, id")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(library_from_row).collect()
    }

    async fn find_or_create_library(&self, library: Library) -> StoreResult<Library> {
        let root = path_text(&library.root_path);
        sqlx::query(
            r#"
            INSERT INTO libraries (id, name, root_path, kind)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (root_path) DO NOTHING
            "#,
        )
        .bind(library.id.as_uuid())
        .bind(&library.name)
        .bind(&root)
        .bind(library.kind.as_str())
        .execute(&self.pool)
        .await?;

        let row =
            sqlx::query("SELECT id, name, root_path, kind FROM libraries WHERE root_path = $1")
                .bind(&root)
                .fetch_one(&self.pool)
                .await?;
        library_from_row(&row)
    }

    async fn count_where(
        &self,
        kind: RecordKind,
        filter: &RecordFilter,
    ) -> StoreResult<u64> {
        let mut builder = QueryBuilder::<Postgres>::new(FilterColumns::count_source(kind));
        push_filter(&mut builder, filter, FilterColumns::for_kind(kind));
        let count = builder.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn create_movie(&self, movie: &MovieItem) -> StoreResult<()> {
        debug!("Storing movie: {}", movie);
        let mut tx = self.pool.begin().await?;
        Self::insert_media_file(&mut tx, &movie.media).await?;
        sqlx::query(
            r#"
            INSERT INTO movies (id, file_path, catalog_id, overview, backdrop_path,
                                poster_path, imdb_id, release_date, original_title)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(movie.id.as_uuid())
        .bind(path_text(&movie.media.file_path))
        .bind(catalog_to_db(movie.catalog_id)?)
        .bind(&movie.overview)
        .bind(&movie.backdrop_path)
        .bind(&movie.poster_path)
        .bind(&movie.imdb_id)
        .bind(movie.release_date)
        .bind(&movie.original_title)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, || format!("movie {}", movie.id)))?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_movie(&self, movie: &MovieItem) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE movies
            SET catalog_id = $2, overview = $3, backdrop_path = $4, poster_path = $5,
                imdb_id = $6, release_date = $7, original_title = $8, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(movie.id.as_uuid())
        .bind(catalog_to_db(movie.catalog_id)?)
        .bind(&movie.overview)
        .bind(&movie.backdrop_path)
        .bind(&movie.poster_path)
        .bind(&movie.imdb_id)
        .bind(movie.release_date)
        .bind(&movie.original_title)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("movie {}", movie.id)));
        }
        Self::update_media_file(&mut tx, &movie.media).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_movie(&self, id: MovieId) -> StoreResult<Option<MovieItem>> {
        let mut builder = QueryBuilder::<Postgres>::new(MOVIE_COLUMNS);
        builder.push(" AND m.id = ");
        builder.push_bind(id.as_uuid());
        let row = builder.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(movie_from_row).transpose()
    }

    async fn query_movies(&self, filter: &RecordFilter) -> StoreResult<Vec<MovieItem>> {
        self.fetch_filtered(MOVIE_COLUMNS, RecordKind::Movie, filter, movie_from_row)
            .await
    }

    async fn find_or_create_series(&self, key: &SeriesKey) -> StoreResult<TvSeries> {
        let year = key.first_air_year.map(i32::from).unwrap_or(0);
        sqlx::query(
            r#"
            INSERT INTO tv_series (id, library_id, name, first_air_year)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (library_id, name, first_air_year) DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(key.library_id.as_uuid())
        .bind(&key.name)
        .bind(year)
        .execute(&self.pool)
        .await?;

        let mut builder = QueryBuilder::<Postgres>::new(SERIES_COLUMNS);
        builder.push(" AND s.library_id = ");
        builder.push_bind(key.library_id.as_uuid());
        builder.push(" AND s.name = ");
        builder.push_bind(key.name.clone());
        builder.push(" AND s.first_air_year = ");
        builder.push_bind(year);
        let row = builder.build().fetch_one(&self.pool).await?;
        series_from_row(&row)
    }

    async fn save_series(&self, series: &TvSeries) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tv_series
            SET catalog_id = $2, catalog_name = $3, overview = $4, status = $5,
                series_type = $6, first_air_date = $7, original_name = $8,
                backdrop_path = $9, poster_path = $10, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(series.id.as_uuid())
        .bind(catalog_to_db(series.catalog_id)?)
        .bind(&series.catalog_name)
        .bind(&series.overview)
        .bind(&series.status)
        .bind(&series.series_type)
        .bind(series.first_air_date)
        .bind(&series.original_name)
        .bind(&series.backdrop_path)
        .bind(&series.poster_path)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("series {}", series.id)));
        }
        Ok(())
    }

    async fn query_series(&self, filter: &RecordFilter) -> StoreResult<Vec<TvSeries>> {
        self.fetch_filtered(SERIES_COLUMNS, RecordKind::Series, filter, series_from_row)
            .await
    }

    async fn find_or_create_season(&self, key: &SeasonKey) -> StoreResult<TvSeason> {
        let number = i32::try_from(key.season_number).map_err(|_| {
            StoreError::Corrupt(format!("season number {} exceeds INTEGER", key.season_number))
        })?;
        sqlx::query(
            r#"
            INSERT INTO tv_seasons (id, series_id, name, season_number)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (series_id, season_number) DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(key.series_id.as_uuid())
        .bind(&key.name)
        .bind(number)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, || format!("season of series {}", key.series_id)))?;

        let mut builder = QueryBuilder::<Postgres>::new(SEASON_COLUMNS);
        builder.push(" AND t.series_id = ");
        builder.push_bind(key.series_id.as_uuid());
        builder.push(" AND t.season_number = ");
        builder.push_bind(number);
        let row = builder.build().fetch_one(&self.pool).await?;
        season_from_row(&row)
    }

    async fn save_season(&self, season: &TvSeason) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tv_seasons
            SET name = $2, catalog_id = $3, overview = $4, air_date = $5,
                poster_path = $6, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(season.id.as_uuid())
        .bind(&season.name)
        .bind(catalog_to_db(season.catalog_id)?)
        .bind(&season.overview)
        .bind(season.air_date)
        .bind(&season.poster_path)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("season {}", season.id)));
        }
        Ok(())
    }

    async fn query_seasons(&self, filter: &RecordFilter) -> StoreResult<Vec<TvSeason>> {
        self.fetch_filtered(SEASON_COLUMNS, RecordKind::Season, filter, season_from_row)
            .await
    }

    async fn create_episode(&self, episode: &TvEpisode) -> StoreResult<()> {
        debug!("Storing episode: {}", episode);
        let mut tx = self.pool.begin().await?;
        Self::insert_media_file(&mut tx, &episode.media).await?;
        sqlx::query(
            r#"
            INSERT INTO tv_episodes (id, season_id, file_path, season_num, episode_num,
                                     catalog_id, name, overview, air_date, still_path)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(episode.id.as_uuid())
        .bind(episode.season_id.as_uuid())
        .bind(path_text(&episode.media.file_path))
        .bind(&episode.season_num)
        .bind(&episode.episode_num)
        .bind(catalog_to_db(episode.catalog_id)?)
        .bind(&episode.name)
        .bind(&episode.overview)
        .bind(episode.air_date)
        .bind(&episode.still_path)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, || format!("episode {}", episode.id)))?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_episode(&self, episode: &TvEpisode) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE tv_episodes
            SET catalog_id = $2, name = $3, overview = $4, air_date = $5,
                still_path = $6, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(episode.id.as_uuid())
        .bind(catalog_to_db(episode.catalog_id)?)
        .bind(&episode.name)
        .bind(&episode.overview)
        .bind(episode.air_date)
        .bind(&episode.still_path)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("episode {}", episode.id)));
        }
        Self::update_media_file(&mut tx, &episode.media).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn query_episodes(&self, filter: &RecordFilter) -> StoreResult<Vec<TvEpisode>> {
        self.fetch_filtered(EPISODE_COLUMNS, RecordKind::Episode, filter, episode_from_row)
            .await
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
