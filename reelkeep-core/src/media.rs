use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned by the external metadata catalog.
pub type CatalogId = u64;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            Serialize,
            Deserialize,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
        )]
        pub struct $name(pub Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Surrogate key of a [`Library`]
    LibraryId
);
record_id!(MovieId);
record_id!(SeriesId);
record_id!(SeasonId);
record_id!(EpisodeId);

/// Kind of content a library holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LibraryKind {
    Movies,
    Series,
    Music,
    OtherMovies,
}

/// How files inside a library are parsed and reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Movie,
    Episodic,
}

impl LibraryKind {
    /// `None` for kinds with no probe/reconcile pipeline.
    pub fn content(self) -> Option<ContentKind> {
        match self {
            LibraryKind::Movies | LibraryKind::OtherMovies => {
                Some(ContentKind::Movie)
            }
            LibraryKind::Series => Some(ContentKind::Episodic),
            LibraryKind::Music => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LibraryKind::Movies => "movies",
            LibraryKind::Series => "series",
            LibraryKind::Music => "music",
            LibraryKind::OtherMovies => "other_movies",
        }
    }
}

impl fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LibraryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movies" | "movie" => Ok(LibraryKind::Movies),
            "series" | "tv" | "shows" => Ok(LibraryKind::Series),
            "music" => Ok(LibraryKind::Music),
            "other_movies" | "other-movies" => Ok(LibraryKind::OtherMovies),
            other => Err(format!("unknown library kind '{other}'")),
        }
    }
}

/// A media library rooted at a filesystem path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub root_path: PathBuf,
    pub kind: LibraryKind,
}

impl Library {
    pub fn new(
        name: impl Into<String>,
        root_path: impl Into<PathBuf>,
        kind: LibraryKind,
    ) -> Self {
        Self {
            id: LibraryId::new(),
            name: name.into(),
            root_path: root_path.into(),
            kind,
        }
    }
}

/// File-level fields shared by every media record.
///
/// `file_path` is unique across the whole store and doubles as the natural
/// key used to deduplicate during probing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaItem {
    pub file_name: String,
    pub file_path: PathBuf,
    pub size: u64,
    pub title: String,
    pub year: Option<u16>,
    pub library_id: LibraryId,
}

impl MediaItem {
    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MovieItem {
    pub id: MovieId,
    pub media: MediaItem,
    /// `None` until a catalog match has been accepted.
    pub catalog_id: Option<CatalogId>,
    pub overview: Option<String>,
    pub backdrop_path: Option<String>,
    pub poster_path: Option<String>,
    pub imdb_id: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub original_title: Option<String>,
}

impl MovieItem {
    pub fn new(media: MediaItem) -> Self {
        Self {
            id: MovieId::new(),
            media,
            catalog_id: None,
            overview: None,
            backdrop_path: None,
            poster_path: None,
            imdb_id: None,
            release_date: None,
            original_title: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.catalog_id.is_some()
    }
}

impl fmt::Display for MovieItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Movie '{}'", self.media.title)?;
        if let Some(year) = self.media.year {
            write!(f, " ({year})")?;
        }
        write!(f, " at {}", self.media.file_path.display())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TvSeries {
    pub id: SeriesId,
    pub library_id: LibraryId,
    /// Title parsed from the filenames. Together with `library_id` and
    /// `first_air_year` it is the natural key, so reconciling never changes it.
    pub name: String,
    pub first_air_year: Option<u16>,
    pub catalog_id: Option<CatalogId>,
    /// Title as the catalog spells it.
    pub catalog_name: Option<String>,
    pub overview: Option<String>,
    pub status: Option<String>,
    pub series_type: Option<String>,
    pub first_air_date: Option<NaiveDate>,
    pub original_name: Option<String>,
    pub backdrop_path: Option<String>,
    pub poster_path: Option<String>,
}

impl TvSeries {
    pub fn new(
        library_id: LibraryId,
        name: impl Into<String>,
        first_air_year: Option<u16>,
    ) -> Self {
        Self {
            id: SeriesId::new(),
            library_id,
            name: name.into(),
            first_air_year,
            catalog_id: None,
            catalog_name: None,
            overview: None,
            status: None,
            series_type: None,
            first_air_date: None,
            original_name: None,
            backdrop_path: None,
            poster_path: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.catalog_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TvSeason {
    pub id: SeasonId,
    pub series_id: SeriesId,
    pub name: String,
    pub season_number: u32,
    pub catalog_id: Option<CatalogId>,
    pub overview: Option<String>,
    pub air_date: Option<NaiveDate>,
    pub poster_path: Option<String>,
}

impl TvSeason {
    pub fn new(
        series_id: SeriesId,
        name: impl Into<String>,
        season_number: u32,
    ) -> Self {
        Self {
            id: SeasonId::new(),
            series_id,
            name: name.into(),
            season_number,
            catalog_id: None,
            overview: None,
            air_date: None,
            poster_path: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.catalog_id.is_some()
    }
}

/// An episode file. `season_num`/`episode_num` keep the zero padded tokens
/// exactly as they appeared in the filename.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TvEpisode {
    pub id: EpisodeId,
    pub season_id: SeasonId,
    pub media: MediaItem,
    pub season_num: String,
    pub episode_num: String,
    pub catalog_id: Option<CatalogId>,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub air_date: Option<NaiveDate>,
    pub still_path: Option<String>,
}

impl TvEpisode {
    pub fn new(
        season_id: SeasonId,
        media: MediaItem,
        season_num: impl Into<String>,
        episode_num: impl Into<String>,
    ) -> Self {
        Self {
            id: EpisodeId::new(),
            season_id,
            media,
            season_num: season_num.into(),
            episode_num: episode_num.into(),
            catalog_id: None,
            name: None,
            overview: None,
            air_date: None,
            still_path: None,
        }
    }

    pub fn episode_number(&self) -> Option<u32> {
        self.episode_num.parse().ok()
    }

    pub fn is_resolved(&self) -> bool {
        self.catalog_id.is_some()
    }
}

impl fmt::Display for TvEpisode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' S{}E{} at {}",
            self.media.title,
            self.season_num,
            self.episode_num,
            self.media.file_path.display()
        )
    }
}
