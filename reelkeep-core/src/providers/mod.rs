pub mod matching;
pub mod tmdb;
pub mod traits;

#[cfg(test)]
pub use traits::MockMetadataCatalog;
pub use traits::{
    CatalogError, EpisodeDetails, MetadataCatalog, MovieCandidate, MovieDetails,
    SearchOptions, SeasonDetails, SeriesCandidate, SeriesDetails,
};
pub use tmdb::{TmdbCatalog, TmdbOptions};
