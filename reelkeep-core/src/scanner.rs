use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::database::{RecordFilter, RecordKind, RecordStore, SeasonKey, SeriesKey};
use crate::error::ScanError;
use crate::filename_parser::FilenameParser;
use crate::media::{ContentKind, Library, MediaItem, MovieItem, TvEpisode};
use crate::settings::ScannerSettings;

/// Counters for one probe of one library.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ScanSummary {
    /// Non-directory entries seen by the walk.
    pub visited: usize,
    pub created: usize,
    /// Candidates already stored under the same path.
    pub existing: usize,
    /// Files skipped because of their extension.
    pub unsupported: usize,
    /// Files no heuristic could make sense of.
    pub unparsed: usize,
    pub broken_links: usize,
}

impl ScanSummary {
    fn absorb_walk(&mut self, walked: &Walked) {
        self.visited += walked.files.len() + walked.unsupported + walked.broken_links;
        self.unsupported += walked.unsupported;
        self.broken_links += walked.broken_links;
    }
}

#[derive(Debug, Default)]
struct Walked {
    files: Vec<PathBuf>,
    unsupported: usize,
    broken_links: usize,
}

enum Created {
    New,
    /// Stored with a best-effort title.
    NewUnparsed,
    Existing,
    Unparsed,
}

/// Walks library roots and registers every new media file exactly once.
#[derive(Clone)]
pub struct Scanner {
    store: Arc<dyn RecordStore>,
    parser: FilenameParser,
    settings: ScannerSettings,
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("store", &self.store.backend_name())
            .field("parser", &self.parser)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Scanner {
    pub fn new(
        store: Arc<dyn RecordStore>,
        parser: FilenameParser,
        settings: ScannerSettings,
    ) -> Self {
        Self {
            store,
            parser,
            settings,
        }
    }

    /// Probes `library`, creating records for files not yet stored.
    ///
    /// Parse failures and dangling symlinks are counted and skipped. Any
    /// other stat failure, walk failure or store failure aborts the probe.
    pub async fn probe(&self, library: &Library) -> Result<ScanSummary, ScanError> {
        let Some(content) = library.kind.content() else {
            info!(
                library = %library.name,
                kind = %library.kind,
                "Library kind has no probe, skipping"
            );
            return Ok(ScanSummary::default());
        };

        let root = library.root_path.clone();
        info!(
            library = %library.name,
            "Starting media scan of: {} (follow_links: {})",
            root.display(),
            self.settings.follow_links
        );

        match tokio::fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(ScanError::RootMissing(root)),
        }

        let settings = self.settings.clone();
        let walked = tokio::task::spawn_blocking(move || walk_library(&root, &settings))
            .await
            .map_err(|e| ScanError::Task(e.to_string()))??;

        let mut summary = ScanSummary::default();
        summary.absorb_walk(&walked);

        for path in &walked.files {
            let outcome = match content {
                ContentKind::Movie => self.register_movie(library, path).await?,
                ContentKind::Episodic => self.register_episode(library, path).await?,
            };
            match outcome {
                Some(Created::New) => summary.created += 1,
                Some(Created::NewUnparsed) => {
                    summary.created += 1;
                    summary.unparsed += 1;
                }
                Some(Created::Existing) => summary.existing += 1,
                Some(Created::Unparsed) => summary.unparsed += 1,
                None => summary.broken_links += 1,
            }
        }

        info!(
            library = %library.name,
            "Scan complete: {} visited, {} created, {} existing, {} unsupported, {} unparsed, \
             {} broken links",
            summary.visited,
            summary.created,
            summary.existing,
            summary.unsupported,
            summary.unparsed,
            summary.broken_links
        );
        Ok(summary)
    }

    /// `Ok(None)` means the file vanished behind a dangling link.
    async fn stat_candidate(&self, path: &Path) -> Result<Option<u64>, ScanError> {
        let err = match tokio::fs::metadata(path).await {
            Ok(meta) => return Ok(Some(meta.len())),
            Err(err) => err,
        };
        if is_broken_link(path, &err).await {
            warn!("Got an error while statting file {}: {}", path.display(), err);
            return Ok(None);
        }
        Err(ScanError::Stat {
            path: path.to_path_buf(),
            source: err,
        })
    }

    async fn already_stored(&self, kind: RecordKind, path: &Path) -> Result<bool, ScanError> {
        let count = self
            .store
            .count_where(kind, &RecordFilter::by_path(path))
            .await?;
        if count > 0 {
            debug!("{} already exists in library, skipping", path.display());
        }
        Ok(count > 0)
    }

    async fn register_movie(
        &self,
        library: &Library,
        path: &Path,
    ) -> Result<Option<Created>, ScanError> {
        if self.already_stored(RecordKind::Movie, path).await? {
            return Ok(Some(Created::Existing));
        }
        let Some(size) = self.stat_candidate(path).await? else {
            return Ok(None);
        };

        let file_name = file_name_of(path);
        let parsed = self.parser.parse_movie(&file_name);
        if !parsed.matched() {
            warn!("Could not parse title for: {}", path.display());
        }

        let movie = MovieItem::new(MediaItem {
            file_name,
            file_path: path.to_path_buf(),
            size,
            title: parsed.title.clone(),
            year: parsed.year,
            library_id: library.id,
        });

        match self.store.create_movie(&movie).await {
            Ok(()) => {
                info!("Found {}", movie);
                Ok(Some(if parsed.matched() {
                    Created::New
                } else {
                    Created::NewUnparsed
                }))
            }
            Err(err) if err.is_conflict() => {
                debug!("{} was registered concurrently", path.display());
                Ok(Some(Created::Existing))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn register_episode(
        &self,
        library: &Library,
        path: &Path,
    ) -> Result<Option<Created>, ScanError> {
        if self.already_stored(RecordKind::Episode, path).await? {
            return Ok(Some(Created::Existing));
        }
        let Some(size) = self.stat_candidate(path).await? else {
            return Ok(None);
        };

        let file_name = file_name_of(path);
        let Some(parsed) = self.parser.parse_episode(&file_name) else {
            warn!("Could not parse season/episode for: {}", path.display());
            return Ok(Some(Created::Unparsed));
        };

        info!(
            "Found '{}' season {} episode {}",
            parsed.title, parsed.season, parsed.episode
        );

        let series = self
            .store
            .find_or_create_series(&SeriesKey {
                library_id: library.id,
                name: parsed.title.clone(),
                first_air_year: parsed.year,
            })
            .await?;
        let season = self
            .store
            .find_or_create_season(&SeasonKey {
                series_id: series.id,
                season_number: parsed.season_number(),
                name: parsed.title.clone(),
            })
            .await?;

        let media = MediaItem {
            file_name,
            file_path: path.to_path_buf(),
            size,
            title: parsed.title,
            year: parsed.year,
            library_id: library.id,
        };
        let episode = TvEpisode::new(season.id, media, parsed.season, parsed.episode);

        match self.store.create_episode(&episode).await {
            Ok(()) => Ok(Some(Created::New)),
            Err(err) if err.is_conflict() => {
                debug!("{} was registered concurrently", path.display());
                Ok(Some(Created::Existing))
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn has_supported_extension(settings: &ScannerSettings, path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| settings.is_supported(ext))
}

/// A stat that fails with NotFound on something that is itself a symlink.
async fn is_broken_link(path: &Path, err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::NotFound
        && tokio::fs::symlink_metadata(path)
            .await
            .is_ok_and(|meta| meta.file_type().is_symlink())
}

fn walk_library(root: &Path, settings: &ScannerSettings) -> Result<Walked, ScanError> {
    let walker = WalkDir::new(root)
        .follow_links(settings.follow_links)
        .sort_by_file_name();

    let mut walked = Walked::default();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                // walkdir reports dangling links as errors when following links.
                let dangling = err.path().is_some_and(|path| {
                    path.symlink_metadata()
                        .is_ok_and(|meta| meta.file_type().is_symlink())
                        && std::fs::metadata(path).is_err()
                });
                if dangling {
                    warn!("Skipping broken symlink: {}", err);
                    walked.broken_links += 1;
                    continue;
                }
                return Err(ScanError::Walk(err));
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.into_path();
        if has_supported_extension(settings, &path) {
            walked.files.push(path);
        } else {
            walked.unsupported += 1;
        }
    }
    Ok(walked)
}
