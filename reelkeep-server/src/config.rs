use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use reelkeep_core::providers::tmdb::TMDB_API_BASE;
use reelkeep_core::{
    CoreSettings, LibraryKind, ParserSettings, ReconcilerSettings, ScannerSettings,
    TmdbOptions,
};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("reelkeep.toml"),
        PathBuf::from("config/reelkeep.toml"),
    ]
});

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("config file {} does not exist", .path.display())]
    MissingConfig { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to load .env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("invalid duration for {key}: {source}")]
    Duration {
        key: &'static str,
        #[source]
        source: humantime::DurationError,
    },

    #[error("invalid catalog base url: {0}")]
    BaseUrl(#[from] url::ParseError),
}

/// Runtime settings of the daemon, after file and environment are merged.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub database: DatabaseConfig,
    pub schedule: ScheduleConfig,
    pub core: CoreSettings,
    pub libraries: Vec<LibraryConfig>,
    /// Registered as a movies library when the store has none.
    pub default_media_dir: Option<PathBuf>,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub verbose: bool,
    /// Tokio worker threads. Unrelated to the catalog pool capacity.
    pub worker_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            worker_threads: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub api_key: Option<String>,
    pub base_url: Url,
    pub language: Option<String>,
    pub request_timeout: Duration,
}

impl CatalogConfig {
    pub fn tmdb_options(&self) -> TmdbOptions {
        TmdbOptions {
            base_url: self.base_url.clone(),
            language: self.language.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// No url means records live in memory only.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub interval: Option<Duration>,
    pub run_on_start: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LibraryConfig {
    pub name: String,
    pub path: PathBuf,
    pub kind: LibraryKind,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    server: ServerConfig,
    catalog: FileCatalogConfig,
    database: FileDatabaseConfig,
    schedule: FileScheduleConfig,
    scanner: ScannerSettings,
    parser: ParserSettings,
    reconciler: ReconcilerSettings,
    libraries: Vec<LibraryConfig>,
    default_media_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileCatalogConfig {
    api_key: Option<String>,
    base_url: Option<String>,
    language: Option<String>,
    request_timeout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileDatabaseConfig {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileScheduleConfig {
    interval: Option<String>,
    run_on_start: Option<bool>,
}

/// Values taken from the process environment. Empty variables count as
/// unset.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub tmdb_api_key: Option<String>,
    pub tmdb_language: Option<String>,
    pub scan_interval: Option<String>,
    pub media_dir: Option<PathBuf>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            config_path: get("REELKEEP_CONFIG").map(PathBuf::from),
            database_url: get("DATABASE_URL"),
            tmdb_api_key: get("TMDB_API_KEY"),
            tmdb_language: get("TMDB_LANG"),
            scan_interval: get("REELKEEP_SCAN_INTERVAL"),
            media_dir: get("REELKEEP_MEDIA_DIR").map(PathBuf::from),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.env_file = Some(path.into());
        self
    }

    /// Loads `.env`, the config file and then environment overrides.
    pub fn load(&self) -> Result<Config, ConfigLoadError> {
        let loaded = match &self.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        let env_file_loaded = loaded.or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(err),
        })?;

        let mut config = self.load_with_env(EnvConfig::gather())?;
        config.metadata.env_file_loaded = env_file_loaded;
        Ok(config)
    }

    pub fn load_with_env(&self, env: EnvConfig) -> Result<Config, ConfigLoadError> {
        let (file, config_path) = self.load_file_config(&env)?;
        let mut config = compose(file.unwrap_or_default(), env)?;
        config.metadata.config_path = config_path;
        Ok(config)
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self.config_path.clone().or_else(|| env.config_path.clone());
        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS.iter().find(|candidate| candidate.exists()) {
                Some(path) => path.clone(),
                None => return Ok((None, None)),
            },
        };

        let file = read_file_config(&path)?;
        Ok((Some(file), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigLoadError> {
    humantime::parse_duration(value.trim())
        .map_err(|source| ConfigLoadError::Duration { key, source })
}

fn compose(file: FileConfig, env: EnvConfig) -> Result<Config, ConfigLoadError> {
    let FileConfig {
        server,
        catalog: file_catalog,
        database: file_database,
        schedule: file_schedule,
        scanner,
        parser,
        reconciler,
        libraries,
        default_media_dir,
    } = file;

    let base_url = Url::parse(file_catalog.base_url.as_deref().unwrap_or(TMDB_API_BASE))?;
    let request_timeout = match file_catalog.request_timeout.as_deref() {
        Some(value) => parse_duration("catalog.request_timeout", value)?,
        None => Duration::from_secs(10),
    };
    let catalog = CatalogConfig {
        api_key: env.tmdb_api_key.or(file_catalog.api_key),
        base_url,
        language: env.tmdb_language.or(file_catalog.language),
        request_timeout,
    };

    let database = DatabaseConfig {
        url: env.database_url.or(file_database.url),
        max_connections: file_database.max_connections.unwrap_or(10),
    };

    let interval = match env.scan_interval.or(file_schedule.interval) {
        Some(value) => Some(parse_duration("schedule.interval", &value)?),
        None => None,
    };
    let schedule = ScheduleConfig {
        interval: interval.filter(|interval| !interval.is_zero()),
        run_on_start: file_schedule.run_on_start.unwrap_or(true),
    };

    Ok(Config {
        server,
        catalog,
        database,
        schedule,
        core: CoreSettings {
            scanner,
            parser,
            reconciler,
        },
        libraries,
        default_media_dir: env.media_dir.or(default_media_dir),
        metadata: ConfigMetadata::default(),
    })
}
