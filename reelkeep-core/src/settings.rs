use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the filesystem probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScannerSettings {
    /// Lowercase container extensions, without the leading dot.
    pub video_extensions: Vec<String>,
    pub follow_links: bool,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            video_extensions: ["mp4", "mkv", "mov", "avi"]
                .into_iter()
                .map(String::from)
                .collect(),
            follow_links: true,
        }
    }
}

impl ScannerSettings {
    pub fn is_supported(&self, extension: &str) -> bool {
        self.video_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

/// Plausible year range used when pulling a year token out of a filename.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ParserSettings {
    pub min_year: u16,
    pub max_year: u16,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            min_year: 1900,
            max_year: 2099,
        }
    }
}

impl ParserSettings {
    pub fn accepts(&self, year: u16) -> bool {
        (self.min_year..=self.max_year).contains(&year)
    }
}

/// What a catalog search error does to the rest of a reconcile pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchErrorPolicy {
    /// Return the error and stop the pass.
    #[default]
    Abort,
    /// Log, count the record as failed and move on.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcilerSettings {
    pub catalog_timeout_ms: u64,
    pub search_error_policy: SearchErrorPolicy,
    /// Capacity of the episode worker pool, i.e. the ceiling on concurrent
    /// catalog calls.
    pub max_in_flight: usize,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            catalog_timeout_ms: 10_000,
            search_error_policy: SearchErrorPolicy::Abort,
            max_in_flight: 10,
        }
    }
}

impl ReconcilerSettings {
    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoreSettings {
    pub scanner: ScannerSettings,
    pub parser: ParserSettings,
    pub reconciler: ReconcilerSettings,
}
