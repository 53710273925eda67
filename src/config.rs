use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

/// Configuration file name, looked up at the workspace root.
pub const CONFIG_FILE: &str = "scan-cache.toml";

/// Configuration loaded from `scan-cache.toml` at the workspace root.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ScanCacheConfig {
    /// Path patterns excluded from workspace content (beyond .gitignore and node_modules).
    pub exclude: Option<Vec<String>>,
    pub invalidation: InvalidationConfig,
    pub analysis: AnalysisConfig,
    pub watch: WatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InvalidationConfig {
    /// Above this many evicted files the whole workspace cache is dropped.
    pub bulk_eviction_threshold: usize,
    /// Delay before an interrupted analysis is restarted.
    pub rescan_delay_ms: u64,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self {
            bulk_eviction_threshold: 10,
            rescan_delay_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Override the extensions the static analyzer accepts.
    pub extensions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 75 }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl ScanCacheConfig {
    /// Load configuration from `scan-cache.toml` in the given root directory.
    ///
    /// Returns the default configuration if the file does not exist or cannot be parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!("failed to parse {CONFIG_FILE}: {err}. Using defaults.");
                    Self::default()
                }
            },
            Err(err) => {
                warn!("failed to read {CONFIG_FILE}: {err}. Using defaults.");
                Self::default()
            }
        }
    }

    /// Process-wide configuration when watching several roots: the first
    /// root's file governs invalidation, analysis, watch and logging
    /// settings. Only `exclude` is read per root, see [`Self::exclude_patterns`].
    pub fn load_for_roots(roots: &[PathBuf]) -> Self {
        roots.first().map(|root| Self::load(root)).unwrap_or_default()
    }

    pub fn exclude_patterns(&self) -> Vec<String> {
        self.exclude.clone().unwrap_or_default()
    }
}
