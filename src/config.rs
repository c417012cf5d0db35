//! Configuration types for the cache worker and the CLI.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Names of the three stores the worker manages and the record key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheNames {
    /// Long-lived store requests are served from.
    pub content: String,
    /// Short-lived store holding the core shell between install and activate.
    pub staging: String,
    /// Store holding the previous version's manifest.
    pub manifest: String,
    /// Key of the manifest record inside the manifest store.
    pub record_key: String,
}

impl Default for CacheNames {
    fn default() -> Self {
        Self {
            content: "app-cache".to_string(),
            staging: "app-temp-cache".to_string(),
            manifest: "app-manifest".to_string(),
            record_key: "manifest".to_string(),
        }
    }
}

/// Behavior of the cache worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of concurrent network fetches when staging or
    /// downloading for offline use.
    pub concurrent_fetches: usize,
    /// Whether core shell files are fetched bypassing HTTP caches at install.
    pub reload_core_on_install: bool,
    /// Store names.
    pub names: CacheNames,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            concurrent_fetches: 6,
            reload_core_on_install: true,
            names: CacheNames::default(),
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store names.
    #[must_use]
    pub fn with_names(mut self, names: CacheNames) -> Self {
        self.names = names;
        self
    }

    /// Sets the fetch concurrency. Zero is treated as one.
    #[must_use]
    pub const fn with_concurrent_fetches(mut self, concurrent: usize) -> Self {
        self.concurrent_fetches = concurrent;
        self
    }

    /// Sets whether install bypasses HTTP caches.
    #[must_use]
    pub const fn with_reload_core_on_install(mut self, reload: bool) -> Self {
        self.reload_core_on_install = reload;
        self
    }

    /// Fetch concurrency, never below one.
    #[must_use]
    pub fn fetch_concurrency(&self) -> usize {
        self.concurrent_fetches.max(1)
    }
}

/// Complete application configuration for the `shellcache` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Origin the application is served from.
    pub origin: String,
    /// Manifest file produced by the build step.
    pub manifest_path: PathBuf,
    /// Directory holding the on-disk cache stores.
    pub storage_dir: PathBuf,
    /// Cache worker settings.
    pub cache: CacheConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            manifest_path: PathBuf::from("asset-manifest.json"),
            storage_dir: Self::default_storage_dir(),
            cache: CacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location (`$XDG_CONFIG_HOME/shell-cache/config.toml`).
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shell-cache")
            .join("config.toml")
    }

    /// Default storage directory.
    ///
    /// Uses `STATE_DIRECTORY` (set by systemd when `StateDirectory=` is configured),
    /// falling back to `$XDG_DATA_HOME/shell-cache/caches`.
    #[must_use]
    pub fn default_storage_dir() -> PathBuf {
        if let Ok(state_dir) = std::env::var("STATE_DIRECTORY") {
            PathBuf::from(state_dir).join("caches")
        } else {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("shell-cache")
                .join("caches")
        }
    }

    /// Parses a TOML config document. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the document is malformed.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads configuration from `path`, or from [`default_path`](Self::default_path)
    /// when `None`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                log::info!("Loaded config from {}", path.display());
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}
