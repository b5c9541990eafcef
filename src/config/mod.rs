//! Configuration for cache generations, the origin server and storage.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the cache generation shipped with the site.
pub const DEFAULT_VERSION: &str = "allmohtarif-v1";

/// Resources pre-cached by default.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/styles/main.css",
    "/scripts/main.js",
    "/manifest.json",
    "/images/hero_tech_7.webp",
    "/images/facebook_update_9.jpg",
    "/images/blogger_template_2.jpg",
    "/images/money_earning_4.jpg",
    "/images/hidden_camera_7.jpg",
    "/images/nintendo_3ds_6.jpg",
    "/images/ipad_cover_3.jpg",
];

/// The current cache generation and what goes into it.
///
/// Bump `version` whenever `manifest` changes so that the next activation
/// evicts the previous generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of the current cache generation.
    pub version: String,
    /// Root-relative paths pre-cached on install, in order.
    pub manifest: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            manifest: DEFAULT_MANIFEST.iter().map(ToString::to_string).collect(),
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache generation name.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Replaces the manifest.
    #[must_use]
    pub fn with_manifest<I, S>(mut self, manifest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manifest = manifest.into_iter().map(Into::into).collect();
        self
    }

    /// Checks that the version is set and every manifest entry is a unique
    /// root-relative path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::Config("cache version must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for entry in &self.manifest {
            if !entry.starts_with('/') || entry.starts_with("//") {
                return Err(Error::Config(format!(
                    "manifest entry {entry:?} must be a path starting with a single '/'"
                )));
            }
            if !seen.insert(entry.as_str()) {
                return Err(Error::Config(format!("duplicate manifest entry {entry:?}")));
            }
        }
        Ok(())
    }
}

/// The origin server requests are forwarded to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL that root-relative paths are resolved against.
    pub base_url: String,
    /// User agent sent with every request.
    pub user_agent: String,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/".to_string(),
            user_agent: format!("offline-cache/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout_secs: 10,
        }
    }
}

impl OriginConfig {
    /// Returns the connect timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Which cache store backs the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Generations live in process memory and vanish on exit.
    Memory,
    /// Generations are persisted under `StorageConfig::directory`.
    #[default]
    Disk,
}

/// Cache store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store implementation.
    pub backend: StorageBackend,
    /// Root directory of the disk store.
    pub directory: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            backend: StorageBackend::default(),
            directory: cache_dir.join("offline-cache"),
        }
    }
}

/// Proxy server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Scope the worker controls, logged on registration.
    pub scope: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            scope: "/".to_string(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Cache generation settings.
    pub cache: CacheConfig,
    /// Origin server settings.
    pub origin: OriginConfig,
    /// Cache store settings.
    pub storage: StorageConfig,
    /// Proxy server settings.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the configuration file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("offline-cache")
            .join("config.toml")
    }

    /// Parses and validates a configuration from TOML text.
    ///
    /// Missing sections and keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Loads from `path` if given, otherwise from [`default_path`](Self::default_path)
    /// when that file exists, otherwise returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            log::info!("Loading config from {}", path.display());
            return Self::load(path);
        }
        let default_path = Self::default_path();
        if default_path.exists() {
            log::info!("Loading config from {}", default_path.display());
            Self::load(&default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        reqwest::Url::parse(&self.origin.base_url).map_err(|e| {
            Error::Config(format!("invalid origin URL {:?}: {e}", self.origin.base_url))
        })?;
        Ok(())
    }
}
