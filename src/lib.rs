//! offline-cache - an offline cache layer for a static website.
//!
//! A fixed manifest of site resources is pre-cached into a named cache
//! generation. Requests are then answered cache-first with network
//! fallback, and activating a new generation deletes every older one.
//!
//! # Example
//!
//! ```no_run
//! use offline_cache::{
//!     CacheConfig, Event, HttpNetwork, MemoryCacheStorage, OfflineCacheManager,
//!     OriginConfig, Request, ServiceWorker,
//! };
//!
//! # async fn example() -> offline_cache::Result<()> {
//! let network = HttpNetwork::new(&OriginConfig::default())?;
//! let manager = OfflineCacheManager::new(
//!     CacheConfig::default(),
//!     MemoryCacheStorage::new(),
//!     network,
//! );
//!
//! let mut worker = ServiceWorker::register(manager, "/");
//! worker.dispatch(Event::Install).await?;
//! worker.dispatch(Event::Activate).await?;
//!
//! let response = worker.fetch(&Request::get("/index.html")).await?;
//! println!("{} bytes", response.len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod manager;
pub mod network;
pub mod request;
pub mod stats;
pub mod store;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "server")]
pub mod server;

// Re-export main types for convenience
pub use config::{
    AppConfig, CacheConfig, DEFAULT_MANIFEST, DEFAULT_VERSION, OriginConfig, ServerConfig,
    StorageBackend, StorageConfig,
};
pub use error::{Error, Result};
pub use format::{format_bytes, format_duration};
pub use lifecycle::{Event, LifecycleState, Outcome, ServiceWorker};
pub use manager::{CacheObserver, NoObserver, OfflineCacheManager};
pub use network::{HttpNetwork, Network};
pub use request::{Request, Response};
pub use stats::{ActivationReport, CacheStats, InstallReport, StatsSnapshot};
pub use store::{CacheStorage, DiskCacheStorage, DynStorage, MemoryCacheStorage};

/// Builds the cache store selected by `config`.
#[must_use]
pub fn build_storage(config: &StorageConfig) -> DynStorage {
    match config.backend {
        StorageBackend::Memory => Box::new(MemoryCacheStorage::new()),
        StorageBackend::Disk => Box::new(DiskCacheStorage::new(config.directory.clone())),
    }
}

/// Builds a manager from application configuration.
///
/// # Errors
///
/// Returns an error if the origin URL is invalid or the HTTP client cannot
/// be built.
pub fn build_manager(config: &AppConfig) -> Result<OfflineCacheManager<DynStorage, HttpNetwork>> {
    config.validate()?;
    let network = HttpNetwork::new(&config.origin)?;
    Ok(OfflineCacheManager::new(
        config.cache.clone(),
        build_storage(&config.storage),
        network,
    ))
}
