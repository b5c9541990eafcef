//! Error types for the offline-cache library.

use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Errors that can occur while installing, serving or pruning caches.
#[derive(Error, Debug)]
pub enum Error {
    /// A manifest resource could not be downloaded during install.
    #[error("Failed to pre-cache {url}: {reason}")]
    ManifestFetch {
        /// Manifest entry that failed.
        url: String,
        /// Underlying failure (transport error or unexpected status).
        reason: String,
    },

    /// A request could not be completed over the network.
    #[error("Network request for {url} failed: {reason}")]
    Network {
        /// Requested URL.
        url: String,
        /// Underlying transport failure.
        reason: String,
    },

    /// HTTP client construction or usage error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error inside a cache store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cache store held data it could not decode.
    #[error("Cache storage error: {0}")]
    Storage(String),

    /// A lifecycle event arrived in a state that does not accept it.
    #[error("Cannot handle {event} while worker is {state}")]
    InvalidTransition {
        /// State the worker was in.
        state: LifecycleState,
        /// Name of the rejected event.
        event: &'static str,
    },

    /// Configuration is present but invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Command line could not be understood.
    #[error("{0}")]
    Usage(String),

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Entry metadata could not be encoded.
    #[error("Failed to encode cache entry: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// A specialized `Result` type for offline-cache operations.
pub type Result<T> = std::result::Result<T, Error>;
