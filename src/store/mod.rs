//! Cache store abstraction.
//!
//! A store holds named cache generations, each mapping requests to stored
//! responses. The manager only ever talks to a store through
//! [`CacheStorage`], so tests and embedders can plug in their own.

mod disk;
mod memory;

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{Request, Response};

/// Abstraction over a persistent request/response cache.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens the named generation, creating it empty if absent.
    async fn open(&self, name: &str) -> Result<()>;

    /// Stores every pair into the named generation, creating it if needed.
    ///
    /// Either all pairs become visible or none do. Existing entries with the
    /// same request are replaced.
    async fn add_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()>;

    /// Looks `request` up across all generations in creation order.
    ///
    /// Non-`GET` requests never match.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>>;

    /// Returns the names of all generations in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Deletes a generation with all its entries.
    ///
    /// Returns `false` if no generation had that name.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Lists the requests stored in a generation, ordered by URL.
    ///
    /// An unknown generation yields an empty list.
    async fn requests(&self, name: &str) -> Result<Vec<Request>>;
}

/// Type-erased store, used when the backend is picked from configuration.
pub type DynStorage = Box<dyn CacheStorage>;

#[async_trait]
impl<T: CacheStorage + ?Sized> CacheStorage for Box<T> {
    async fn open(&self, name: &str) -> Result<()> {
        (**self).open(name).await
    }

    async fn add_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
        (**self).add_all(name, entries).await
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        (**self).match_request(request).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        (**self).keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        (**self).delete(name).await
    }

    async fn requests(&self, name: &str) -> Result<Vec<Request>> {
        (**self).requests(name).await
    }
}

#[async_trait]
impl<T: CacheStorage + ?Sized> CacheStorage for Arc<T> {
    async fn open(&self, name: &str) -> Result<()> {
        (**self).open(name).await
    }

    async fn add_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
        (**self).add_all(name, entries).await
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        (**self).match_request(request).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        (**self).keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        (**self).delete(name).await
    }

    async fn requests(&self, name: &str) -> Result<Vec<Request>> {
        (**self).requests(name).await
    }
}
