//! The offline cache manager: install, cache-first fetch and activation.

use std::sync::Arc;
use std::time::Instant;

use futures::future::{join_all, try_join_all};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::request::{Request, Response};
use crate::stats::{ActivationReport, CacheStats, InstallReport};
use crate::store::CacheStorage;

/// Trait for receiving install and activation progress.
///
/// All methods have default no-op implementations for convenience.
pub trait CacheObserver: Send + Sync {
    /// Called once the generation is open, before any manifest fetch.
    fn on_install_start(&self, _generation: &str, _entries: usize) {}

    /// Called when a manifest entry has been downloaded.
    fn on_entry_fetched(&self, _url: &str, _bytes: u64) {}

    /// Called after the whole manifest has been stored.
    fn on_install_complete(&self, _report: &InstallReport) {}

    /// Called after a stale generation has been deleted.
    fn on_generation_deleted(&self, _name: &str) {}

    /// Called when deleting a stale generation failed.
    fn on_delete_failed(&self, _name: &str, _error: &str) {}
}

/// A null observer that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObserver;

impl CacheObserver for NoObserver {}

/// Serves a fixed, pre-seeded snapshot of the site cache-first.
///
/// The manager owns exactly one current generation, named by
/// [`CacheConfig::version`]. The configuration is fixed at construction.
pub struct OfflineCacheManager<S: CacheStorage, N: Network> {
    config: CacheConfig,
    storage: S,
    network: N,
    stats: CacheStats,
}

impl<S: CacheStorage, N: Network> OfflineCacheManager<S, N> {
    /// Creates a manager for the given generation configuration.
    #[must_use]
    pub const fn new(config: CacheConfig, storage: S, network: N) -> Self {
        Self {
            config,
            storage,
            network,
            stats: CacheStats::new(),
        }
    }

    /// Returns the generation configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Name of the current generation.
    #[must_use]
    pub fn current_generation(&self) -> &str {
        &self.config.version
    }

    /// Returns the underlying cache store.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the underlying network.
    #[must_use]
    pub const fn network(&self) -> &N {
        &self.network
    }

    /// Returns the fetch counters.
    #[must_use]
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Pre-caches the manifest into the current generation.
    ///
    /// # Errors
    ///
    /// See [`install_with`](Self::install_with).
    pub async fn install(&self) -> Result<InstallReport> {
        let observer: Arc<dyn CacheObserver> = Arc::new(NoObserver);
        self.install_with(&observer).await
    }

    /// Pre-caches the manifest into the current generation, reporting
    /// progress to `observer`.
    ///
    /// Every manifest entry is fetched concurrently. Nothing is stored unless
    /// all of them succeed with a 2xx status; there is no retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManifestFetch`] for the first entry that failed, or a
    /// store error if the generation cannot be opened or written.
    pub async fn install_with(&self, observer: &Arc<dyn CacheObserver>) -> Result<InstallReport> {
        let started = Instant::now();
        let generation = self.current_generation();

        self.storage.open(generation).await?;
        log::info!("Opened cache {generation}");
        observer.on_install_start(generation, self.config.manifest.len());

        let fetches = self.config.manifest.iter().map(|path| async move {
            let request = Request::get(path);
            let response =
                self.network
                    .fetch(&request)
                    .await
                    .map_err(|e| Error::ManifestFetch {
                        url: path.clone(),
                        reason: e.to_string(),
                    })?;
            if !response.is_ok() {
                return Err(Error::ManifestFetch {
                    url: path.clone(),
                    reason: format!("unexpected status {}", response.status()),
                });
            }
            observer.on_entry_fetched(path, response.len());
            Ok((request, response))
        });

        let entries = match try_join_all(fetches).await {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Install of {generation} failed: {e}");
                return Err(e);
            }
        };

        let count = entries.len();
        let total_bytes = entries.iter().map(|(_, response)| response.len()).sum();
        self.storage.add_all(generation, entries).await?;

        let report = InstallReport {
            generation: generation.to_string(),
            entries: count,
            total_bytes,
            elapsed: started.elapsed(),
        };
        log::info!("Cached {count} resources into {generation}");
        observer.on_install_complete(&report);
        Ok(report)
    }

    /// Answers a request cache-first.
    ///
    /// A stored response is returned as is, without revalidation. On a miss
    /// the request goes to the network and the answer is returned without
    /// being stored.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails, or [`Error::Network`] if
    /// the request missed the cache and the network failed.
    pub async fn fetch(&self, request: &Request) -> Result<Response> {
        if let Some(response) = self.storage.match_request(request).await? {
            self.stats.record_hit();
            log::debug!("Cache hit: {}", request.cache_key());
            return Ok(response);
        }

        self.stats.record_miss();
        log::debug!("Cache miss: {}", request.cache_key());
        self.network.fetch(request).await.inspect_err(|e| {
            self.stats.record_network_error();
            log::warn!("{e}");
        })
    }

    /// Deletes every generation other than the current one.
    ///
    /// # Errors
    ///
    /// See [`activate_with`](Self::activate_with).
    pub async fn activate(&self) -> Result<ActivationReport> {
        let observer: Arc<dyn CacheObserver> = Arc::new(NoObserver);
        self.activate_with(&observer).await
    }

    /// Deletes every generation other than the current one, reporting to
    /// `observer`.
    ///
    /// Deletions are independent: one failing is logged and recorded in the
    /// report without stopping the others.
    ///
    /// # Errors
    ///
    /// Returns an error only if the generation names cannot be listed.
    pub async fn activate_with(
        &self,
        observer: &Arc<dyn CacheObserver>,
    ) -> Result<ActivationReport> {
        let current = self.current_generation();
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != current)
            .collect();

        let results = join_all(stale.iter().map(|name| async move {
            log::info!("Deleting old cache: {name}");
            (name, self.storage.delete(name).await)
        }))
        .await;

        let mut report = ActivationReport::default();
        for (name, result) in results {
            match result {
                Ok(true) => {
                    observer.on_generation_deleted(name);
                    report.deleted.push(name.clone());
                }
                // Already removed by someone else.
                Ok(false) => {}
                Err(e) => {
                    log::warn!("Failed to delete cache {name}: {e}");
                    observer.on_delete_failed(name, &e.to_string());
                    report.failed.push((name.clone(), e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Requests stored in the current generation, ordered by URL.
    ///
    /// # Errors
    ///
    /// Returns a store error if the generation cannot be read.
    pub async fn entries(&self) -> Result<Vec<Request>> {
        self.storage.requests(self.current_generation()).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryCacheStorage;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// A scripted network that counts calls and can be taken offline.
    #[derive(Default)]
    pub(crate) struct MockNetwork {
        responses: Mutex<HashMap<String, Response>>,
        calls: AtomicUsize,
        offline: AtomicBool,
    }

    impl MockNetwork {
        pub(crate) fn serving(paths: &[&str]) -> Self {
            let net = Self::default();
            for path in paths {
                net.serve(path, Response::new(200, format!("content of {path}")));
            }
            net
        }

        pub(crate) fn serve(&self, path: &str, response: Response) {
            self.responses
                .lock()
                .unwrap()
                .insert(path.to_string(), response);
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Network for MockNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(Error::Network {
                    url: request.url().to_string(),
                    reason: "offline".to_string(),
                });
            }
            Ok(self
                .responses
                .lock()
                .unwrap()
                .get(request.url())
                .cloned()
                .unwrap_or_else(|| Response::new(404, "not found")))
        }
    }

    /// Memory store whose deletes fail for selected names.
    #[derive(Default)]
    struct StubbornStorage {
        inner: MemoryCacheStorage,
        undeletable: HashSet<String>,
    }

    #[async_trait]
    impl CacheStorage for StubbornStorage {
        async fn open(&self, name: &str) -> Result<()> {
            self.inner.open(name).await
        }

        async fn add_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
            self.inner.add_all(name, entries).await
        }

        async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
            self.inner.match_request(request).await
        }

        async fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys().await
        }

        async fn delete(&self, name: &str) -> Result<bool> {
            if self.undeletable.contains(name) {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "locked",
                )));
            }
            self.inner.delete(name).await
        }

        async fn requests(&self, name: &str) -> Result<Vec<Request>> {
            self.inner.requests(name).await
        }
    }

    fn manager(
        version: &str,
        manifest: &[&str],
        net: MockNetwork,
    ) -> OfflineCacheManager<MemoryCacheStorage, MockNetwork> {
        let config = CacheConfig::new()
            .with_version(version)
            .with_manifest(manifest.iter().copied());
        OfflineCacheManager::new(config, MemoryCacheStorage::new(), net)
    }

    #[tokio::test]
    async fn install_caches_every_manifest_entry() {
        let m = manager("v1", &["/", "/a.css"], MockNetwork::serving(&["/", "/a.css"]));

        let report = m.install().await.unwrap();
        assert_eq!(report.generation, "v1");
        assert_eq!(report.entries, 2);
        assert_eq!(m.storage().entry_count("v1").await, Some(2));
        assert_eq!(m.network().calls(), 2);

        for path in ["/", "/a.css"] {
            let response = m.fetch(&Request::get(path)).await.unwrap();
            assert_eq!(response.body().as_ref(), format!("content of {path}").as_bytes());
        }
        // Served from cache, no extra network calls.
        assert_eq!(m.network().calls(), 2);
        assert_eq!(m.stats().snapshot().hits, 2);
    }

    #[tokio::test]
    async fn install_fails_as_a_whole_on_missing_resource() {
        let m = manager("v1", &["/", "/gone.css"], MockNetwork::serving(&["/"]));

        let err = m.install().await.unwrap_err();
        match err {
            Error::ManifestFetch { url, reason } => {
                assert_eq!(url, "/gone.css");
                assert!(reason.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Generation was opened but nothing was stored.
        assert_eq!(m.storage().entry_count("v1").await, Some(0));
    }

    #[tokio::test]
    async fn install_fails_when_offline() {
        let net = MockNetwork::serving(&["/"]);
        net.set_offline(true);
        let m = manager("v1", &["/"], net);

        assert!(matches!(m.install().await, Err(Error::ManifestFetch { .. })));
        assert!(m.fetch(&Request::get("/")).await.is_err());
    }

    #[tokio::test]
    async fn miss_goes_to_network_once_and_is_not_stored() {
        let net = MockNetwork::serving(&["/", "/extra.js"]);
        let m = manager("v1", &["/"], net);
        m.install().await.unwrap();
        let calls_after_install = m.network().calls();

        let response = m.fetch(&Request::get("/extra.js")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(m.network().calls(), calls_after_install + 1);
        assert_eq!(m.storage().entry_count("v1").await, Some(1));

        // Still a miss the second time around.
        m.fetch(&Request::get("/extra.js")).await.unwrap();
        assert_eq!(m.network().calls(), calls_after_install + 2);
        assert_eq!(m.stats().snapshot().misses, 2);
    }

    #[tokio::test]
    async fn offline_miss_surfaces_network_error() {
        let m = manager("v1", &["/"], MockNetwork::serving(&["/"]));
        m.install().await.unwrap();
        m.network().set_offline(true);

        // Cached entries still work offline.
        assert!(m.fetch(&Request::get("/")).await.is_ok());

        let err = m.fetch(&Request::get("/uncached.png")).await.unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
        assert_eq!(m.stats().snapshot().network_errors, 1);
    }

    #[tokio::test]
    async fn non_get_requests_bypass_cache() {
        let m = manager("v1", &["/"], MockNetwork::serving(&["/"]));
        m.install().await.unwrap();
        let calls = m.network().calls();

        m.fetch(&Request::new("POST", "/")).await.unwrap();
        assert_eq!(m.network().calls(), calls + 1);
    }

    #[tokio::test]
    async fn activate_removes_other_generations() {
        let m = manager("v2", &["/"], MockNetwork::serving(&["/"]));
        m.storage().open("v0").await.unwrap();
        m.storage().open("v1").await.unwrap();
        m.install().await.unwrap();

        let report = m.activate().await.unwrap();
        assert_eq!(report.deleted, vec!["v0", "v1"]);
        assert!(report.is_clean());
        assert_eq!(m.storage().keys().await.unwrap(), vec!["v2"]);
    }

    #[tokio::test]
    async fn activate_twice_is_idempotent() {
        let m = manager("v2", &["/"], MockNetwork::serving(&["/"]));
        m.storage().open("v1").await.unwrap();
        m.install().await.unwrap();

        m.activate().await.unwrap();
        let keys_once = m.storage().keys().await.unwrap();
        let second = m.activate().await.unwrap();

        assert!(second.deleted.is_empty());
        assert_eq!(m.storage().keys().await.unwrap(), keys_once);
    }

    #[tokio::test]
    async fn failed_delete_does_not_block_others() {
        let storage = StubbornStorage {
            undeletable: HashSet::from(["v0".to_string()]),
            ..StubbornStorage::default()
        };
        storage.open("v0").await.unwrap();
        storage.open("v1").await.unwrap();
        let config = CacheConfig::new().with_version("v2").with_manifest(["/"]);
        let m = OfflineCacheManager::new(config, storage, MockNetwork::serving(&["/"]));
        m.install().await.unwrap();

        let report = m.activate().await.unwrap();
        assert_eq!(report.deleted, vec!["v1"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "v0");
        assert_eq!(m.storage().keys().await.unwrap(), vec!["v0", "v2"]);
    }

    #[tokio::test]
    async fn version_bump_scenario() {
        let storage = Arc::new(MemoryCacheStorage::new());

        let v1 = OfflineCacheManager::new(
            CacheConfig::new().with_version("v1").with_manifest(["/", "/a.css"]),
            Arc::clone(&storage),
            MockNetwork::serving(&["/", "/a.css", "/b.js"]),
        );
        v1.install().await.unwrap();
        assert_eq!(storage.entry_count("v1").await, Some(2));

        let v2 = OfflineCacheManager::new(
            CacheConfig::new()
                .with_version("v2")
                .with_manifest(["/", "/a.css", "/b.js"]),
            Arc::clone(&storage),
            MockNetwork::serving(&["/", "/a.css", "/b.js"]),
        );
        v2.install().await.unwrap();
        assert_eq!(storage.entry_count("v2").await, Some(3));
        assert_eq!(storage.entry_count("v1").await, Some(2));

        v2.activate().await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["v2"]);
        assert_eq!(v2.entries().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn version_bump_on_disk_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let net = || MockNetwork::serving(&["/", "/a.css", "/b.js"]);

        let v1 = OfflineCacheManager::new(
            CacheConfig::new().with_version("v1").with_manifest(["/", "/a.css"]),
            crate::store::DiskCacheStorage::new(dir.path()),
            net(),
        );
        v1.install().await.unwrap();
        v1.activate().await.unwrap();

        let v2 = OfflineCacheManager::new(
            CacheConfig::new()
                .with_version("v2")
                .with_manifest(["/", "/a.css", "/b.js"]),
            crate::store::DiskCacheStorage::new(dir.path()),
            net(),
        );
        v2.install().await.unwrap();
        assert_eq!(v2.storage().keys().await.unwrap(), vec!["v1", "v2"]);
        assert_eq!(v2.entries().await.unwrap().len(), 3);

        let report = v2.activate().await.unwrap();
        assert_eq!(report.deleted, vec!["v1"]);
        assert_eq!(v2.storage().keys().await.unwrap(), vec!["v2"]);

        v2.network().set_offline(true);
        let response = v2.fetch(&Request::get("/b.js")).await.unwrap();
        assert_eq!(response.body().as_ref(), b"content of /b.js");
    }

    #[tokio::test]
    async fn observer_sees_install_and_activation() {
        #[derive(Default)]
        struct Recorder {
            events: Mutex<Vec<String>>,
        }

        impl CacheObserver for Recorder {
            fn on_install_start(&self, generation: &str, entries: usize) {
                self.events
                    .lock()
                    .unwrap()
                    .push(format!("start {generation} {entries}"));
            }
            fn on_entry_fetched(&self, _url: &str, _bytes: u64) {
                self.events.lock().unwrap().push("fetched".into());
            }
            fn on_install_complete(&self, report: &InstallReport) {
                self.events
                    .lock()
                    .unwrap()
                    .push(format!("complete {}", report.entries));
            }
            fn on_generation_deleted(&self, name: &str) {
                self.events.lock().unwrap().push(format!("deleted {name}"));
            }
        }

        let m = manager("v2", &["/", "/a.css"], MockNetwork::serving(&["/", "/a.css"]));
        m.storage().open("v1").await.unwrap();
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn CacheObserver> = Arc::clone(&recorder) as Arc<dyn CacheObserver>;

        m.install_with(&observer).await.unwrap();
        m.activate_with(&observer).await.unwrap();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "start v2 2".to_string(),
                "fetched".to_string(),
                "fetched".to_string(),
                "complete 2".to_string(),
                "deleted v1".to_string(),
            ]
        );
    }

    #[test]
    fn no_observer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoObserver>();
    }
}
