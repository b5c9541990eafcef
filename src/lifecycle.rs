//! Worker lifecycle: registration, install, activation and fetch dispatch.
//!
//! The host decides when each event fires; the worker only checks that an
//! event is legal in its current state and runs the matching manager action.

use std::fmt;

use crate::error::{Error, Result};
use crate::manager::OfflineCacheManager;
use crate::network::Network;
use crate::request::{Request, Response};
use crate::stats::{ActivationReport, InstallReport};
use crate::store::CacheStorage;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Registered, not installed yet (or a previous install failed).
    Parsed,
    /// Manifest is being pre-cached.
    Installing,
    /// Manifest is cached; waiting for activation.
    Installed,
    /// Stale generations are being removed.
    Activating,
    /// Controls the page and answers fetches from the cache.
    Activated,
    /// Retired; rejects every event.
    Redundant,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Events delivered by the host.
#[derive(Debug, Clone)]
pub enum Event {
    Install,
    Activate,
    Fetch(Request),
}

impl Event {
    const fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Fetch(_) => "fetch",
        }
    }
}

/// Result of dispatching an [`Event`].
#[derive(Debug)]
pub enum Outcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    Response(Response),
}

/// A registered offline-cache worker.
pub struct ServiceWorker<S: CacheStorage, N: Network> {
    manager: OfflineCacheManager<S, N>,
    scope: String,
    state: LifecycleState,
}

impl<S: CacheStorage, N: Network> ServiceWorker<S, N> {
    /// Registers a worker for `scope`. The worker starts out [`LifecycleState::Parsed`].
    #[must_use]
    pub fn register(manager: OfflineCacheManager<S, N>, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        log::info!(
            "Registered worker for scope {scope} (cache {})",
            manager.current_generation()
        );
        Self {
            manager,
            scope,
            state: LifecycleState::Parsed,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns the registration scope.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns the wrapped manager.
    #[must_use]
    pub const fn manager(&self) -> &OfflineCacheManager<S, N> {
        &self.manager
    }

    fn reject(&self, event: &Event) -> Error {
        Error::InvalidTransition {
            state: self.state,
            event: event.name(),
        }
    }

    /// Dispatches a host event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the event is not accepted in
    /// the current state, or the error of the action it triggered.
    pub async fn dispatch(&mut self, event: Event) -> Result<Outcome> {
        match event {
            Event::Install => self.install().await.map(Outcome::Installed),
            Event::Activate => self.activate().await.map(Outcome::Activated),
            Event::Fetch(request) => self.fetch(&request).await.map(Outcome::Response),
        }
    }

    /// Runs the install step.
    ///
    /// On failure the worker goes back to [`LifecycleState::Parsed`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the worker is parsed, or
    /// the install error.
    pub async fn install(&mut self) -> Result<InstallReport> {
        // An install interrupted mid-way may be started again.
        if !matches!(self.state, LifecycleState::Parsed | LifecycleState::Installing) {
            return Err(self.reject(&Event::Install));
        }
        self.state = LifecycleState::Installing;
        match self.manager.install().await {
            Ok(report) => {
                self.state = LifecycleState::Installed;
                Ok(report)
            }
            Err(e) => {
                self.state = LifecycleState::Parsed;
                Err(e)
            }
        }
    }

    /// Runs the activation step.
    ///
    /// Activating an already active worker re-runs the cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the worker is installed
    /// or active, or the error from listing generations.
    pub async fn activate(&mut self) -> Result<ActivationReport> {
        let previous = self.state;
        if !matches!(
            previous,
            LifecycleState::Installed | LifecycleState::Activating | LifecycleState::Activated
        ) {
            return Err(self.reject(&Event::Activate));
        }
        self.state = LifecycleState::Activating;
        match self.manager.activate().await {
            Ok(report) => {
                self.state = LifecycleState::Activated;
                Ok(report)
            }
            Err(e) => {
                self.state = previous;
                Err(e)
            }
        }
    }

    /// Handles an intercepted request.
    ///
    /// Until the worker is active it does not control the page, so requests
    /// go straight to the network.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] once the worker is redundant, or
    /// the fetch error.
    pub async fn fetch(&self, request: &Request) -> Result<Response> {
        match self.state {
            LifecycleState::Activated => self.manager.fetch(request).await,
            LifecycleState::Redundant => Err(self.reject(&Event::Fetch(request.clone()))),
            _ => self.manager.network().fetch(request).await,
        }
    }

    /// Retires the worker.
    pub fn retire(&mut self) {
        log::info!("Worker for scope {} is now redundant", self.scope);
        self.state = LifecycleState::Redundant;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::manager::tests::MockNetwork;
    use crate::store::MemoryCacheStorage;

    fn worker(paths: &[&str]) -> ServiceWorker<MemoryCacheStorage, MockNetwork> {
        let config = CacheConfig::new()
            .with_version("v1")
            .with_manifest(paths.iter().copied());
        let manager =
            OfflineCacheManager::new(config, MemoryCacheStorage::new(), MockNetwork::serving(paths));
        ServiceWorker::register(manager, "/")
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let mut sw = worker(&["/", "/a.css"]);
        assert_eq!(sw.state(), LifecycleState::Parsed);
        assert_eq!(sw.scope(), "/");

        let outcome = sw.dispatch(Event::Install).await.unwrap();
        assert!(matches!(outcome, Outcome::Installed(ref r) if r.entries == 2));
        assert_eq!(sw.state(), LifecycleState::Installed);

        sw.dispatch(Event::Activate).await.unwrap();
        assert_eq!(sw.state(), LifecycleState::Activated);

        let calls = sw.manager().network().calls();
        let outcome = sw.dispatch(Event::Fetch(Request::get("/a.css"))).await.unwrap();
        assert!(matches!(outcome, Outcome::Response(ref r) if r.status() == 200));
        assert_eq!(sw.manager().network().calls(), calls);
    }

    #[tokio::test]
    async fn failed_install_stays_parsed() {
        let config = CacheConfig::new().with_version("v1").with_manifest(["/", "/missing"]);
        let manager =
            OfflineCacheManager::new(config, MemoryCacheStorage::new(), MockNetwork::serving(&["/"]));
        let mut sw = ServiceWorker::register(manager, "/");

        assert!(sw.dispatch(Event::Install).await.is_err());
        assert_eq!(sw.state(), LifecycleState::Parsed);

        // The page keeps working straight from the network.
        let response = sw.fetch(&Request::get("/")).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn activate_before_install_is_rejected() {
        let mut sw = worker(&["/"]);
        let err = sw.dispatch(Event::Activate).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                state: LifecycleState::Parsed,
                event: "activate"
            }
        ));
    }

    #[tokio::test]
    async fn second_install_is_rejected() {
        let mut sw = worker(&["/"]);
        sw.install().await.unwrap();
        assert!(matches!(
            sw.install().await,
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn fetch_before_activation_uses_network() {
        let mut sw = worker(&["/"]);
        sw.install().await.unwrap();
        let calls = sw.manager().network().calls();

        sw.fetch(&Request::get("/")).await.unwrap();
        assert_eq!(sw.manager().network().calls(), calls + 1);
        assert_eq!(sw.manager().stats().snapshot().hits, 0);
    }

    #[tokio::test]
    async fn reactivation_is_allowed() {
        let mut sw = worker(&["/"]);
        sw.install().await.unwrap();
        sw.activate().await.unwrap();
        let report = sw.activate().await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(sw.state(), LifecycleState::Activated);
    }

    #[tokio::test]
    async fn redundant_worker_rejects_everything() {
        let mut sw = worker(&["/"]);
        sw.retire();
        assert_eq!(sw.state(), LifecycleState::Redundant);
        assert!(sw.dispatch(Event::Install).await.is_err());
        assert!(sw.fetch(&Request::get("/")).await.is_err());
    }

    #[test]
    fn state_display() {
        assert_eq!(LifecycleState::Activated.to_string(), "activated");
        assert_eq!(LifecycleState::Parsed.to_string(), "parsed");
    }
}
