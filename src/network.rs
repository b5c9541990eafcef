//! Network abstraction used on cache misses and during install.

use async_trait::async_trait;
use reqwest::{Client, Method, Url};

use crate::config::OriginConfig;
use crate::error::{Error, Result};
use crate::request::{Request, Response};

/// Abstraction over the network for testability.
#[async_trait]
pub trait Network: Send + Sync {
    /// Issues `request` and returns whatever the server answered.
    ///
    /// Non-2xx statuses are returned as responses; only transport failures
    /// are errors.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Default network implementation: an HTTP client bound to one origin.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
    origin: Url,
}

impl HttpNetwork {
    /// Creates a network client for the configured origin.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: &OriginConfig) -> Result<Self> {
        let origin = Url::parse(&config.base_url)
            .map_err(|e| Error::Config(format!("invalid origin URL {:?}: {e}", config.base_url)))?;
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(8)
            .build()?;
        Ok(Self { client, origin })
    }

    /// Returns the origin requests are resolved against.
    #[must_use]
    pub const fn origin(&self) -> &Url {
        &self.origin
    }

    /// Resolves a request URL against the origin.
    ///
    /// The result always stays on the origin: scheme-relative (`//host/x`)
    /// and absolute URLs pointing elsewhere are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the URL cannot be resolved or leaves
    /// the origin.
    pub fn resolve(&self, url: &str) -> Result<Url> {
        let resolved = self.origin.join(url).map_err(|e| Error::Network {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let same_origin = resolved.scheme() == self.origin.scheme()
            && resolved.host_str() == self.origin.host_str()
            && resolved.port_or_known_default() == self.origin.port_or_known_default();
        if !same_origin {
            return Err(Error::Network {
                url: url.to_string(),
                reason: format!("refusing to leave origin {}", self.origin.origin().ascii_serialization()),
            });
        }
        Ok(resolved)
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let url = self.resolve(request.url())?;
        let method = Method::from_bytes(request.method().as_bytes()).map_err(|e| Error::Network {
            url: request.url().to_string(),
            reason: e.to_string(),
        })?;
        let network_error = |e: reqwest::Error| Error::Network {
            url: request.url().to_string(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(network_error)?;

        Ok(Response::new(status, body).with_headers(headers))
    }
}
