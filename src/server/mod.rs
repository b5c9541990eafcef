//! HTTP proxy that puts the worker between the browser and the origin.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::lifecycle::ServiceWorker;
use crate::network::HttpNetwork;
use crate::request::{Request, Response};
use crate::store::{CacheStorage, DynStorage};

/// Path of the status endpoint. Never forwarded to the origin.
pub const STATUS_PATH: &str = "/__offline-cache/status";

/// Worker type served by the proxy.
pub type ProxyWorker = ServiceWorker<DynStorage, HttpNetwork>;

/// Headers that describe the hop rather than the resource.
const HOP_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone)]
struct AppState {
    worker: Arc<RwLock<ProxyWorker>>,
}

fn into_http(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = axum::http::Response::builder().status(status);
    for (name, value) in response.headers() {
        if HOP_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(response.body().clone()))
        .unwrap_or_else(|e| {
            log::warn!("Dropping malformed response: {e}");
            StatusCode::BAD_GATEWAY.into_response()
        })
}

async fn proxy(State(state): State<AppState>, method: Method, uri: Uri) -> HttpResponse {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    let url = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);
    let request = Request::new(method.as_str(), url);

    let worker = state.worker.read().await;
    match worker.fetch(&request).await {
        Ok(response) => into_http(response),
        Err(e) => {
            log::warn!("Failed to serve {}: {e}", request.url());
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

async fn status(State(state): State<AppState>) -> HttpResponse {
    let worker = state.worker.read().await;
    let manager = worker.manager();
    match manager.storage().keys().await {
        Ok(generations) => axum::Json(serde_json::json!({
            "state": worker.state().to_string(),
            "scope": worker.scope(),
            "current": manager.current_generation(),
            "generations": generations,
            "stats": manager.stats().snapshot(),
        }))
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Builds the proxy router around a shared worker.
pub fn router(worker: Arc<RwLock<ProxyWorker>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(STATUS_PATH, get(status).layer(cors))
        .fallback(proxy)
        .with_state(AppState { worker })
}

/// Installs and activates the worker, then serves until `shutdown` fires.
///
/// A failed install is logged and the proxy keeps forwarding every request
/// to the origin, the same as a page whose worker never installed.
///
/// # Errors
///
/// Returns an error if the server cannot bind to the configured address.
pub async fn run_server(
    mut worker: ProxyWorker,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    match worker.install().await {
        Ok(report) => {
            log::info!("Installed {} ({} entries)", report.generation, report.entries);
            if let Err(e) = worker.activate().await {
                log::error!("Activation failed: {e}");
            }
        }
        Err(e) => log::error!("Install failed, serving from network only: {e}"),
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("invalid server address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Proxy listening on {addr}");

    let app = router(Arc::new(RwLock::new(worker)));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    log::info!("Proxy stopped");
    Ok(())
}
