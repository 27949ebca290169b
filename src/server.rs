//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared, immutable state holding config,
//! HTTP client, user-agent pool, stats, and uptime), [`build_router`] for
//! constructing the Axum router with middleware layers,
//! [`build_http_client`] for the connection-pooled hyper client, and
//! [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get};
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::model::Config;
use crate::config::ConfigVersion;
use crate::health::health_handler;
use crate::proxy;
use crate::proxy::user_agent::UserAgentPool;
use crate::rewrite::url::{normalize_origin, ProxyEndpoint};

#[derive(Debug)]
pub struct Stats {
    /// Requests answered with an upstream response.
    pub proxied: AtomicU64,
    /// Requests answered with the error document.
    pub failed: AtomicU64,
    /// Responses whose body went through a transform.
    pub rewritten: AtomicU64,
    /// References left as-is because they could not be resolved.
    pub unresolved: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            proxied: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rewritten: AtomicU64::new(0),
            unresolved: AtomicU64::new(0),
        }
    }
}

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub struct AppState {
    pub config: Arc<Config>,
    pub version: ConfigVersion,
    pub source_name: String,
    pub http_client: HttpClient,
    pub user_agents: UserAgentPool,
    pub endpoint: ProxyEndpoint,
    pub start_time: Instant,
    pub stats: Stats,
}

impl AppState {
    /// Derive the per-process state from a loaded config.
    #[must_use]
    pub fn new(config: Config, version: ConfigVersion, source_name: impl Into<String>) -> Self {
        let user_agents = UserAgentPool::from_settings(&config.upstream);
        let mut endpoint = ProxyEndpoint::new(config.proxy.path.clone());
        if let Some(origin) = config.proxy.public_origin.as_deref().and_then(normalize_origin) {
            endpoint = endpoint.with_origin(origin);
        }
        Self {
            config: Arc::new(config),
            version,
            source_name: source_name.into(),
            http_client: build_http_client(),
            user_agents,
            endpoint,
            start_time: Instant::now(),
            stats: Stats::new(),
        }
    }
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let max_body = state.config.limits.max_request_body;
    let proxy_path = state.config.proxy.path.clone();

    Router::new()
        .route("/health", get(health_handler))
        .route(&proxy_path, any(proxy::proxy_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_body))
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
