//! The embedding proxy endpoint.
//!
//! [`proxy_handler`] serves `{proxy.path}?url=<target>` for every method.
//! It validates the target, fetches it through [`upstream`] with
//! browser-like [`headers`], and hands the response to [`dispatch`], which
//! streams binary content and rewrites text content. Every response,
//! including errors, carries permissive CORS headers.

pub mod decode;
pub mod dispatch;
pub mod headers;
pub mod upstream;
pub mod user_agent;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::HOST;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tokio::time::Instant;
use url::Url;

use crate::error::ProxyError;
use crate::rewrite::url::{normalize_origin, target_param, ProxyEndpoint};
use crate::server::AppState;

use self::dispatch::{BodyBudget, Dispatched};
use self::upstream::{FetchPolicy, UpstreamRequest};

pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    req_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = req_headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    let mut response = if method == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        forward(&state, method, &uri, &req_headers, body, &correlation_id).await
    };

    headers::apply_cors(response.headers_mut());
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert("x-correlation-id", value);
    }
    response
}

async fn forward(
    state: &AppState,
    method: Method,
    uri: &Uri,
    req_headers: &HeaderMap,
    body: Bytes,
    correlation_id: &str,
) -> Response {
    let started = std::time::Instant::now();

    let target = match parse_target(uri.query()) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(
                correlation_id = %correlation_id,
                query = uri.query().unwrap_or_default(),
                error = %e,
                "rejected proxy request"
            );
            return e.into_response();
        }
    };

    tracing::info!(
        correlation_id = %correlation_id,
        method = %method,
        target = %target,
        "request received"
    );

    let endpoint = request_endpoint(&state.endpoint, uri, req_headers);
    match fetch_and_dispatch(state, &endpoint, method, target.clone(), req_headers, body).await {
        Ok(Dispatched {
            response,
            kind,
            report,
        }) => {
            state.stats.proxied.fetch_add(1, Ordering::Relaxed);
            let unresolved = report.map_or(0, |r| r.unresolved);
            if let Some(report) = report {
                state.stats.rewritten.fetch_add(1, Ordering::Relaxed);
                state
                    .stats
                    .unresolved
                    .fetch_add(report.unresolved as u64, Ordering::Relaxed);
            }
            tracing::info!(
                correlation_id = %correlation_id,
                target = %target,
                status = response.status().as_u16(),
                kind = kind.as_str(),
                rewritten = report.map_or(0, |r| r.rewritten),
                unresolved,
                latency_ms = elapsed_ms(started),
                "request proxied"
            );
            response
        }
        Err(e) => {
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                correlation_id = %correlation_id,
                target = %target,
                error = %e,
                latency_ms = elapsed_ms(started),
                "upstream request failed"
            );
            e.into_response()
        }
    }
}

async fn fetch_and_dispatch(
    state: &AppState,
    endpoint: &ProxyEndpoint,
    method: Method,
    target: Url,
    req_headers: &HeaderMap,
    body: Bytes,
) -> Result<Dispatched, ProxyError> {
    let upstream_settings = &state.config.upstream;
    let timeout_ms = upstream_settings.timeout_ms;
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);

    let upstream = upstream::fetch(
        &state.http_client,
        UpstreamRequest {
            method,
            target,
            inbound_headers: req_headers,
            body,
        },
        FetchPolicy {
            agents: &state.user_agents,
            accept_language: &upstream_settings.accept_language,
            max_redirects: upstream_settings.max_redirects,
            timeout_ms,
            deadline,
        },
    )
    .await?;

    dispatch::dispatch(
        upstream,
        endpoint,
        BodyBudget {
            limit: state.config.limits.max_rewrite_body,
            deadline,
            timeout_ms,
        },
    )
    .await
}

/// Endpoint as this client reaches it: the configured public origin, else
/// the request's own host, with the scheme taken from `X-Forwarded-Proto`.
/// Falls back to root-relative references when neither is usable.
fn request_endpoint(configured: &ProxyEndpoint, uri: &Uri, headers: &HeaderMap) -> ProxyEndpoint {
    if configured.origin().is_some() {
        return configured.clone();
    }
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(axum::http::uri::Authority::as_str));
    let Some(host) = host else {
        return configured.clone();
    };
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|proto| proto.eq_ignore_ascii_case("https"))
        .map_or("http", |_| "https");

    normalize_origin(&format!("{scheme}://{host}"))
        .map_or_else(|| configured.clone(), |origin| configured.with_origin(origin))
}

/// Extract and validate the `url` query parameter.
pub fn parse_target(query: Option<&str>) -> Result<Url, ProxyError> {
    let raw = query
        .and_then(target_param)
        .filter(|raw| !raw.trim().is_empty())
        .ok_or(ProxyError::MissingUrl)?;
    let url = Url::parse(raw.trim()).map_err(|_| ProxyError::InvalidUrl)?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        "http" | "https" => Err(ProxyError::InvalidUrl),
        other => Err(ProxyError::UnsupportedScheme(other.to_string())),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: std::time::Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_encoded_target() {
        let url = parse_target(Some("url=https%3A%2F%2Fexample.com%2Fa%3Fb%3D1")).unwrap();
        assert_eq!(url.as_str(), "https://example.com/a?b=1");
    }

    #[test]
    fn accepts_unencoded_target() {
        let url = parse_target(Some("url=http://example.com/")).unwrap();
        assert_eq!(url.as_str(), "http://example.com/");
    }

    #[test]
    fn missing_or_empty_url_is_rejected() {
        assert!(matches!(parse_target(None), Err(ProxyError::MissingUrl)));
        assert!(matches!(parse_target(Some("x=1")), Err(ProxyError::MissingUrl)));
        assert!(matches!(parse_target(Some("url=")), Err(ProxyError::MissingUrl)));
    }

    #[test]
    fn malformed_or_foreign_targets_are_rejected() {
        assert!(matches!(
            parse_target(Some("url=not%20a%20url")),
            Err(ProxyError::InvalidUrl)
        ));
        assert!(matches!(
            parse_target(Some("url=ftp%3A%2F%2Fexample.com%2F")),
            Err(ProxyError::UnsupportedScheme(ref s)) if s == "ftp"
        ));
        assert!(matches!(
            parse_target(Some("url=javascript%3Aalert(1)")),
            Err(ProxyError::UnsupportedScheme(_))
        ));
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        pairs
            .iter()
            .map(|(k, v)| (axum::http::HeaderName::from_static(k), HeaderValue::from_static(v)))
            .collect()
    }

    #[test]
    fn endpoint_origin_follows_request_host() {
        let configured = ProxyEndpoint::new("/api/proxy");
        let uri: Uri = "/api/proxy?url=x".parse().unwrap();

        let ep = request_endpoint(&configured, &uri, &headers(&[("host", "localhost:3000")]));
        assert_eq!(ep.origin(), Some("http://localhost:3000"));

        let ep = request_endpoint(
            &configured,
            &uri,
            &headers(&[("host", "embed.example.org"), ("x-forwarded-proto", "https, http")]),
        );
        assert_eq!(ep.origin(), Some("https://embed.example.org"));
    }

    #[test]
    fn configured_origin_wins_and_bad_hosts_fall_back() {
        let uri: Uri = "/api/proxy?url=x".parse().unwrap();
        let configured = ProxyEndpoint::new("/api/proxy").with_origin("https://frames.example.org");
        let ep = request_endpoint(&configured, &uri, &headers(&[("host", "localhost:3000")]));
        assert_eq!(ep.origin(), Some("https://frames.example.org"));

        let bare = ProxyEndpoint::new("/api/proxy");
        let ep = request_endpoint(&bare, &uri, &headers(&[("host", "evil.example/path")]));
        assert_eq!(ep.origin(), None);
        let ep = request_endpoint(&bare, &uri, &HeaderMap::new());
        assert_eq!(ep.origin(), None);
    }
}
