//! Content dispatch: turn an upstream response into the client response.
//!
//! Binary content (and anything that cannot be safely decoded) is streamed
//! through untouched, cut off if it outlives the request deadline. Text
//! content is buffered under `limits.max_rewrite_body`, decoded, rewritten
//! against the final URL, and re-emitted as UTF-8.

use axum::body::Body;
use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::Response;
use tokio::time::Instant;

use super::decode::{decode_text, ContentCoding};
use super::headers::{sanitize_response_headers, UNRESOLVED_HEADER};
use super::upstream::{read_body, DeadlineBody, UpstreamResponse};
use crate::error::ProxyError;
use crate::rewrite::url::ProxyEndpoint;
use crate::rewrite::{rewrite_text, ContentKind, RewriteContext, RewriteReport};

/// Outcome of one dispatch, for logging and stats.
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response,
    pub kind: ContentKind,
    /// `None` when the body was passed through.
    pub report: Option<RewriteReport>,
}

/// Budget for buffering a text body.
#[derive(Debug, Clone, Copy)]
pub struct BodyBudget {
    pub limit: usize,
    pub deadline: Instant,
    pub timeout_ms: u64,
}

pub async fn dispatch(
    upstream: UpstreamResponse,
    endpoint: &ProxyEndpoint,
    budget: BodyBudget,
) -> Result<Dispatched, ProxyError> {
    let content_type = upstream
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let kind = ContentKind::from_content_type(content_type.as_deref());
    let coding = ContentCoding::from_header(
        upstream
            .headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok()),
    );

    let rewritable = kind.is_text() && has_body(upstream.status, &upstream.method);
    let Some(coding) = coding.filter(|_| rewritable) else {
        if rewritable {
            tracing::debug!(target = %upstream.final_url, "unsupported content-encoding, passing through");
        }
        return Ok(passthrough(upstream, kind, budget));
    };

    let UpstreamResponse {
        status,
        mut headers,
        final_url,
        body,
        ..
    } = upstream;

    let raw = read_body(body, budget.limit, budget.deadline, budget.timeout_ms).await?;
    let decoded = coding.decode(raw, budget.limit)?;
    let text = decode_text(&decoded, content_type.as_deref(), kind);

    let ctx = RewriteContext::new(final_url, endpoint.clone());
    let (rewritten, report) = rewrite_text(kind, &text, &ctx);

    sanitize_response_headers(&mut headers, false);
    if let Ok(value) = HeaderValue::from_str(&utf8_content_type(content_type.as_deref())) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(UNRESOLVED_HEADER, HeaderValue::from(report.unresolved));

    let mut response = Response::new(Body::from(rewritten));
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    Ok(Dispatched {
        response,
        kind,
        report: Some(report),
    })
}

/// Stream the body untouched, still bounded by the request deadline.
fn passthrough(upstream: UpstreamResponse, kind: ContentKind, budget: BodyBudget) -> Dispatched {
    let UpstreamResponse {
        status,
        mut headers,
        body,
        ..
    } = upstream;
    sanitize_response_headers(&mut headers, true);

    let body = DeadlineBody::new(body, budget.deadline, budget.timeout_ms);
    let mut response = Response::new(Body::new(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    Dispatched {
        response,
        kind,
        report: None,
    }
}

fn has_body(status: StatusCode, method: &Method) -> bool {
    *method != Method::HEAD
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
        && !status.is_informational()
}

/// Keep the media type, replace any charset with UTF-8.
fn utf8_content_type(content_type: Option<&str>) -> String {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|essence| !essence.is_empty())
        .unwrap_or("text/html");
    format!("{essence}; charset=utf-8")
}
