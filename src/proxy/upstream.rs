//! Upstream fetch with manual redirect handling.
//!
//! Redirects are followed here rather than by the client so that the
//! final URL is known (it becomes the rewrite base) and so every hop
//! shares one deadline. The body is returned unread; the dispatcher
//! decides whether to stream or buffer it, and both paths stay under the
//! same deadline.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::header::LOCATION;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Frame, Incoming, SizeHint};
use tokio::time::{Instant, Sleep};
use url::Url;

use super::headers::{build_upstream_headers, carries_body};
use super::user_agent::UserAgentPool;
use crate::error::ProxyError;
use crate::server::HttpClient;

/// One request to the target as received from the client.
#[derive(Debug)]
pub struct UpstreamRequest<'a> {
    pub method: Method,
    pub target: Url,
    pub inbound_headers: &'a HeaderMap,
    pub body: Bytes,
}

#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Where the last hop landed.
    pub final_url: Url,
    pub method: Method,
    pub body: Incoming,
}

/// Fetch settings shared by every hop of one request.
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy<'a> {
    pub agents: &'a UserAgentPool,
    pub accept_language: &'a str,
    pub max_redirects: usize,
    pub timeout_ms: u64,
    pub deadline: Instant,
}

pub async fn fetch(
    client: &HttpClient,
    request: UpstreamRequest<'_>,
    policy: FetchPolicy<'_>,
) -> Result<UpstreamResponse, ProxyError> {
    let UpstreamRequest {
        mut method,
        target: mut url,
        inbound_headers,
        mut body,
    } = request;
    let user_agent = policy.agents.pick(&url).clone();

    for hop in 0..=policy.max_redirects {
        let headers = build_upstream_headers(
            inbound_headers,
            &url,
            &method,
            &user_agent,
            policy.accept_language,
        );
        let payload = if carries_body(&method) {
            body.clone()
        } else {
            Bytes::new()
        };

        let mut outbound = Request::builder()
            .method(method.clone())
            .uri(url.as_str())
            .body(Full::new(payload))
            .map_err(|e| ProxyError::Transport {
                source: Box::new(e),
            })?;
        *outbound.headers_mut() = headers;

        let response = tokio::time::timeout_at(policy.deadline, client.request(outbound))
            .await
            .map_err(|_| ProxyError::Timeout {
                timeout_ms: policy.timeout_ms,
            })?
            .map_err(|e| ProxyError::Transport {
                source: Box::new(e),
            })?;

        let status = response.status();
        if is_redirect(status) {
            if let Some(location) = response.headers().get(LOCATION) {
                let next = location
                    .to_str()
                    .ok()
                    .and_then(|loc| url.join(loc).ok())
                    .filter(|next| matches!(next.scheme(), "http" | "https"))
                    .ok_or(ProxyError::BadRedirect)?;

                if switches_to_get(status, &method) {
                    method = Method::GET;
                    body = Bytes::new();
                }
                tracing::debug!(hop, status = status.as_u16(), from = %url, to = %next, "following redirect");
                url = next;
                continue;
            }
        }

        let (parts, incoming) = response.into_parts();
        return Ok(UpstreamResponse {
            status: parts.status,
            headers: parts.headers,
            final_url: url,
            method,
            body: incoming,
        });
    }

    Err(ProxyError::TooManyRedirects {
        limit: policy.max_redirects,
    })
}

/// Buffer a body of at most `limit` bytes before `deadline`.
pub async fn read_body(
    body: Incoming,
    limit: usize,
    deadline: Instant,
    timeout_ms: u64,
) -> Result<Bytes, ProxyError> {
    let collected = tokio::time::timeout_at(deadline, Limited::new(body, limit).collect())
        .await
        .map_err(|_| ProxyError::Timeout { timeout_ms })?;

    match collected {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ProxyError::BodyTooLarge { limit })
        }
        Err(source) => Err(ProxyError::Transport { source }),
    }
}

/// Streamed upstream body that fails with [`ProxyError::Timeout`] once the
/// request deadline passes. Dropping it releases the upstream connection.
#[derive(Debug)]
pub struct DeadlineBody {
    inner: Incoming,
    deadline: Pin<Box<Sleep>>,
    timeout_ms: u64,
    expired: bool,
}

impl DeadlineBody {
    #[must_use]
    pub fn new(inner: Incoming, deadline: Instant, timeout_ms: u64) -> Self {
        Self {
            inner,
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            timeout_ms,
            expired: false,
        }
    }
}

impl Body for DeadlineBody {
    type Data = Bytes;
    type Error = ProxyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, ProxyError>>> {
        let this = self.get_mut();
        if this.expired {
            return Poll::Ready(None);
        }
        if this.deadline.as_mut().poll(cx).is_ready() {
            this.expired = true;
            tracing::warn!(timeout_ms = this.timeout_ms, "upstream body exceeded deadline, aborting stream");
            return Poll::Ready(Some(Err(ProxyError::Timeout {
                timeout_ms: this.timeout_ms,
            })));
        }
        Pin::new(&mut this.inner).poll_frame(cx).map(|frame| {
            frame.map(|result| {
                result.map_err(|e| ProxyError::Transport {
                    source: Box::new(e),
                })
            })
        })
    }

    fn is_end_stream(&self) -> bool {
        self.expired || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

const fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// 303 always, and 301/302 after a non-GET/HEAD request, continue as GET.
fn switches_to_get(status: StatusCode, method: &Method) -> bool {
    match status.as_u16() {
        303 => *method != Method::HEAD,
        301 | 302 => carries_body(method),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_redirect_statuses() {
        for code in [301, 302, 303, 307, 308] {
            assert!(is_redirect(StatusCode::from_u16(code).unwrap()), "{code}");
        }
        for code in [200, 300, 304, 305, 404] {
            assert!(!is_redirect(StatusCode::from_u16(code).unwrap()), "{code}");
        }
    }

    #[test]
    fn method_rewriting_follows_browser_rules() {
        assert!(switches_to_get(StatusCode::SEE_OTHER, &Method::POST));
        assert!(switches_to_get(StatusCode::SEE_OTHER, &Method::GET));
        assert!(!switches_to_get(StatusCode::SEE_OTHER, &Method::HEAD));
        assert!(switches_to_get(StatusCode::FOUND, &Method::POST));
        assert!(switches_to_get(StatusCode::MOVED_PERMANENTLY, &Method::PUT));
        assert!(!switches_to_get(StatusCode::FOUND, &Method::GET));
        assert!(!switches_to_get(StatusCode::TEMPORARY_REDIRECT, &Method::POST));
        assert!(!switches_to_get(StatusCode::PERMANENT_REDIRECT, &Method::POST));
    }
}
