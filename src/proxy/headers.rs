//! Header construction for both legs of a proxied request.
//!
//! [`build_upstream_headers`] produces the browser-like header set sent to
//! the target; none of the client's own headers leak through except
//! `Accept` and, for requests with a body, `Content-Type`.
//! [`sanitize_response_headers`] strips every header that would stop the
//! response from being framed, along with hop-by-hop headers, and
//! [`apply_cors`] opens the response to any embedding origin.

use std::sync::LazyLock;

use axum::http::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH,
    CONTENT_SECURITY_POLICY, CONTENT_TYPE, ORIGIN, PRAGMA, REFERER, UPGRADE_INSECURE_REQUESTS,
    USER_AGENT,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::rewrite::PERMISSIVE_POLICY;

pub const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
pub const ACCEPTED_ENCODINGS: &str = "gzip, deflate, br";
pub const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const UNRESOLVED_HEADER: &str = "x-framegate-unresolved";

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// Response headers that forbid or restrict embedding.
static EMBEDDING_BLOCKERS: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "x-frame-options",
        "content-security-policy",
        "content-security-policy-report-only",
        "x-content-type-options",
        "cross-origin-opener-policy",
        "cross-origin-embedder-policy",
        "cross-origin-resource-policy",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// Whether a request with this method may carry a body upstream.
#[must_use]
pub fn carries_body(method: &Method) -> bool {
    *method != Method::GET && *method != Method::HEAD
}

/// Headers for one upstream hop, as a top-level browser navigation to
/// `target` would send them.
pub fn build_upstream_headers(
    inbound: &HeaderMap,
    target: &Url,
    method: &Method,
    user_agent: &HeaderValue,
    accept_language: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, user_agent.clone());
    headers.insert(
        ACCEPT,
        inbound
            .get(ACCEPT)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(BROWSER_ACCEPT)),
    );
    if let Ok(value) = HeaderValue::from_str(accept_language) {
        headers.insert(ACCEPT_LANGUAGE, value);
    }
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(ACCEPTED_ENCODINGS));

    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    let origin = target.origin().ascii_serialization();
    if let Ok(value) = HeaderValue::from_str(&format!("{origin}/")) {
        headers.insert(REFERER, value);
    }

    if carries_body(method) {
        if let Ok(value) = HeaderValue::from_str(&origin) {
            headers.insert(ORIGIN, value);
        }
        if let Some(content_type) = inbound.get(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, content_type.clone());
        }
    }

    headers
}

/// Strip embedding blockers, hop-by-hop headers and `content-length`, then
/// install the permissive policy.
///
/// `content-encoding` survives only for bodies passed through as-is.
pub fn sanitize_response_headers(headers: &mut HeaderMap, keep_encoding: bool) {
    for name in EMBEDDING_BLOCKERS.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove(CONTENT_LENGTH);
    if !keep_encoding {
        headers.remove(CONTENT_ENCODING);
    }
    headers.insert(
        CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(PERMISSIVE_POLICY),
    );
}

/// Allow any origin to read the response.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert("access-control-allow-headers", HeaderValue::from_static("*"));
    headers.insert("access-control-expose-headers", HeaderValue::from_static("*"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Url {
        Url::parse("https://example.com:8443/deep/page?q=1").unwrap()
    }

    fn ua() -> HeaderValue {
        HeaderValue::from_static("test-agent/1.0")
    }

    #[test]
    fn mimics_browser_navigation() {
        let headers =
            build_upstream_headers(&HeaderMap::new(), &target(), &Method::GET, &ua(), "fr-FR");

        assert_eq!(headers[USER_AGENT], "test-agent/1.0");
        assert_eq!(headers[ACCEPT], BROWSER_ACCEPT);
        assert_eq!(headers[ACCEPT_LANGUAGE], "fr-FR");
        assert_eq!(headers[ACCEPT_ENCODING], "gzip, deflate, br");
        assert_eq!(headers["sec-fetch-mode"], "navigate");
        assert_eq!(headers[UPGRADE_INSECURE_REQUESTS], "1");
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers[REFERER], "https://example.com:8443/");
        assert!(headers.get(ORIGIN).is_none());
    }

    #[test]
    fn client_headers_do_not_leak() {
        let mut inbound = HeaderMap::new();
        inbound.insert("cookie", "session=abc".parse().unwrap());
        inbound.insert("authorization", "Bearer x".parse().unwrap());
        inbound.insert(ACCEPT, "text/css".parse().unwrap());
        inbound.insert(CONTENT_TYPE, "application/json".parse().unwrap());

        let headers = build_upstream_headers(&inbound, &target(), &Method::GET, &ua(), "en");
        assert!(headers.get("cookie").is_none());
        assert!(headers.get("authorization").is_none());
        assert!(headers.get(CONTENT_TYPE).is_none());
        assert_eq!(headers[ACCEPT], "text/css");
    }

    #[test]
    fn body_requests_carry_origin_and_content_type() {
        let mut inbound = HeaderMap::new();
        inbound.insert(CONTENT_TYPE, "application/x-www-form-urlencoded".parse().unwrap());

        let headers = build_upstream_headers(&inbound, &target(), &Method::POST, &ua(), "en");
        assert_eq!(headers[ORIGIN], "https://example.com:8443");
        assert_eq!(headers[CONTENT_TYPE], "application/x-www-form-urlencoded");
    }

    #[test]
    fn strips_embedding_blockers_and_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-frame-options", "DENY".parse().unwrap());
        headers.insert(CONTENT_SECURITY_POLICY, "frame-ancestors 'none'".parse().unwrap());
        headers.insert("content-security-policy-report-only", "x".parse().unwrap());
        headers.insert("x-content-type-options", "nosniff".parse().unwrap());
        headers.insert("cross-origin-opener-policy", "same-origin".parse().unwrap());
        headers.insert("connection", "keep-alive".parse().unwrap());
        headers.insert(CONTENT_LENGTH, "10".parse().unwrap());
        headers.insert(CONTENT_ENCODING, "gzip".parse().unwrap());
        headers.insert(CONTENT_TYPE, "text/html".parse().unwrap());

        sanitize_response_headers(&mut headers, false);

        for gone in [
            "x-frame-options",
            "content-security-policy-report-only",
            "x-content-type-options",
            "cross-origin-opener-policy",
            "connection",
            "content-length",
            "content-encoding",
        ] {
            assert!(headers.get(gone).is_none(), "{gone}");
        }
        assert_eq!(headers[CONTENT_SECURITY_POLICY], PERMISSIVE_POLICY);
        assert_eq!(headers.get_all(CONTENT_SECURITY_POLICY).iter().count(), 1);
        assert_eq!(headers[CONTENT_TYPE], "text/html");
    }

    #[test]
    fn passthrough_keeps_content_encoding() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, "br".parse().unwrap());
        sanitize_response_headers(&mut headers, true);
        assert_eq!(headers[CONTENT_ENCODING], "br");
    }

    #[test]
    fn cors_is_permissive() {
        let mut headers = HeaderMap::new();
        headers.insert("access-control-allow-origin", "https://a.test".parse().unwrap());
        apply_cors(&mut headers);
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-headers"], "*");
        assert_eq!(headers["access-control-expose-headers"], "*");
        assert_eq!(headers["access-control-allow-methods"], ALLOWED_METHODS);
    }
}
