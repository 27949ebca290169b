//! Reference classification, resolution, and the proxy URL codec.
//!
//! Every transform funnels references through [`classify`] and
//! [`canonicalize`], then wraps the absolute result with
//! [`ProxyEndpoint::encode`]. Resolution never fails the caller: anything the
//! `url` crate refuses comes back as [`Canonical::Unchanged`].

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Characters left intact by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const SKIP_SCHEMES: &[&str] = &["data", "blob", "javascript", "mailto", "tel", "about"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlClass {
    /// Not proxyable: special schemes, fragments, empty values, or
    /// references that already point at the proxy.
    Skip,
    /// `//host/path`
    ProtocolRelative,
    Relative,
    Absolute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Canonical<'a> {
    Resolved(Url),
    Unchanged(&'a str),
}

/// The endpoint every rewritten reference converges to.
///
/// With an origin, encoded references are absolute (`http://proxy/api/proxy?url=..`)
/// so they keep pointing at the proxy even under the injected `<base href>`.
/// Without one they are root-relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    path: String,
    origin: Option<String>,
}

impl ProxyEndpoint {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            origin: None,
        }
    }

    /// Same endpoint, served from `origin` (`scheme://host[:port]`).
    #[must_use]
    pub fn with_origin(&self, origin: impl Into<String>) -> Self {
        Self {
            path: self.path.clone(),
            origin: Some(origin.into()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// `[origin]<path>`, the part of every encoded reference before `?`.
    #[must_use]
    pub fn prefix(&self) -> String {
        format!("{}{}", self.origin.as_deref().unwrap_or_default(), self.path)
    }

    /// `[origin]<path>?url=<percent-encoded absolute URL>`
    #[must_use]
    pub fn encode(&self, absolute: &str) -> String {
        format!(
            "{}?url={}",
            self.prefix(),
            utf8_percent_encode(absolute, COMPONENT)
        )
    }

    /// Inverse of [`encode`](Self::encode). Accepts the full proxy-encoded
    /// URL (with or without the origin) or just its query string.
    #[must_use]
    pub fn decode(&self, proxied: &str) -> Option<String> {
        let query = match proxied.split_once('?') {
            Some((path, query)) if path.is_empty() || path == self.path => query,
            Some((prefix, query)) if self.strip_origin(prefix) == Some(self.path.as_str()) => query,
            Some(_) => return None,
            None => proxied,
        };
        target_param(query)
    }

    /// Whether `raw` already routes through this endpoint.
    #[must_use]
    pub fn is_proxied(&self, raw: &str) -> bool {
        let local = self.strip_origin(raw).unwrap_or(raw);
        local
            .strip_prefix(self.path.as_str())
            .is_some_and(|rest| rest.starts_with('?'))
    }

    fn strip_origin<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let origin = self.origin.as_deref()?;
        raw.get(..origin.len())
            .filter(|head| head.eq_ignore_ascii_case(origin))
            .map(|_| &raw[origin.len()..])
    }
}

/// `scheme://host[:port]` for a public origin, or `None` if `raw` is not a
/// bare http(s) origin.
#[must_use]
pub fn normalize_origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let bare = url.path() == "/" && url.query().is_none() && url.fragment().is_none();
    let plain = url.username().is_empty() && url.password().is_none();
    (is_http(&url) && url.has_host() && bare && plain).then(|| url.origin().ascii_serialization())
}

/// Extract and percent-decode the `url` parameter of a query string.
///
/// `+` is kept literally: the encoder never emits it for spaces, so treating
/// it as form encoding would break the round trip.
#[must_use]
pub fn target_param(query: &str) -> Option<String> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("url="))
        .map(|value| percent_decode_str(value).decode_utf8_lossy().into_owned())
}

#[must_use]
pub fn classify(raw: &str, endpoint: &ProxyEndpoint) -> UrlClass {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || endpoint.is_proxied(trimmed) {
        return UrlClass::Skip;
    }
    if trimmed.starts_with("//") {
        return UrlClass::ProtocolRelative;
    }
    match scheme_of(trimmed) {
        Some(scheme) if scheme == "http" || scheme == "https" => UrlClass::Absolute,
        Some(scheme) if SKIP_SCHEMES.contains(&scheme.as_str()) => UrlClass::Skip,
        // Anything else with a scheme (ws:, ftp:, intent:, ...) can't be fetched
        // through an HTTP proxy.
        Some(_) => UrlClass::Skip,
        None => UrlClass::Relative,
    }
}

#[must_use]
pub fn canonicalize<'a>(raw: &'a str, base: &Url, endpoint: &ProxyEndpoint) -> Canonical<'a> {
    let trimmed = raw.trim();
    let resolved = match classify(raw, endpoint) {
        UrlClass::Skip => return Canonical::Unchanged(raw),
        UrlClass::ProtocolRelative => Url::parse(&format!("{}:{trimmed}", base.scheme())),
        UrlClass::Relative => base.join(trimmed),
        UrlClass::Absolute => Url::parse(trimmed),
    };
    match resolved {
        Ok(url) if is_http(&url) && url.has_host() => Canonical::Resolved(url),
        _ => Canonical::Unchanged(raw),
    }
}

#[must_use]
pub fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Lowercased scheme if `raw` starts with one (`[a-zA-Z][a-zA-Z0-9+.-]*:`).
fn scheme_of(raw: &str) -> Option<String> {
    let colon = raw.find(':')?;
    let candidate = &raw[..colon];
    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(candidate.to_ascii_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> ProxyEndpoint {
        ProxyEndpoint::new("/api/proxy")
    }

    fn base() -> Url {
        Url::parse("https://example.com/dir/page.html").unwrap()
    }

    #[test]
    fn classifies_reference_shapes() {
        let ep = endpoint();
        assert_eq!(classify("data:image/png;base64,AAAA", &ep), UrlClass::Skip);
        assert_eq!(classify("JavaScript:void(0)", &ep), UrlClass::Skip);
        assert_eq!(classify("mailto:a@b.c", &ep), UrlClass::Skip);
        assert_eq!(classify("tel:+123", &ep), UrlClass::Skip);
        assert_eq!(classify("blob:https://x/1", &ep), UrlClass::Skip);
        assert_eq!(classify("#top", &ep), UrlClass::Skip);
        assert_eq!(classify("   ", &ep), UrlClass::Skip);
        assert_eq!(classify("//cdn.example.com/a.js", &ep), UrlClass::ProtocolRelative);
        assert_eq!(classify("img/a.png", &ep), UrlClass::Relative);
        assert_eq!(classify("/a.png", &ep), UrlClass::Relative);
        assert_eq!(classify("?page=2", &ep), UrlClass::Relative);
        assert_eq!(classify("HTTPS://example.com", &ep), UrlClass::Absolute);
    }

    #[test]
    fn already_proxied_is_skipped() {
        let ep = endpoint();
        let proxied = ep.encode("https://example.com/a.png");
        assert_eq!(classify(&proxied, &ep), UrlClass::Skip);
        assert_eq!(classify("/api/proxyish?url=x", &ep), UrlClass::Relative);
    }

    #[test]
    fn resolves_root_relative_against_base() {
        let ep = endpoint();
        let Canonical::Resolved(url) = canonicalize("/a.png", &base(), &ep) else {
            panic!("expected resolution");
        };
        assert_eq!(url.as_str(), "https://example.com/a.png");
    }

    #[test]
    fn resolves_dot_segments() {
        let ep = endpoint();
        let Canonical::Resolved(url) = canonicalize("../img/x.png", &base(), &ep) else {
            panic!("expected resolution");
        };
        assert_eq!(url.as_str(), "https://example.com/img/x.png");
    }

    #[test]
    fn protocol_relative_takes_base_scheme() {
        let ep = endpoint();
        let http_base = Url::parse("http://example.com/").unwrap();
        let Canonical::Resolved(url) = canonicalize("//cdn.example.com/a.js", &http_base, &ep)
        else {
            panic!("expected resolution");
        };
        assert_eq!(url.as_str(), "http://cdn.example.com/a.js");
    }

    #[test]
    fn malformed_references_are_unchanged() {
        let ep = endpoint();
        for raw in ["//", "//host:99999/a", "http://[::1/", "https://exa mple.com/"] {
            assert_eq!(canonicalize(raw, &base(), &ep), Canonical::Unchanged(raw), "{raw}");
        }
    }

    #[test]
    fn skip_class_is_unchanged() {
        let ep = endpoint();
        let raw = "data:text/plain,hi";
        assert_eq!(canonicalize(raw, &base(), &ep), Canonical::Unchanged(raw));
    }

    #[test]
    fn encode_matches_encode_uri_component() {
        let ep = endpoint();
        assert_eq!(
            ep.encode("https://example.com/a b?x=1&y=(2)"),
            "/api/proxy?url=https%3A%2F%2Fexample.com%2Fa%20b%3Fx%3D1%26y%3D(2)"
        );
    }

    #[test]
    fn round_trip_is_stable() {
        let ep = endpoint();
        for u in [
            "https://example.com/",
            "https://example.com/a/b.png?x=1&y=%20z+w#frag",
            "http://[::1]:8080/p?q=%E2%9C%93",
            "https://例え.jp/パス",
        ] {
            let encoded = ep.encode(u);
            let decoded = ep.decode(&encoded).unwrap();
            assert_eq!(decoded, u);
            assert_eq!(ep.encode(&decoded), encoded);
        }
    }

    #[test]
    fn origin_makes_references_absolute() {
        let ep = endpoint().with_origin("http://localhost:3000");
        let encoded = ep.encode("https://example.com/a.png");
        assert_eq!(
            encoded,
            "http://localhost:3000/api/proxy?url=https%3A%2F%2Fexample.com%2Fa.png"
        );
        assert_eq!(ep.decode(&encoded).as_deref(), Some("https://example.com/a.png"));
        assert_eq!(classify(&encoded, &ep), UrlClass::Skip);
        // root-relative output of an earlier pass is still recognized
        assert_eq!(classify(&endpoint().encode("https://example.com/a.png"), &ep), UrlClass::Skip);
        assert_eq!(classify("http://other:3000/api/proxy?url=x", &ep), UrlClass::Absolute);
    }

    #[test]
    fn origins_are_normalized() {
        assert_eq!(
            normalize_origin("HTTPS://Embed.Example.org:443/").as_deref(),
            Some("https://embed.example.org")
        );
        assert_eq!(
            normalize_origin("http://127.0.0.1:3000").as_deref(),
            Some("http://127.0.0.1:3000")
        );
        assert_eq!(normalize_origin("http://host/sub"), None);
        assert_eq!(normalize_origin("ftp://host"), None);
        assert_eq!(normalize_origin("http://user@host"), None);
        assert_eq!(normalize_origin("not an origin"), None);
    }

    #[test]
    fn decode_rejects_foreign_paths() {
        let ep = endpoint();
        assert!(ep.decode("/elsewhere?url=https%3A%2F%2Fa").is_none());
        assert_eq!(
            ep.decode("?url=https%3A%2F%2Fa").as_deref(),
            Some("https://a")
        );
    }
}
