//! Content rewriting engine.
//!
//! [`ContentKind`] classifies a response by its declared media type and
//! [`rewrite_text`] routes textual bodies to the matching transform:
//! [`html`], [`css`], or [`script`]. Each transform resolves references
//! through [`url`] using a per-pass [`RewriteContext`], and the HTML
//! transform injects the countermeasure script produced by [`shield`].
//!
//! Per-reference failures never abort a pass. They are counted in a
//! [`RewriteReport`] and the original reference text is kept.

pub mod css;
pub mod html;
pub mod script;
pub mod shield;
pub mod url;

use std::cell::Cell;

use ::url::Url;

use self::url::{canonicalize, classify, Canonical, ProxyEndpoint, UrlClass};

/// Policy sent in place of any upstream CSP, both as a response header and
/// as an injected `<meta>`.
pub const PERMISSIVE_POLICY: &str =
    "default-src * 'unsafe-inline' 'unsafe-eval' data: blob:; frame-ancestors *";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    ScriptOrData,
    Binary,
}

impl ContentKind {
    /// Classify a `Content-Type` header value. A missing or unrecognized
    /// type is treated as binary and passed through untouched.
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(value) = content_type else {
            return Self::Binary;
        };
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "text/html" | "application/xhtml+xml" => Self::Html,
            "text/css" => Self::Css,
            "text/javascript"
            | "application/javascript"
            | "application/x-javascript"
            | "application/ecmascript"
            | "text/ecmascript"
            | "application/json"
            | "text/json" => Self::ScriptOrData,
            other if other.ends_with("+json") => Self::ScriptOrData,
            _ => Self::Binary,
        }
    }

    #[must_use]
    pub const fn is_text(self) -> bool {
        !matches!(self, Self::Binary)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::ScriptOrData => "script",
            Self::Binary => "binary",
        }
    }
}

/// Immutable inputs of a single rewrite pass.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    base: Url,
    endpoint: ProxyEndpoint,
}

impl RewriteContext {
    #[must_use]
    pub const fn new(base: Url, endpoint: ProxyEndpoint) -> Self {
        Self { base, endpoint }
    }

    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    #[must_use]
    pub const fn endpoint(&self) -> &ProxyEndpoint {
        &self.endpoint
    }

    /// Classify, resolve, and proxy-encode one reference.
    ///
    /// Returns `None` when the reference must be left as written, either
    /// because it is not proxyable or because it could not be resolved.
    pub(crate) fn rewrite_reference(&self, raw: &str, tally: &Tally) -> Option<String> {
        if classify(raw, &self.endpoint) == UrlClass::Skip {
            return None;
        }
        match canonicalize(raw, &self.base, &self.endpoint) {
            Canonical::Resolved(url) => {
                tally.rewritten.set(tally.rewritten.get() + 1);
                Some(self.endpoint.encode(url.as_str()))
            }
            Canonical::Unchanged(_) => {
                tally.unresolved.set(tally.unresolved.get() + 1);
                tracing::debug!(reference = %raw, base = %self.base, "unresolved reference left as-is");
                None
            }
        }
    }
}

/// Per-pass counters, shared by reference between tokenizer handlers.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    rewritten: Cell<usize>,
    unresolved: Cell<usize>,
}

impl Tally {
    pub(crate) fn report(&self) -> RewriteReport {
        RewriteReport {
            rewritten: self.rewritten.get(),
            unresolved: self.unresolved.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub rewritten: usize,
    pub unresolved: usize,
}

/// Run the transform matching `kind` over a decoded body.
///
/// Binary content is returned unchanged; callers normally never buffer it.
#[must_use]
pub fn rewrite_text(kind: ContentKind, text: &str, ctx: &RewriteContext) -> (String, RewriteReport) {
    match kind {
        ContentKind::Html => html::rewrite_html(text, ctx),
        ContentKind::Css => css::rewrite_css(text, ctx),
        ContentKind::ScriptOrData => (script::neutralize(text).into_owned(), RewriteReport::default()),
        ContentKind::Binary => (text.to_string(), RewriteReport::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_content_types() {
        assert_eq!(ContentKind::from_content_type(Some("text/html; charset=utf-8")), ContentKind::Html);
        assert_eq!(ContentKind::from_content_type(Some("Application/XHTML+XML")), ContentKind::Html);
        assert_eq!(ContentKind::from_content_type(Some("text/css")), ContentKind::Css);
        assert_eq!(
            ContentKind::from_content_type(Some("application/javascript")),
            ContentKind::ScriptOrData
        );
        assert_eq!(
            ContentKind::from_content_type(Some("application/ld+json")),
            ContentKind::ScriptOrData
        );
        assert_eq!(ContentKind::from_content_type(Some("image/png")), ContentKind::Binary);
        assert_eq!(ContentKind::from_content_type(Some("text/plain")), ContentKind::Binary);
        assert_eq!(ContentKind::from_content_type(None), ContentKind::Binary);
    }

    #[test]
    fn reference_counters_track_outcomes() {
        let ctx = RewriteContext::new(
            Url::parse("https://example.com/dir/page.html").unwrap(),
            ProxyEndpoint::new("/api/proxy"),
        );
        let tally = Tally::default();

        assert!(ctx.rewrite_reference("/a.png", &tally).is_some());
        assert!(ctx.rewrite_reference("data:,x", &tally).is_none());
        assert!(ctx.rewrite_reference("//", &tally).is_none());

        assert_eq!(
            tally.report(),
            RewriteReport {
                rewritten: 1,
                unresolved: 1
            }
        );
    }
}
