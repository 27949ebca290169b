//! Unified error types for framegate.
//!
//! Defines [`FramegateError`] (service-level failures reported by `main`),
//! [`ProxyError`] (per-request failures turned into HTTP responses), and
//! [`ValidationError`] for config validation failures. Error messages
//! include contextual hints to guide the user toward a fix.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}.{}: {}", self.section, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FramegateError {
    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}' (enable the matching cargo feature)")]
    UnsupportedFormat(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("File already exists: {}", path.display())]
    FileExists { path: PathBuf },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),
}

/// Failure of a single proxied request.
///
/// Request errors answer `400` with a JSON body; every upstream failure
/// answers `502 Bad Gateway` with an HTML error document, so a framing page
/// always has something to render.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Missing ?url=")]
    MissingUrl,

    #[error("Invalid URL")]
    InvalidUrl,

    #[error("Unsupported scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    #[error("upstream did not respond within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("upstream request failed: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("more than {limit} redirects")]
    TooManyRedirects { limit: usize },

    #[error("redirect without a usable Location header")]
    BadRedirect,

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("could not decode {encoding} response body: {source}")]
    Decode {
        encoding: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProxyError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        if self.is_upstream() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        !matches!(
            self,
            Self::MissingUrl | Self::InvalidUrl | Self::UnsupportedScheme(_)
        )
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_upstream() {
            (status, Html(error_document(&self.to_string()))).into_response()
        } else {
            (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
        }
    }
}

fn error_document(message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Proxy Error</title></head>\
         <body><h1>Proxy Error</h1><pre>{}</pre></body></html>",
        escape_html(message)
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
