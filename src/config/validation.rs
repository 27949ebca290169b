//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for values that
//! would parse but cannot work at run time: a malformed proxy path, zero
//! timeouts or limits, and header values hyper would refuse to send.
//! Returns a list of [`ValidationError`] values with per-field suggestions.

use axum::http::HeaderValue;

use super::model::Config;
use crate::error::ValidationError;
use crate::rewrite::url::normalize_origin;

/// Paths the router serves itself.
pub const RESERVED_PATHS: &[&str] = &["/health"];

/// Validate the inbound proxy path. Returns `Ok(())` or a human-readable error.
pub fn validate_proxy_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("path cannot be empty".into());
    }
    if !path.starts_with('/') {
        return Err(format!("path must start with '/' (did you mean '/{path}'?)"));
    }
    if path.len() > 1 && path.ends_with('/') {
        return Err("path must not end with '/'".into());
    }
    if path.contains(['?', '#', ' ']) {
        return Err("path must not contain '?', '#' or spaces".into());
    }
    if path.contains(['{', '}']) || path.split('/').any(|s| s.starts_with([':', '*'])) {
        return Err("path must be literal (no route parameters or wildcards)".into());
    }
    if RESERVED_PATHS.contains(&path) {
        return Err(format!("'{path}' is reserved"));
    }
    Ok(())
}

/// Validate a value that will be sent as an outbound header.
pub fn validate_header_value(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("value cannot be empty".into());
    }
    HeaderValue::from_str(value)
        .map(|_| ())
        .map_err(|_| format!("'{value}' is not a valid header value"))
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(msg) = validate_proxy_path(&config.proxy.path) {
        let path = &config.proxy.path;
        errors.push(ValidationError {
            section: "proxy".into(),
            field: "path".into(),
            message: msg,
            suggestion: if path.is_empty() || path == "/health" {
                Some("use the default '/api/proxy'".into())
            } else if !path.starts_with('/') {
                Some(format!("did you mean '/{path}'?"))
            } else if path.len() > 1 && path.ends_with('/') {
                Some(format!("did you mean '{}'?", path.trim_end_matches('/')))
            } else {
                None
            },
        });
    }

    if let Some(ref origin) = config.proxy.public_origin {
        if normalize_origin(origin).is_none() {
            errors.push(ValidationError {
                section: "proxy".into(),
                field: "public_origin".into(),
                message: format!("'{origin}' is not an http(s) origin"),
                suggestion: Some("use scheme and host only, e.g. 'https://embed.example.org'".into()),
            });
        }
    }

    let upstream = &config.upstream;
    if upstream.timeout_ms == 0 {
        errors.push(ValidationError {
            section: "upstream".into(),
            field: "timeout_ms".into(),
            message: "timeout must be greater than zero".into(),
            suggestion: Some("the default is 30000".into()),
        });
    }

    if let Err(msg) = validate_header_value(&upstream.accept_language) {
        errors.push(ValidationError {
            section: "upstream".into(),
            field: "accept_language".into(),
            message: msg,
            suggestion: None,
        });
    }

    if upstream.user_agents.is_empty() {
        errors.push(ValidationError {
            section: "upstream".into(),
            field: "user_agents".into(),
            message: "at least one user agent must be defined".into(),
            suggestion: Some("remove the key to use the built-in pool".into()),
        });
    }
    for (i, agent) in upstream.user_agents.iter().enumerate() {
        if let Err(msg) = validate_header_value(agent) {
            errors.push(ValidationError {
                section: "upstream".into(),
                field: format!("user_agents[{i}]"),
                message: msg,
                suggestion: None,
            });
        }
    }

    let limits = &config.limits;
    if limits.max_request_body == 0 {
        errors.push(ValidationError {
            section: "limits".into(),
            field: "max_request_body".into(),
            message: "limit must be greater than zero".into(),
            suggestion: None,
        });
    }
    if limits.max_rewrite_body == 0 {
        errors.push(ValidationError {
            section: "limits".into(),
            field: "max_rewrite_body".into(),
            message: "limit must be greater than zero".into(),
            suggestion: None,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let upstream = &config.upstream;
    let selection = upstream
        .user_agent_seed
        .map_or_else(|| "random".to_string(), |seed| format!("seeded ({seed})"));

    let lines = [
        format!(
            "  endpoint:      {}{}?url=<target>",
            config.proxy.public_origin.as_deref().unwrap_or_default(),
            config.proxy.path
        ),
        format!("  timeout:       {}ms", upstream.timeout_ms),
        format!("  redirects:     up to {}", upstream.max_redirects),
        format!(
            "  user agents:   {} ({selection})",
            upstream.user_agents.len()
        ),
        format!(
            "  limits:        request {} bytes, rewrite {} bytes",
            config.limits.max_request_body, config.limits.max_rewrite_body
        ),
    ];

    format!("{path} is valid\n{}", lines.join("\n"))
}
