//! Serde data structures for the framegate configuration file.
//!
//! Contains [`Config`] (the root), [`ProxySettings`], [`UpstreamSettings`]
//! and [`Limits`]. Every section is optional and falls back to built-in
//! defaults; unknown fields are rejected.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PROXY_PATH: &str = "/api/proxy";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131 Safari/537.36",
];

const fn default_timeout_ms() -> u64 {
    30_000
}

const fn default_max_redirects() -> usize {
    20
}

const fn default_max_request_body() -> usize {
    1_048_576
}

const fn default_max_rewrite_body() -> usize {
    16 * 1_048_576
}

fn default_proxy_path() -> String {
    DEFAULT_PROXY_PATH.to_string()
}

fn default_accept_language() -> String {
    DEFAULT_ACCEPT_LANGUAGE.to_string()
}

fn default_user_agents() -> Vec<String> {
    DEFAULT_USER_AGENTS.iter().map(|ua| (*ua).to_string()).collect()
}

fn is_default_timeout_ms(v: &u64) -> bool {
    *v == default_timeout_ms()
}

fn is_default_max_redirects(v: &usize) -> bool {
    *v == default_max_redirects()
}

fn is_default_max_request_body(v: &usize) -> bool {
    *v == default_max_request_body()
}

fn is_default_max_rewrite_body(v: &usize) -> bool {
    *v == default_max_rewrite_body()
}

fn is_default_proxy_path(v: &str) -> bool {
    v == DEFAULT_PROXY_PATH
}

fn is_default_accept_language(v: &str) -> bool {
    v == DEFAULT_ACCEPT_LANGUAGE
}

fn is_default_user_agents(v: &[String]) -> bool {
    v.iter().map(String::as_str).eq(DEFAULT_USER_AGENTS.iter().copied())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, skip_serializing_if = "ProxySettings::is_default")]
    pub proxy: ProxySettings,

    #[serde(default, skip_serializing_if = "UpstreamSettings::is_default")]
    pub upstream: UpstreamSettings,

    #[serde(default, skip_serializing_if = "Limits::is_default")]
    pub limits: Limits,
}

/// Inbound endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySettings {
    #[serde(
        default = "default_proxy_path",
        skip_serializing_if = "is_default_proxy_path"
    )]
    pub path: String,

    /// Origin (`scheme://host[:port]`) clients reach the proxy on. Rewritten
    /// references are made absolute on it. When unset, the origin is taken
    /// from each request's `Host` and `X-Forwarded-Proto` headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_origin: Option<String>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            path: default_proxy_path(),
            public_origin: None,
        }
    }
}

impl ProxySettings {
    fn is_default(&self) -> bool {
        is_default_proxy_path(&self.path) && self.public_origin.is_none()
    }
}

/// Outbound fetch behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSettings {
    /// One deadline covering every redirect hop and the body read.
    #[serde(
        default = "default_timeout_ms",
        skip_serializing_if = "is_default_timeout_ms"
    )]
    pub timeout_ms: u64,

    #[serde(
        default = "default_max_redirects",
        skip_serializing_if = "is_default_max_redirects"
    )]
    pub max_redirects: usize,

    #[serde(
        default = "default_accept_language",
        skip_serializing_if = "is_default_accept_language"
    )]
    pub accept_language: String,

    #[serde(
        default = "default_user_agents",
        skip_serializing_if = "is_default_user_agents"
    )]
    pub user_agents: Vec<String>,

    /// Makes User-Agent selection a pure function of the target URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent_seed: Option<u64>,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            accept_language: default_accept_language(),
            user_agents: default_user_agents(),
            user_agent_seed: None,
        }
    }
}

impl UpstreamSettings {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Body size bounds, in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    #[serde(
        default = "default_max_request_body",
        skip_serializing_if = "is_default_max_request_body"
    )]
    pub max_request_body: usize,

    /// Cap on a buffered text body, before and after content decoding.
    #[serde(
        default = "default_max_rewrite_body",
        skip_serializing_if = "is_default_max_rewrite_body"
    )]
    pub max_rewrite_body: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_request_body: default_max_request_body(),
            max_rewrite_body: default_max_rewrite_body(),
        }
    }
}

impl Limits {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.proxy.path, "/api/proxy");
        assert_eq!(config.upstream.timeout_ms, 30_000);
        assert_eq!(config.upstream.max_redirects, 20);
        assert_eq!(config.upstream.user_agents.len(), 3);
        assert_eq!(config.limits.max_rewrite_body, 16 * 1_048_576);
    }

    #[test]
    fn defaults_serialize_to_empty_object() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"upstream": {"timeout_ms": 500, "user_agent_seed": 7}}"#).unwrap();
        assert_eq!(config.upstream.timeout_ms, 500);
        assert_eq!(config.upstream.user_agent_seed, Some(7));
        assert_eq!(config.upstream.max_redirects, 20);
        assert_eq!(config.proxy, ProxySettings::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{"routes": []}"#).is_err());
        assert!(serde_json::from_str::<Config>(r#"{"proxy": {"prefix": "/p"}}"#).is_err());
    }
}
