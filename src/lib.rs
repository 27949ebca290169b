//! framegate is an embedding proxy for cross-origin iframes.
//!
//! A page that wants to frame a remote document points the iframe at the
//! proxy endpoint (`/api/proxy?url=<encoded target>`). framegate fetches
//! the target, strips the headers that forbid embedding, and rewrites
//! HTML, CSS and JavaScript so every subresource and navigation keeps
//! flowing back through the same endpoint.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, init, validate, health).
//! - [`config`] -- One-shot configuration loading and validation via the
//!   [`ConfigSource`](config::ConfigSource) trait.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`proxy`] -- The embedding endpoint: target parsing, upstream fetch with
//!   manual redirects, header sanitation, decoding, and response dispatch.
//! - [`rewrite`] -- URL canonicalization and the HTML, CSS and script
//!   transforms, plus the navigation shield injected into every page.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `file-backends` | All file format backends |
//! | `full` | All features |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod proxy;
pub mod rewrite;
pub mod server;
