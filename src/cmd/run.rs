//! `framegate run`: start the proxy server.
//!
//! Loads configuration once (explicit file, auto-detected file, or the
//! built-in defaults), applies CLI overrides, and serves the Axum router
//! until SIGTERM or Ctrl+C.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::RunArgs;
use crate::config::model::Config;
use crate::config::sources;
use crate::config::{validation, BuiltinSource, ConfigSource};
use crate::error::FramegateError;
use crate::logging;
use crate::server::{self, AppState};

pub async fn execute(args: RunArgs) -> Result<(), FramegateError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let source = resolve_source(args.config.as_deref()).await?;
    let (mut config, version) = source.load().await?;

    if apply_overrides(&mut config, &args) {
        validation::validate(&config)
            .map_err(|errors| FramegateError::ConfigValidation { errors })?;
    }

    let proxy_path = config.proxy.path.clone();
    let timeout_ms = config.upstream.timeout_ms;
    let state = Arc::new(AppState::new(config, version, source.name()));
    let router = server::build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        proxy_path = %proxy_path,
        timeout_ms,
        user_agents = state.user_agents.len(),
        config_source = source.name(),
        config_version = %state.version.short(),
        "framegate started"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(server::shutdown_signal())
    .await?;

    tracing::info!("framegate stopped");
    Ok(())
}

/// Apply command-line overrides. Returns `true` when anything changed.
fn apply_overrides(config: &mut Config, args: &RunArgs) -> bool {
    let mut changed = false;

    if let Some(ref path) = args.proxy_path {
        config.proxy.path.clone_from(path);
        changed = true;
    }
    if let Some(timeout) = args.timeout {
        config.upstream.timeout_ms = timeout;
        changed = true;
    }
    if let Some(seed) = args.user_agent_seed {
        config.upstream.user_agent_seed = Some(seed);
        changed = true;
    }
    if let Some(max) = args.max_body {
        config.limits.max_request_body = max;
        changed = true;
    }
    if let Some(max) = args.max_rewrite {
        config.limits.max_rewrite_body = max;
        changed = true;
    }

    changed
}

async fn resolve_source(
    explicit: Option<&Path>,
) -> Result<Box<dyn ConfigSource>, FramegateError> {
    if let Some(path) = explicit {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(FramegateError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }
        return create_file_source(path);
    }

    for name in sources::AUTO_DETECT_CANDIDATES {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            return create_file_source(&path);
        }
    }

    tracing::info!("no config file found, using built-in defaults");
    Ok(Box::new(BuiltinSource))
}

fn create_file_source(path: &Path) -> Result<Box<dyn ConfigSource>, FramegateError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => Ok(Box::new(sources::yaml::new(path.to_path_buf()))),

        #[cfg(feature = "json")]
        "json" => Ok(Box::new(sources::json::new(path.to_path_buf()))),

        #[cfg(feature = "toml")]
        "toml" => Ok(Box::new(sources::toml_source::new(path.to_path_buf()))),

        other => Err(FramegateError::UnsupportedFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Commands};

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["framegate", "run"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Some(Commands::Run(args)) => *args,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut config = Config::default();
        let args = run_args(&["--proxy-path", "/embed", "--timeout", "1500", "--max-rewrite", "4096"]);

        assert!(apply_overrides(&mut config, &args));
        assert_eq!(config.proxy.path, "/embed");
        assert_eq!(config.upstream.timeout_ms, 1500);
        assert_eq!(config.limits.max_rewrite_body, 4096);
    }

    #[test]
    fn invalid_override_is_caught_by_validation() {
        let mut config = Config::default();
        let args = run_args(&["--timeout", "0"]);
        assert!(apply_overrides(&mut config, &args));
        assert!(validation::validate(&config).is_err());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = create_file_source(Path::new("framegate.ini")).err().unwrap();
        assert!(matches!(err, FramegateError::UnsupportedFormat(ext) if ext == "ini"));
    }

    #[tokio::test]
    async fn missing_explicit_file_is_an_error() {
        let err = resolve_source(Some(Path::new("/nonexistent/framegate.yaml")))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FramegateError::ConfigFileNotFound { .. }));
    }
}
