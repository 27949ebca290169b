//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, init, validate, health), and their associated
//! argument structs. Every `run` flag has an environment variable
//! equivalent for container deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "framegate",
    version,
    about = "Embedding proxy that makes remote documents frameable",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        framegate run                        Start with built-in defaults\n  \
        framegate init                       Create a starter config\n  \
        framegate run -c framegate.yaml      Start with a specific config\n\n  \
        Then embed: <iframe src=\"http://localhost:3000/api/proxy?url=https%3A%2F%2Fexample.com\">"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Run(Box<RunArgs>),

    /// Generate a starter config file
    Init(InitArgs),

    /// Validate a config file without starting
    Validate(ValidateArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        framegate run                                     Auto-detect config or use defaults\n  \
        framegate run -c framegate.toml                   Specific config file\n  \
        framegate run -p 8080 --pretty                    Local dev mode\n  \
        framegate run --proxy-path /embed --timeout 5000  Override config values")]
pub struct RunArgs {
    /// Config file path (.yaml, .json, .toml)
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Overrides --
    /// Proxy endpoint path (overrides proxy.path)
    #[arg(long, env = "FRAMEGATE_PROXY_PATH", help_heading = "Overrides")]
    pub proxy_path: Option<String>,

    /// Upstream deadline in milliseconds (overrides upstream.timeout_ms)
    #[arg(long, env = "REQUEST_TIMEOUT_MS", help_heading = "Overrides")]
    pub timeout: Option<u64>,

    /// Seed for deterministic User-Agent selection (overrides upstream.user_agent_seed)
    #[arg(long, env = "FRAMEGATE_UA_SEED", help_heading = "Overrides")]
    pub user_agent_seed: Option<u64>,

    /// Max inbound request body in bytes (overrides limits.max_request_body)
    #[arg(long, env = "MAX_BODY_SIZE", help_heading = "Overrides")]
    pub max_body: Option<usize>,

    /// Max buffered body for rewriting in bytes (overrides limits.max_rewrite_body)
    #[arg(long, env = "MAX_REWRITE_SIZE", help_heading = "Overrides")]
    pub max_rewrite: Option<usize>,
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        framegate init                          Minimal config (yaml)\n  \
        framegate init --full                   Every option, documented\n  \
        framegate init -f toml -o config.toml   TOML format")]
pub struct InitArgs {
    /// Output format
    #[arg(short, long, default_value = "yaml")]
    pub format: ConfigFormat,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Include every option with its default, as comments
    #[arg(long)]
    pub full: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Config file to validate
    #[arg(default_value = "framegate.yaml")]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:3000")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_overrides_parse() {
        let cli = Cli::try_parse_from([
            "framegate",
            "run",
            "--proxy-path",
            "/embed",
            "--timeout",
            "500",
            "--user-agent-seed",
            "9",
        ])
        .unwrap();
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.proxy_path.as_deref(), Some("/embed"));
        assert_eq!(args.timeout, Some(500));
        assert_eq!(args.user_agent_seed, Some(9));
    }
}
