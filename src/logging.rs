//! Structured logging setup using the `tracing` ecosystem.
//!
//! Configures a `tracing-subscriber` with either JSON output (for
//! production) or pretty-printed output (for TTY / local dev). Format is
//! auto-detected from the terminal but can be forced via `--json` or
//! `--pretty`. The lol_html and hyper internals are capped at `warn` so
//! `debug` stays readable.

use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[must_use]
pub fn resolve_format(pretty: bool, json: bool) -> LogFormat {
    if json {
        LogFormat::Json
    } else if pretty || std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

#[must_use]
pub fn filter(level: &LogLevel) -> Targets {
    let level = level.to_tracing_level();
    let noisy = level.min(tracing::Level::WARN);
    Targets::new()
        .with_default(level)
        .with_target("hyper_util", noisy)
        .with_target("rustls", noisy)
        .with_target("lol_html", noisy)
}

pub fn init(level: &LogLevel, format: LogFormat) {
    let filter = filter(level);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(false))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_json_wins() {
        assert_eq!(resolve_format(true, true), LogFormat::Json);
        assert_eq!(resolve_format(false, true), LogFormat::Json);
        assert_eq!(resolve_format(true, false), LogFormat::Pretty);
    }

    #[test]
    fn dependency_targets_are_capped() {
        use tracing_subscriber::filter::LevelFilter;

        let targets = filter(&LogLevel::Trace);
        assert!(targets.would_enable("framegate::proxy", &tracing::Level::TRACE));
        assert!(!targets.would_enable("hyper_util::client", &tracing::Level::DEBUG));
        assert!(targets.would_enable("hyper_util::client", &tracing::Level::WARN));

        let targets = filter(&LogLevel::Error);
        assert_eq!(targets.default_level(), Some(LevelFilter::ERROR));
        assert!(!targets.would_enable("rustls", &tracing::Level::WARN));
    }
}
