//! `framegate init`: generate a starter configuration file.
//!
//! Writes a YAML, JSON, or TOML config with either a minimal template or
//! one that lists every option at its default.

use std::path::PathBuf;

use crate::cli::{ConfigFormat, InitArgs};
use crate::error::FramegateError;

pub fn execute(args: &InitArgs) -> Result<(), FramegateError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("framegate.{}", args.format.extension())));

    if output.exists() {
        return Err(FramegateError::FileExists { path: output });
    }

    std::fs::write(&output, template(&args.format, args.full))?;
    println!("Created {}", output.display());
    Ok(())
}

const fn template(format: &ConfigFormat, full: bool) -> &'static str {
    match (format, full) {
        (ConfigFormat::Yaml, false) => YAML_MINIMAL,
        (ConfigFormat::Yaml, true) => YAML_FULL,
        (ConfigFormat::Json, false) => JSON_MINIMAL,
        (ConfigFormat::Json, true) => JSON_FULL,
        (ConfigFormat::Toml, false) => TOML_MINIMAL,
        (ConfigFormat::Toml, true) => TOML_FULL,
    }
}

const YAML_MINIMAL: &str = r#"# framegate config
# Embed with: <iframe src="/api/proxy?url=https%3A%2F%2Fexample.com">

proxy:
  path: "/api/proxy"
"#;

const YAML_FULL: &str = r#"# framegate config
#
# All values shown are defaults. Uncomment and modify as needed.

proxy:
  # Path of the embedding endpoint. Must be literal; /health is reserved.
  path: "/api/proxy"
  # Origin put in front of rewritten references. Defaults to the request Host.
  # public_origin: "https://embed.example.org"

# upstream:
#   timeout_ms: 30000            # One deadline for every hop and the body read
#   max_redirects: 20            # Redirects followed before giving up
#   accept_language: "en-US,en;q=0.9"
#   user_agent_seed: 42          # Omit for random selection per request
#   user_agents:
#     - "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131 Safari/537.36"
#     - "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17 Safari/605.1.15"
#     - "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131 Safari/537.36"

# limits:
#   max_request_body: 1048576    # Inbound body forwarded upstream, in bytes
#   max_rewrite_body: 16777216   # Text bodies larger than this are not rewritten
"#;

const JSON_MINIMAL: &str = r#"{
  "proxy": {
    "path": "/api/proxy"
  }
}
"#;

const JSON_FULL: &str = r#"{
  "proxy": {
    "path": "/api/proxy"
  },
  "upstream": {
    "timeout_ms": 30000,
    "max_redirects": 20,
    "accept_language": "en-US,en;q=0.9",
    "user_agents": [
      "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131 Safari/537.36",
      "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17 Safari/605.1.15",
      "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131 Safari/537.36"
    ]
  },
  "limits": {
    "max_request_body": 1048576,
    "max_rewrite_body": 16777216
  }
}
"#;

const TOML_MINIMAL: &str = r#"# framegate config

[proxy]
path = "/api/proxy"
"#;

const TOML_FULL: &str = r#"# framegate config
#
# All values shown are defaults. Uncomment and modify as needed.

[proxy]
# Path of the embedding endpoint. Must be literal; /health is reserved.
path = "/api/proxy"
# Origin put in front of rewritten references. Defaults to the request Host.
# public_origin = "https://embed.example.org"

# [upstream]
# timeout_ms = 30000             # One deadline for every hop and the body read
# max_redirects = 20
# accept_language = "en-US,en;q=0.9"
# user_agent_seed = 42           # Omit for random selection per request
# user_agents = [
#   "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131 Safari/537.36",
# ]

# [limits]
# max_request_body = 1048576
# max_rewrite_body = 16777216
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::Config;
    use crate::config::sources::parse_config_str;
    use crate::config::validation;

    fn assert_template_loads(format: &ConfigFormat) {
        for full in [false, true] {
            let content = template(format, full);
            let config = parse_config_str(format.extension(), content, "template").unwrap();
            assert!(validation::validate(&config).is_ok());
            assert_eq!(config, Config::default());
        }
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_templates_load_as_defaults() {
        assert_template_loads(&ConfigFormat::Yaml);
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_templates_load_as_defaults() {
        assert_template_loads(&ConfigFormat::Json);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn toml_templates_load_as_defaults() {
        assert_template_loads(&ConfigFormat::Toml);
    }

    #[test]
    fn refuses_to_overwrite() {
        let path = std::env::temp_dir().join(format!("framegate-init-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "proxy: {}\n").unwrap();
        let args = InitArgs {
            format: ConfigFormat::Yaml,
            output: Some(path.clone()),
            full: false,
        };
        let err = execute(&args).unwrap_err();
        assert!(matches!(err, FramegateError::FileExists { .. }));
        std::fs::remove_file(path).unwrap();
    }
}
