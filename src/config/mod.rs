//! Configuration loading and validation.
//!
//! Defines the [`ConfigSource`] trait for pluggable config backends and the
//! [`ConfigVersion`] used to identify what was loaded. Configuration is read
//! once at startup and shared immutably afterwards. Submodules provide the
//! data model, validation logic, and concrete file sources.

pub mod model;
pub mod sources;
pub mod validation;

use async_trait::async_trait;

use crate::error::FramegateError;
use model::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigVersion {
    Hash(String),
    Builtin,
}

impl ConfigVersion {
    /// Short form shown in `/health`.
    #[must_use]
    pub fn short(&self) -> String {
        match self {
            Self::Hash(h) => h.get(..8).unwrap_or(h).to_string(),
            Self::Builtin => "builtin".to_string(),
        }
    }
}

// async_trait is required here because ConfigSource is used as Box<dyn ConfigSource>
// and native async fn in traits does not support dyn dispatch.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self) -> Result<(Config, ConfigVersion), FramegateError>;
}

/// Built-in defaults, used when no config file is present.
#[derive(Debug, Default)]
pub struct BuiltinSource;

#[async_trait]
impl ConfigSource for BuiltinSource {
    fn name(&self) -> &'static str {
        "builtin"
    }

    async fn load(&self) -> Result<(Config, ConfigVersion), FramegateError> {
        Ok((Config::default(), ConfigVersion::Builtin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_source_loads_defaults() {
        let (config, version) = BuiltinSource.load().await.unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(version.short(), "builtin");
        assert!(validation::validate(&config).is_ok());
    }

    #[test]
    fn hash_version_is_shortened() {
        let version = ConfigVersion::Hash("0123456789abcdef".into());
        assert_eq!(version.short(), "01234567");
    }
}
