//! Generic async file-based config source with SHA-256 versioning.
//!
//! [`FileSource`] implements [`ConfigSource`] for any file format by
//! accepting a deserialization function at construction time. It reads the
//! file asynchronously via Tokio, validates the result, and hashes the raw
//! content so `/health` can report exactly which file revision is running.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::sha256_hex;
use crate::config::model::Config;
use crate::config::validation::validate;
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::FramegateError;

type Deserialize = fn(&str) -> Result<Config, Box<dyn std::error::Error + Send + Sync>>;

pub struct FileSource {
    path: PathBuf,
    name: &'static str,
    deserialize: Deserialize,
}

impl FileSource {
    #[must_use]
    pub fn new(path: PathBuf, name: &'static str, deserialize: Deserialize) -> Self {
        Self {
            path,
            name,
            deserialize,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_content(&self) -> Result<String, FramegateError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FramegateError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                FramegateError::Io(e)
            }
        })
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn load(&self) -> Result<(Config, ConfigVersion), FramegateError> {
        let content = self.read_content().await?;

        let config = (self.deserialize)(&content).map_err(|e| FramegateError::ConfigParse {
            path: self.path.display().to_string(),
            source: e,
        })?;

        if let Err(errors) = validate(&config) {
            return Err(FramegateError::ConfigValidation { errors });
        }

        let hash = sha256_hex(content.as_bytes());
        Ok((config, ConfigVersion::Hash(hash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_json(content: &str) -> Result<Config, Box<dyn std::error::Error + Send + Sync>> {
        serde_json::from_str(content).map_err(Into::into)
    }

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "framegate-{}-{name}",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn loads_validates_and_hashes() {
        let path = temp_file("ok.json", r#"{"proxy": {"path": "/p"}}"#);
        let source = FileSource::new(path.clone(), "json", parse_json);

        let (config, version) = source.load().await.unwrap();
        assert_eq!(config.proxy.path, "/p");
        assert_eq!(
            version,
            ConfigVersion::Hash(sha256_hex(br#"{"proxy": {"path": "/p"}}"#))
        );
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_reported_by_path() {
        let path = std::env::temp_dir().join("framegate-does-not-exist.json");
        let source = FileSource::new(path.clone(), "json", parse_json);
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, FramegateError::ConfigFileNotFound { path: ref p } if *p == path));
    }

    #[tokio::test]
    async fn invalid_values_fail_validation() {
        let path = temp_file("bad.json", r#"{"upstream": {"timeout_ms": 0}}"#);
        let source = FileSource::new(path.clone(), "json", parse_json);
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, FramegateError::ConfigValidation { .. }));
        std::fs::remove_file(path).unwrap();
    }
}
