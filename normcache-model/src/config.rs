//! Cache configuration, read from `normcache.toml` or built in code.
//!
//! The normalizer writes foreign keys and the walker reads them back, so both
//! take their naming convention from the same [`CacheConfig`] held by the
//! schema registry.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::{ModelError, ModelResult};

/// Naming conventions and normalization switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Field used for ids by schemas that do not declare their own.
    pub default_id_attribute: String,
    /// Appended to a relation field name to form its foreign-key field.
    pub foreign_key_suffix: String,
    /// Marker field set to `true` on stub records.
    pub partial_marker: String,
    /// Whether dangling foreign keys produce stub records.
    pub materialize_partials: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_id_attribute: "id".to_string(),
            foreign_key_suffix: "Id".to_string(),
            partial_marker: "__partial".to_string(),
            materialize_partials: true,
        }
    }
}

impl CacheConfig {
    /// Parses and validates a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> ModelResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a config file, failing on IO, parse or validation errors.
    pub fn try_load_from(path: impl AsRef<Path>) -> ModelResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Reads a config file, falling back to defaults when it is missing or
    /// broken.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No cache config found at {:?}, using defaults", path);
            return Self::default();
        }

        match Self::try_load_from(path) {
            Ok(config) => {
                info!("Loaded cache config from {:?}", path);
                config
            }
            Err(e) => {
                warn!(
                    "Failed to load cache config {:?}: {}. Falling back to defaults.",
                    path, e
                );
                Self::default()
            }
        }
    }

    /// Foreign-key field name for a relation field (`author` → `authorId`).
    #[must_use]
    pub fn foreign_key_field(&self, field: &str) -> String {
        format!("{field}{}", self.foreign_key_suffix)
    }

    fn validate(&self) -> ModelResult<()> {
        if self.default_id_attribute.is_empty() {
            return Err(ModelError::Config("default_id_attribute must not be empty".into()));
        }
        if self.foreign_key_suffix.is_empty() {
            return Err(ModelError::Config("foreign_key_suffix must not be empty".into()));
        }
        if self.partial_marker.is_empty() {
            return Err(ModelError::Config("partial_marker must not be empty".into()));
        }
        Ok(())
    }
}
