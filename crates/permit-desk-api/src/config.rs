use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost/permits/api";
pub const DEFAULT_ACTOR: &str = "Admin";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("page_size must be greater than zero")]
    InvalidPageSize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeskConfig {
    pub base_url: String,
    /// Per-request timeout; `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
    pub updated_by: String,
    pub page_size: usize,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: None,
            updated_by: DEFAULT_ACTOR.to_string(),
            page_size: permit_desk_core::aggregate::DEFAULT_PAGE_SIZE,
        }
    }
}

impl DeskConfig {
    /// Parse YAML; missing keys take their defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed YAML and any error from [`Self::validate`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise as [`Self::from_yaml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::from_yaml_str(&yaml)
    }

    /// # Errors
    /// Returns [`ConfigError::InvalidBaseUrl`] or [`ConfigError::InvalidPageSize`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        if self.page_size == 0 {
            return Err(ConfigError::InvalidPageSize);
        }
        Ok(())
    }

    /// The base URL, required to be absolute http(s).
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidBaseUrl`] when the value does not parse or uses another scheme.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl { url: self.base_url.clone(), reason };
        let url = Url::parse(self.base_url.trim()).map_err(|err| invalid(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if url.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }
        Ok(url)
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|secs| *secs > 0).map(Duration::from_secs)
    }
}
