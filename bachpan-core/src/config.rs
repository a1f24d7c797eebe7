use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::embedding::local;
use crate::service::{MatchOptions, ReadinessMode};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_K: usize = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_type", rename = "type")]
    pub provider_type: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider_type: default_embedding_type(),
            model: default_embedding_model(),
        }
    }
}

fn default_embedding_type() -> String {
    "local".to_string()
}

fn default_embedding_model() -> String {
    local::MODEL_NAME.to_string()
}

/// Where the reference images come from.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CatalogConfig {
    /// Explicit image paths; each path string is also the entry identifier.
    #[serde(default)]
    pub images: Vec<PathBuf>,
    /// Optional directory scanned (non-recursively) for images.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default)]
    pub readiness: ReadinessMode,
    /// Per-request deadline in seconds; 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Directory for staging uploads on disk. In-memory staging when unset.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            readiness: ReadinessMode::default(),
            timeout_secs: default_timeout_secs(),
            upload_dir: None,
        }
    }
}

impl MatchingConfig {
    pub fn options(&self) -> MatchOptions {
        MatchOptions {
            default_k: self.default_k,
            readiness: self.readiness,
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            upload_dir: self.upload_dir.clone(),
        }
    }
}

fn default_k() -> usize {
    DEFAULT_K
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file '{}': {e}", path.display()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(contents).map_err(|e| format!("invalid config: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.embedding.provider_type != "local" {
            return Err(format!(
                "invalid config: unknown embedding type '{}'. Valid types: local",
                self.embedding.provider_type
            ));
        }
        if self.embedding.model != local::MODEL_NAME {
            return Err(format!(
                "invalid config: unknown embedding model '{}'. Valid models: {}",
                self.embedding.model,
                local::MODEL_NAME
            ));
        }
        if self.matching.default_k == 0 {
            return Err("invalid config: matching.default_k must be at least 1".into());
        }
        if self.catalog.images.is_empty() && self.catalog.directory.is_none() {
            return Err(
                "invalid config: catalog needs at least one of catalog.images or catalog.directory"
                    .into(),
            );
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
