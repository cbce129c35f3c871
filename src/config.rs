use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::extract::{DEFAULT_BITRATE, DEFAULT_CODEC};
use crate::media::VIDEO_MIME;

/// Configuration for the upload pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote video service settings
    pub server: ServerConfig,

    /// Audio extraction settings
    pub audio: AudioConfig,

    /// File selection settings
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the remote video service
    pub base_url: String,

    /// Timeout for each request (seconds)
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Audio codec for extraction
    pub codec: String,

    /// Target audio bitrate
    pub bitrate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Accepted container MIME type for selected files
    pub accepted_mime: String,

    /// Maximum source file size in bytes (0 = no limit)
    pub max_file_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3333".to_string(),
            timeout_seconds: 120,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_CODEC.to_string(),
            bitrate: DEFAULT_BITRATE.to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            accepted_mime: VIDEO_MIME.to_string(),
            max_file_size: 0,
        }
    }
}

impl Config {
    /// Load from `UPLOAD_PIPELINE_CONFIG` or `./upload-pipeline.toml`,
    /// falling back to defaults when neither exists.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("UPLOAD_PIPELINE_CONFIG") {
            return Self::load_from(Path::new(&path));
        }

        let default_path = Path::new("upload-pipeline.toml");
        if default_path.exists() {
            return Self::load_from(default_path);
        }

        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.is_empty() {
            return Err(anyhow!("server.base_url must not be empty"));
        }
        if self.server.timeout_seconds == 0 {
            return Err(anyhow!("server.timeout_seconds must be positive"));
        }
        if self.audio.codec.is_empty() || self.audio.bitrate.is_empty() {
            return Err(anyhow!("audio.codec and audio.bitrate must not be empty"));
        }
        Ok(())
    }
}
