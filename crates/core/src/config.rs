use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{ClipmarkError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const MIN_CLIP_DURATION: u32 = 10;
pub const MAX_CLIP_DURATION: u32 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Clip extraction service.
    pub api_url: String,
    /// Auth service; often the same host.
    pub auth_url: String,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Seconds of video kept before each marker.
    pub clip_duration: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auth_url: DEFAULT_API_URL.to_string(),
            poll_interval_secs: 2,
            poll_timeout_secs: 600,
            request_timeout_secs: 30,
            clip_duration: 60,
        }
    }
}

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::from_toml(&content).map_err(|source| ClipmarkError::Config {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
