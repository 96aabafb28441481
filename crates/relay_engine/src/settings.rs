use std::fs;
use std::path::Path;
use std::time::Duration;

use relay_core::{BackoffPolicy, Timings};
use relay_logging::relay_info;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// User-facing configuration, read from a RON file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub api_base_url: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub coalesce_window_ms: u64,
    pub reconnect_delay_ms: u64,
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
    pub poll_multiplier: f64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/v1".to_string(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            coalesce_window_ms: 16,
            reconnect_delay_ms: 3000,
            poll_initial_ms: 3000,
            poll_max_ms: 30_000,
            poll_multiplier: 1.5,
        }
    }
}

impl RelaySettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        let settings = Self::from_ron_str(&content)?;
        relay_info!("Loaded relay settings from {:?}", path);
        Ok(settings)
    }

    pub fn from_ron_str(content: &str) -> Result<Self, SettingsError> {
        Ok(ron::from_str(content)?)
    }

    pub fn timings(&self) -> Timings {
        Timings {
            coalesce_window: Duration::from_millis(self.coalesce_window_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            backoff: BackoffPolicy {
                initial: Duration::from_millis(self.poll_initial_ms),
                max: Duration::from_millis(self.poll_max_ms),
                multiplier: self.poll_multiplier,
            },
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
