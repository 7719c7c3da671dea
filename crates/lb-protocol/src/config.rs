//! Persisted configuration schema (§6 "Persisted state").
//!
//! Parsing itself is out of scope for the core controller — the structure
//! is assumed — but the shape has to live somewhere both `lb-server` (reader)
//! and `lb-exporter` (writer) agree on, so it lives here.

use serde::{Deserialize, Serialize};

/// Top-level YAML document written by the exporter and read by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub account_id: u64,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: u8,
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub model_number: String,
    #[serde(default)]
    pub is_bridge: bool,
    #[serde(default)]
    pub is_switch: bool,
    #[serde(default)]
    pub is_plug: bool,
    #[serde(default)]
    pub capabilities: Vec<CapabilityName>,
    /// `[min, max]` Kelvin, present only for color-temp-capable devices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_temp_range_k: Option<(u16, u16)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityName {
    OnOff,
    Brightness,
    ColorTemp,
    Rgb,
    FanSpeed,
    Plug,
    Switch,
    Bridge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: u16,
    pub name: String,
    pub member_ids: Vec<u8>,
}

/// Small JSON cache for the vendor-cloud bearer token (§6, S4).
/// The in-memory cell is always authoritative; this is a write-behind cache
/// read back only at process startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCache {
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(serde_yaml::Error),
}

impl ControllerConfig {
    pub fn load_from_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&raw)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(ConfigError::Serialize)
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })
    }
}
