//! TOML configuration for the control system.
//!
//! ```toml
//! [writes]
//! enabled = true
//! memory_aim_enabled = true
//!
//! [device]
//! last_port = "COM7"
//! aim_button = "side1"
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! Every field has a serde default so a partial file, or no file at all,
//! still produces a usable configuration.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::buttons::MouseButton;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config at {path}. {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config TOML. {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config. {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub writes: WritesConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Global and per-feature switches for memory writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WritesConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub memory_aim_enabled: bool,
}

/// Identity and timing of the serial input device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Port that connected last time, tried first by autodetect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_port: Option<String>,
    #[serde(default = "default_vendor_id")]
    pub vendor_id: String,
    #[serde(default = "default_product_id")]
    pub product_id: String,
    #[serde(default = "default_friendly_name")]
    pub friendly_name: String,
    /// Only consulted when more than one vendor device matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_fragment: Option<String>,
    #[serde(default = "default_expected_signature")]
    pub expected_signature: String,
    #[serde(default = "default_baud")]
    pub default_baud: u32,
    #[serde(default = "default_high_baud")]
    pub high_baud: u32,
    #[serde(default = "default_validation_timeout_ms")]
    pub validation_timeout_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Device button whose press engages the aim writer.
    #[serde(default = "default_aim_button")]
    pub aim_button: MouseButton,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `"error"`, `"warn"`, `"info"`, `"debug"` or `"trace"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_vendor_id() -> String {
    "1A86".to_string()
}
fn default_product_id() -> String {
    "55D3".to_string()
}
fn default_friendly_name() -> String {
    "USB-Enhanced-SERIAL CH343".to_string()
}
fn default_expected_signature() -> String {
    "km.DeviceAimbot".to_string()
}
fn default_baud() -> u32 {
    115_200
}
fn default_high_baud() -> u32 {
    4_000_000
}
fn default_validation_timeout_ms() -> u64 {
    800
}
fn default_settle_delay_ms() -> u64 {
    150
}
fn default_aim_button() -> MouseButton {
    MouseButton::Side1
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            last_port: None,
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            friendly_name: default_friendly_name(),
            serial_fragment: None,
            expected_signature: default_expected_signature(),
            default_baud: default_baud(),
            high_baud: default_high_baud(),
            validation_timeout_ms: default_validation_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            aim_button: default_aim_button(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DeviceConfig {
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl AppConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    #[tracing::instrument(skip_all)]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => {
                debug!("Loaded config from {}.", path.display());
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No config at {}. Using defaults.", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = self.to_toml()?;
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").expect("Empty config should parse");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.device.default_baud, 115_200);
        assert_eq!(config.device.high_baud, 4_000_000);
        assert!(!config.writes.enabled);
    }

    #[test]
    fn test_partial_file() {
        let config = AppConfig::from_toml(
            r#"
            [writes]
            enabled = true
            memory_aim_enabled = true

            [device]
            last_port = "COM7"
            aim_button = "right"
            validation_timeout_ms = 300
            "#,
        )
        .expect("Config should parse");

        assert!(config.writes.memory_aim_enabled);
        assert_eq!(config.device.last_port.as_deref(), Some("COM7"));
        assert_eq!(config.device.aim_button, MouseButton::Right);
        assert_eq!(config.device.validation_timeout(), Duration::from_millis(300));
        assert_eq!(config.device.vendor_id, "1A86");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = AppConfig::default();
        config.device.serial_fragment = Some("58A6".into());
        let text = config.to_toml().expect("Config should serialize");
        assert_eq!(AppConfig::from_toml(&text).expect("Config should parse"), config);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let path = std::env::temp_dir().join("aim_link_control_system_missing_config.toml");
        let _ = fs::remove_file(&path);
        assert_eq!(
            AppConfig::load(&path).expect("Missing file is not an error"),
            AppConfig::default()
        );
    }

    #[test]
    fn test_malformed_file_reports_parse_error() {
        let error = AppConfig::from_toml("[device\nlast_port = 7").unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
        assert!(error.to_string().starts_with("Failed to parse config TOML."));
    }

    #[test]
    fn test_unreadable_path_reports_access_error() {
        let path = std::env::temp_dir();
        let error = AppConfig::load(&path).unwrap_err();
        assert!(error.to_string().starts_with("Failed to access config at "));
    }
}
