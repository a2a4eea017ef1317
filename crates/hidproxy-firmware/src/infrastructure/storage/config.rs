//! TOML configuration for the proxy.
//!
//! Read from `hid-proxy.toml` (or the path given with `--config`).  Every
//! field has a default, so a missing file or an empty section is fine.
//!
//! # What is TOML? (for beginners)
//!
//! TOML is a small configuration format made of `[sections]` and
//! `key = value` lines:
//!
//! ```toml
//! [device]
//! id = "E6605838831A2B2F"
//! log_level = "debug"
//!
//! [security]
//! idle_timeout_secs = 600
//!
//! [web]
//! enabled = true
//! ```
//!
//! `serde` maps each section onto one of the structs below.  Fields marked
//! `#[serde(default = "some_fn")]` take `some_fn()` when absent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `device.id` is not an even-length hex string.
    #[error("device id '{0}' is not valid hex")]
    InvalidDeviceId(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub web: WebSection,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Board identity and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Board unique id as hex.  Salts the password KDF, so changing it makes
    /// existing private macros unreadable.
    #[serde(default = "default_device_id")]
    pub id: String,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Flash image geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_image_path")]
    pub image_path: PathBuf,
    #[serde(default = "default_region_size")]
    pub region_size: usize,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

/// Timeouts around key material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityConfig {
    /// Inactivity before an unsealed device seals itself.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Length of the web access window opened by the SPACE command.
    #[serde(default = "default_web_access_secs")]
    pub web_access_secs: u64,
    /// How long a PRINT request waits for a tag.
    #[serde(default = "default_nfc_write_timeout_ms")]
    pub nfc_write_timeout_ms: u64,
}

/// Bulk macro HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// MQTT publishing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Defaults to `hidproxy-XXXX` built from the device id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_prefix: Option<String>,
}

/// Periodic status output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticsConfig {
    /// Seconds between status lines; 0 disables them.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_device_id() -> String {
    "E6605838831A2B2F".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_image_path() -> PathBuf {
    PathBuf::from("hid-proxy-flash.img")
}
fn default_region_size() -> usize {
    128 * 1024
}
fn default_block_size() -> usize {
    4096
}
fn default_idle_timeout_secs() -> u64 {
    120 * 60
}
fn default_web_access_secs() -> u64 {
    300
}
fn default_nfc_write_timeout_ms() -> u64 {
    30_000
}
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_status_interval_secs() -> u64 {
    5
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: default_device_id(),
            log_level: default_log_level(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            image_path: default_image_path(),
            region_size: default_region_size(),
            block_size: default_block_size(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            web_access_secs: default_web_access_secs(),
            nfc_write_timeout_ms: default_nfc_write_timeout_ms(),
        }
    }
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_bind_address(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl AppConfig {
    /// The board id as raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDeviceId`] if `device.id` is not hex.
    pub fn device_id_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        hex::decode(self.device.id.trim())
            .map_err(|_| ConfigError::InvalidDeviceId(self.device.id.clone()))
    }

    /// The configured MQTT prefix, or the id-derived default.
    ///
    /// # Errors
    ///
    /// As for [`AppConfig::device_id_bytes`] when the default is needed.
    pub fn mqtt_topic_prefix(&self) -> Result<String, ConfigError> {
        match &self.mqtt.topic_prefix {
            Some(prefix) => Ok(prefix.clone()),
            None => Ok(crate::infrastructure::mqtt::default_topic_prefix(
                &self.device_id_bytes()?,
            )),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.security.idle_timeout_secs)
    }

    pub fn web_access_window(&self) -> Duration {
        Duration::from_secs(self.security.web_access_secs)
    }

    pub fn nfc_write_timeout(&self) -> Duration {
        Duration::from_millis(self.security.nfc_write_timeout_ms)
    }

    /// `None` when the periodic status line is disabled.
    pub fn status_interval(&self) -> Option<Duration> {
        match self.diagnostics.status_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads the configuration at `path`, returning `AppConfig::default()` if
/// the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_defaults_match_device_constants() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.storage.region_size, 131_072);
        assert_eq!(cfg.storage.block_size, 4096);
        assert_eq!(cfg.idle_timeout(), Duration::from_secs(7200));
        assert_eq!(cfg.web_access_window(), Duration::from_secs(300));
        assert_eq!(cfg.nfc_write_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.status_interval(), Some(Duration::from_secs(5)));
        assert!(!cfg.web.enabled);
    }

    #[test]
    fn test_default_log_level_is_info() {
        assert_eq!(DeviceConfig::default().log_level, "info");
    }

    #[test]
    fn test_default_mqtt_prefix_comes_from_device_id() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.mqtt_topic_prefix().unwrap(), "hidproxy-2b2f");
    }

    #[test]
    fn test_explicit_mqtt_prefix_wins() {
        let mut cfg = AppConfig::default();
        cfg.mqtt.topic_prefix = Some("desk".into());
        assert_eq!(cfg.mqtt_topic_prefix().unwrap(), "desk");
    }

    #[test]
    fn test_invalid_device_id_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.device.id = "not hex".into();
        assert!(matches!(
            cfg.device_id_bytes(),
            Err(ConfigError::InvalidDeviceId(_))
        ));
    }

    #[test]
    fn test_zero_status_interval_disables_status_line() {
        let mut cfg = AppConfig::default();
        cfg.diagnostics.status_interval_secs = 0;
        assert_eq!(cfg.status_interval(), None);
    }

    // ── TOML ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        // Arrange
        let toml_str = r#"
[security]
idle_timeout_secs = 60
[web]
enabled = true
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.security.idle_timeout_secs, 60);
        assert_eq!(cfg.security.web_access_secs, 300);
        assert!(cfg.web.enabled);
        assert_eq!(cfg.web.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let result: Result<AppConfig, toml::de::Error> = toml::from_str("[[[ nope");
        assert!(result.is_err());
    }

    // ── File round-trip ───────────────────────────────────────────────────────

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_load_reads_written_file() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hid-proxy.toml");
        std::fs::write(&path, "[device]\nid = \"0102030405060708\"\n\n[mqtt]\nenabled = true\n")
            .unwrap();

        // Act
        let cfg = load_config(&path).unwrap();

        // Assert
        assert_eq!(cfg.device.id, "0102030405060708");
        assert!(cfg.mqtt.enabled);
        assert_eq!(cfg.mqtt.topic_prefix, None);
        assert_eq!(cfg.storage, AppConfig::default().storage);
    }

    #[test]
    fn test_unreadable_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_config(dir.path()), Err(ConfigError::Io { .. })));
    }
}
