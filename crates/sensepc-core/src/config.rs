//! Desktop configuration.
//!
//! Settings are read from `config.json` in the app data directory. Missing
//! keys fall back to their defaults, so a partial file only overrides what it
//! names. A handful of environment variables win over both, which is how
//! staging backends and debug logging are switched on without touching the
//! file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the persisted configuration inside the app data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

pub const ENV_API_URL: &str = "SENSEPC_API_URL";
pub const ENV_CONNECTOR_URL: &str = "SENSEPC_CONNECTOR_URL";
pub const ENV_DCV_SDK_URL: &str = "SENSEPC_DCV_SDK_URL";
pub const ENV_SETTLE_DELAY_MS: &str = "SENSEPC_SETTLE_DELAY_MS";
pub const ENV_LOG: &str = "SENSEPC_LOG";

/// Runtime configuration for the desktop client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesktopConfig {
    /// Base URL of the SensePC REST API (no trailing slash).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Landing page every viewer navigates to before the bootstrap script
    /// is injected.
    #[serde(default = "default_connector_url")]
    pub connector_url: String,
    /// ES module URL of the DCV web client SDK.
    #[serde(default = "default_dcv_sdk_url")]
    pub dcv_sdk_url: String,
    /// Port used when the backend hands out a bare host name.
    #[serde(default = "default_dcv_port")]
    pub dcv_port: u16,
    /// Delay between navigation completion and script injection.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Total timeout for a single REST call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// TCP/TLS connect timeout for REST calls.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// `error` | `warn` | `info` | `debug` | `trace`
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_base_url() -> String { "https://api.sensepc.com/v1".to_string() }
fn default_connector_url() -> String { "https://connect.sensepc.com/viewer/".to_string() }
fn default_dcv_sdk_url() -> String { "https://connect.sensepc.com/viewer/dcvjs/dcv.js".to_string() }
fn default_dcv_port() -> u16 { 8443 }
fn default_settle_delay_ms() -> u64 { 500 }
fn default_request_timeout() -> u64 { 30 }
fn default_connect_timeout() -> u64 { 10 }
fn default_log_level() -> String { "info".to_string() }

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            connector_url: default_connector_url(),
            dcv_sdk_url: default_dcv_sdk_url(),
            dcv_port: default_dcv_port(),
            settle_delay_ms: default_settle_delay_ms(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl DesktopConfig {
    /// Load the configuration stored at `path`.
    ///
    /// A missing file yields the defaults. A file that exists but cannot be
    /// parsed is an error so a typo does not silently reset every setting.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            log::info!("[config] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let mut config: Self = serde_json::from_str(&raw)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
        config.normalize();
        Ok(config)
    }

    /// Load from `path`, then apply environment overrides.
    ///
    /// This is what the shell calls at startup. A broken file is logged and
    /// replaced by the defaults rather than aborting the launch.
    pub fn load_or_default(path: &Path) -> Self {
        let mut config = Self::load(path).unwrap_or_else(|e| {
            log::warn!("[config] {}; falling back to defaults", e);
            Self::default()
        });
        config.apply_env_overrides();
        config
    }

    /// Persist the configuration as pretty JSON, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, json).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }

    /// Apply `SENSEPC_*` environment variables on top of the current values.
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = env_string(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(url) = env_string(ENV_CONNECTOR_URL) {
            self.connector_url = url;
        }
        if let Some(url) = env_string(ENV_DCV_SDK_URL) {
            self.dcv_sdk_url = url;
        }
        if let Some(raw) = env_string(ENV_SETTLE_DELAY_MS) {
            match raw.parse::<u64>() {
                Ok(ms) => self.settle_delay_ms = ms,
                Err(_) => log::warn!(
                    "[config] ignoring {}={:?}: not a number of milliseconds",
                    ENV_SETTLE_DELAY_MS,
                    raw
                ),
            }
        }
        if let Some(level) = env_string(ENV_LOG) {
            self.log_level = level.to_ascii_lowercase();
        }
        self.normalize();
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Parsed log level; unknown strings map to `Info`.
    pub fn log_level_filter(&self) -> log::LevelFilter {
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "off" => log::LevelFilter::Off,
            "error" => log::LevelFilter::Error,
            "warn" | "warning" => log::LevelFilter::Warn,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }

    fn normalize(&mut self) {
        let trimmed = self.api_base_url.trim().trim_end_matches('/').to_string();
        self.api_base_url = trimmed;
    }
}

/// Fallback configuration directory used when the host framework cannot
/// resolve its own app data directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("SensePC")
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        for name in [ENV_API_URL, ENV_CONNECTOR_URL, ENV_DCV_SDK_URL, ENV_SETTLE_DELAY_MS, ENV_LOG] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = DesktopConfig::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, DesktopConfig::default());
        assert_eq!(config.dcv_port, 8443);
        assert_eq!(config.settle_delay(), Duration::from_millis(500));
    }

    #[test]
    fn partial_file_merges_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "apiBaseUrl": "https://staging.example.com/v1/", "dcvPort": 9443 }"#).unwrap();

        let config = DesktopConfig::load(&path).unwrap();
        assert_eq!(config.api_base_url, "https://staging.example.com/v1");
        assert_eq!(config.dcv_port, 9443);
        assert_eq!(config.connector_url, default_connector_url());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        let err = DesktopConfig::load(&path).unwrap_err();
        assert!(err.contains("Failed to parse"));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = DesktopConfig {
            settle_delay_ms: 1200,
            log_level: "debug".into(),
            ..DesktopConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(DesktopConfig::load(&path).unwrap(), config);
    }

    #[test]
    #[serial]
    fn env_overrides_win() {
        clear_env();
        std::env::set_var(ENV_API_URL, "https://dev.example.com/api/");
        std::env::set_var(ENV_SETTLE_DELAY_MS, "50");
        std::env::set_var(ENV_LOG, "DEBUG");

        let mut config = DesktopConfig::default();
        config.apply_env_overrides();
        clear_env();

        assert_eq!(config.api_base_url, "https://dev.example.com/api");
        assert_eq!(config.settle_delay_ms, 50);
        assert_eq!(config.log_level_filter(), log::LevelFilter::Debug);
    }

    #[test]
    #[serial]
    fn bad_numeric_override_is_ignored() {
        clear_env();
        std::env::set_var(ENV_SETTLE_DELAY_MS, "soon");
        let mut config = DesktopConfig::default();
        config.apply_env_overrides();
        clear_env();
        assert_eq!(config.settle_delay_ms, 500);
    }

    #[test]
    #[serial]
    fn load_or_default_survives_broken_file() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[]").unwrap();
        assert_eq!(DesktopConfig::load_or_default(&path), DesktopConfig::default());
    }

    #[test]
    fn unknown_log_level_maps_to_info() {
        let config = DesktopConfig { log_level: "chatty".into(), ..DesktopConfig::default() };
        assert_eq!(config.log_level_filter(), log::LevelFilter::Info);
    }
}
