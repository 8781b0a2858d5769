//! Configuration management.
//!
//! Layered: built-in defaults, then `<data>/config.json` (overridable via
//! `CONFIG_DIR`/`CONFIG_FILE`), then environment variables. Unknown backend
//! or provider keys are a fatal config error at startup.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Default port for the app/admin-facing listener.
pub const DEFAULT_APP_HTTP_PORT: u16 = 7091;
/// Default port for the miniserver-facing listener.
pub const DEFAULT_MS_HTTP_PORT: u16 = 7095;

/// Per-zone configuration as loaded from the admin config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Numeric zone id assigned by the miniserver.
    pub id: u32,
    /// Backend kind key (`musicassistant`, `beolink`). None = unconfigured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Device or server address for the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Vendor-side player id (Music Assistant player id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma_player_id: Option<String>,
    /// Display name for the zone's source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_volume: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_volume: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_volume: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_volume: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MusicAssistantConfig {
    pub host: String,
    #[serde(default = "default_ma_port")]
    pub port: u16,
}

fn default_ma_port() -> u16 {
    8095
}

/// URL base handed to the miniserver for alert/TTS media.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_app_port")]
    pub app_http_port: u16,
    #[serde(default = "default_ms_port")]
    pub ms_http_port: u16,

    /// Media provider registry key (or alias). None selects the dummy.
    #[serde(default)]
    pub media_provider: Option<String>,

    #[serde(default)]
    pub zones: Vec<ZoneConfig>,

    #[serde(default)]
    pub musicassistant: Option<MusicAssistantConfig>,

    #[serde(default)]
    pub alerts: AlertsConfig,
}

fn default_app_port() -> u16 {
    DEFAULT_APP_HTTP_PORT
}

fn default_ms_port() -> u16 {
    DEFAULT_MS_HTTP_PORT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_http_port: DEFAULT_APP_HTTP_PORT,
            ms_http_port: DEFAULT_MS_HTTP_PORT,
            media_provider: None,
            zones: Vec::new(),
            musicassistant: None,
            alerts: AlertsConfig::default(),
        }
    }
}

impl Config {
    /// Reject unknown backend/provider keys before anything starts.
    pub fn validate(
        &self,
        known_backends: &[&str],
        known_providers: &[&str],
    ) -> std::result::Result<(), ServerError> {
        for zone in &self.zones {
            if let Some(backend) = &zone.backend {
                if !known_backends.contains(&backend.as_str()) {
                    return Err(ServerError::Config(format!(
                        "zone {}: unknown backend kind '{}'",
                        zone.id, backend
                    )));
                }
            }
        }
        if let Some(provider) = &self.media_provider {
            if !known_providers.contains(&provider.as_str()) {
                return Err(ServerError::Config(format!(
                    "unknown media provider '{provider}'"
                )));
            }
        }
        Ok(())
    }

    pub fn zone(&self, zone_id: u32) -> Option<&ZoneConfig> {
        self.zones.iter().find(|z| z.id == zone_id)
    }
}

/// Data directory: favorites, recents, admin config.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DATA_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from("./data")
}

/// Public media root served to the miniserver (alerts, TTS cache).
pub fn get_public_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PUBLIC_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from("./public")
}

/// Log file directory.
pub fn get_log_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LOG_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from("./logs")
}

/// Resolve the admin config file path, honoring `CONFIG_DIR`/`CONFIG_FILE`.
pub fn config_file_path() -> PathBuf {
    if let Ok(file) = std::env::var("CONFIG_FILE") {
        return PathBuf::from(file);
    }
    let dir = std::env::var("CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| get_data_dir());
    dir.join("config.json")
}

/// Load the layered configuration.
pub fn load_config() -> Result<Config> {
    let path = config_file_path();

    let builder = ::config::Config::builder()
        .set_default("app_http_port", i64::from(DEFAULT_APP_HTTP_PORT))?
        .set_default("ms_http_port", i64::from(DEFAULT_MS_HTTP_PORT))?
        .add_source(::config::File::from(path.clone()).required(false))
        .add_source(
            ::config::Environment::with_prefix("AUDIOSERVER")
                .separator("__")
                .try_parsing(true),
        );

    let mut cfg: Config = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .with_context(|| format!("loading config from {}", path.display()))?;

    // Well-known plain env names override the file.
    if let Ok(provider) = std::env::var("MEDIA_PROVIDER") {
        if !provider.is_empty() {
            cfg.media_provider = Some(provider);
        }
    }
    if let Ok(host) = std::env::var("ALERTS_HOST") {
        if !host.is_empty() {
            cfg.alerts.host = Some(host);
        }
    }
    if let Ok(port) = std::env::var("ALERTS_PORT") {
        if let Ok(port) = port.parse() {
            cfg.alerts.port = Some(port);
        }
    }

    Ok(cfg)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_unknown_backend() {
        let cfg = Config {
            zones: vec![ZoneConfig {
                id: 1,
                backend: Some("sonos".to_string()),
                ..ZoneConfig::default()
            }],
            ..Config::default()
        };
        let err = cfg
            .validate(&["musicassistant", "beolink"], &["dummy"])
            .unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn validate_accepts_unconfigured_zones() {
        let cfg = Config {
            zones: vec![ZoneConfig {
                id: 9,
                ..ZoneConfig::default()
            }],
            ..Config::default()
        };
        assert!(cfg.validate(&["musicassistant"], &["dummy"]).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_provider() {
        let cfg = Config {
            media_provider: Some("nope".to_string()),
            ..Config::default()
        };
        assert!(cfg.validate(&[], &["dummy", "musicassistant"]).is_err());
    }

    #[test]
    fn zone_lookup_by_id() {
        let cfg = Config {
            zones: vec![
                ZoneConfig {
                    id: 1,
                    ..ZoneConfig::default()
                },
                ZoneConfig {
                    id: 7,
                    source_name: Some("Kitchen".to_string()),
                    ..ZoneConfig::default()
                },
            ],
            ..Config::default()
        };
        assert_eq!(cfg.zone(7).unwrap().source_name.as_deref(), Some("Kitchen"));
        assert!(cfg.zone(2).is_none());
    }
}
