//! Configuration loading and validation
//!
//! TOML file located via `$VOICELINK_CONFIG` or the default search paths.
//! Every field has a default except the transport endpoint itself, whose
//! absence is a startup error caught by `validate` before any connect.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::audio::FrameSpec;
use crate::error::{ClientError, ClientResult};

/// Environment variable naming an explicit config file path
const CONFIG_PATH_ENV: &str = "VOICELINK_CONFIG";
/// Default search locations, most specific first
const SEARCH_PATHS: &[&str] = &["voicelink.toml", "/etc/voicelink/config.toml"];

fn default_transport() -> String {
    "websocket".to_string()
}

fn default_protocol_version() -> u32 {
    1
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn default_frame_duration() -> u32 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Sent as the Device-Id handshake header
    pub device_id: String,
    /// Sent as the Client-Id handshake header
    pub client_id: String,
    /// Resume listening automatically after server speech ends
    pub auto_listen: bool,
    pub network: NetworkConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            client_id: String::new(),
            auto_listen: true,
            network: NetworkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Which transport backend to build
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default)]
    pub websocket: Option<WebsocketConfig>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            websocket: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebsocketConfig {
    pub url: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
}

/// Audio frame geometry, advertised in the hello handshake
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// Frame length in milliseconds
    #[serde(default = "default_frame_duration")]
    pub frame_duration: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            frame_duration: default_frame_duration(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from `$VOICELINK_CONFIG` or the search paths.
    pub fn load() -> ClientResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::load_from(Path::new(&path));
        }

        for candidate in SEARCH_PATHS {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Err(ClientError::Config(format!(
            "no configuration file found (set {CONFIG_PATH_ENV} or create {})",
            SEARCH_PATHS.join(" / ")
        )))
    }

    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| ClientError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Reject configurations that cannot produce a working session.
    pub fn validate(&self) -> ClientResult<()> {
        match self.system.network.transport.as_str() {
            "websocket" => {
                let ws = self.system.network.websocket.as_ref().ok_or_else(|| {
                    ClientError::Config(
                        "websocket transport selected but [system.network.websocket] is not configured"
                            .to_string(),
                    )
                })?;
                if ws.url.is_empty() {
                    return Err(ClientError::Config(
                        "websocket url must not be empty".to_string(),
                    ));
                }
            }
            other => {
                return Err(ClientError::Config(format!(
                    "unsupported transport: {other}"
                )));
            }
        }

        if self.audio.sample_rate == 0 {
            return Err(ClientError::Config(
                "audio sample_rate must be positive".to_string(),
            ));
        }
        if !(1..=2).contains(&self.audio.channels) {
            return Err(ClientError::Config(format!(
                "unsupported channel count: {}",
                self.audio.channels
            )));
        }
        if self.frame_spec().samples_per_frame() == 0 {
            return Err(ClientError::Config(
                "audio frame_duration must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn frame_spec(&self) -> FrameSpec {
        FrameSpec::from(&self.audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied_to_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.frame_duration, 60);
        assert_eq!(config.system.network.transport, "websocket");
        assert!(config.system.auto_listen);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [system]
            device_id = "aa:bb:cc:dd:ee:ff"
            client_id = "device-7"
            auto_listen = false

            [system.network]
            transport = "websocket"

            [system.network.websocket]
            url = "wss://voice.example.test/session"
            access_token = "secret"
            protocol_version = 2

            [audio]
            sample_rate = 24000
            channels = 2
            frame_duration = 20

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert!(!config.system.auto_listen);
        let ws = config.system.network.websocket.as_ref().unwrap();
        assert_eq!(ws.protocol_version, 2);
        assert_eq!(config.frame_spec().samples_per_frame(), 960);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_requires_websocket_section() {
        let config: Config = toml::from_str("").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_unknown_transport() {
        let config: Config = toml::from_str(
            r#"
            [system.network]
            transport = "mqtt_udp"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_frame_duration() {
        let config: Config = toml::from_str(
            r#"
            [system.network.websocket]
            url = "wss://example.test"

            [audio]
            frame_duration = 0
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
