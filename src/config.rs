//! Configuration management for pixelpair
//!
//! Provides loading, saving, and validation of negotiation settings (ICE
//! servers, gathering timeout) and bundle image settings (codec mode, QR
//! geometry, generated carrier size).

use crate::codec::qr::QrOptions;
use crate::codec::CodecMode;
use crate::errors::LinkError;
use crate::transport::RtcConfiguration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wait for ICE gathering before a bundle is emitted anyway.
pub const DEFAULT_GATHER_TIMEOUT_MS: u64 = 10_000;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPairConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub codec: CodecConfig,
}

/// Negotiation session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum wait for ICE gathering to complete, in milliseconds
    pub gather_timeout_ms: u64,
    /// Transport configuration for every transport the session creates
    #[serde(default)]
    pub rtc: RtcConfiguration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gather_timeout_ms: DEFAULT_GATHER_TIMEOUT_MS,
            rtc: RtcConfiguration::default(),
        }
    }
}

impl SessionConfig {
    pub fn gather_timeout(&self) -> Duration {
        Duration::from_millis(self.gather_timeout_ms)
    }
}

/// Bundle image configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Codec used when none is requested explicitly
    #[serde(default)]
    pub mode: CodecMode,
    #[serde(default)]
    pub qr: QrOptions,
    /// Fixed [width, height] for generated stego carriers; sized to the
    /// payload when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_size: Option<[u32; 2]>,
}

impl PixelPairConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, LinkError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| LinkError::Config(format!("Failed to read config file: {}", e)))?;

        let config: PixelPairConfig = toml::from_str(&contents)
            .map_err(|e| LinkError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), LinkError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LinkError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| LinkError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| LinkError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("pixelpair.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.session.gather_timeout_ms == 0 {
            return Err("Gather timeout must be greater than zero".to_string());
        }
        for server in &self.session.rtc.ice_servers {
            if server.urls.is_empty() || server.urls.iter().any(|url| url.trim().is_empty()) {
                return Err("ICE server entries need at least one non-empty URL".to_string());
            }
        }

        if self.codec.qr.module_px == 0 || self.codec.qr.module_px > 64 {
            return Err("QR module size must be between 1 and 64 pixels".to_string());
        }
        if self.codec.qr.quiet_zone > 64 {
            return Err("QR quiet zone must be at most 64 modules".to_string());
        }
        if let Some([width, height]) = self.codec.carrier_size {
            if width == 0 || height == 0 {
                return Err("Carrier size must be non-zero".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::IceServer;

    #[test]
    fn test_default_config() {
        let config = PixelPairConfig::default();
        assert_eq!(config.session.gather_timeout(), Duration::from_secs(10));
        assert_eq!(config.codec.mode, CodecMode::QrMultiplex);
        assert!(config.codec.carrier_size.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = PixelPairConfig::default();
        config.session.gather_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = PixelPairConfig::default();
        config.session.rtc.ice_servers.push(IceServer {
            urls: vec![],
            username: None,
            credential: None,
        });
        assert!(config.validate().is_err());

        let mut config = PixelPairConfig::default();
        config.codec.qr.module_px = 0;
        assert!(config.validate().is_err());

        let mut config = PixelPairConfig::default();
        config.codec.qr.module_px = 100_000_000;
        assert!(config.validate().is_err());

        let mut config = PixelPairConfig::default();
        config.codec.qr.quiet_zone = u32::MAX;
        assert!(config.validate().is_err());

        let mut config = PixelPairConfig::default();
        config.codec.carrier_size = Some([0, 480]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pixelpair.toml");

        let mut config = PixelPairConfig::default();
        config.session.gather_timeout_ms = 2500;
        config.codec.mode = CodecMode::Stego;
        config.codec.carrier_size = Some([640, 480]);

        config.save_to_file(&path).unwrap();
        let loaded = PixelPairConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PixelPairConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, PixelPairConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[codec]\nmode = \"stego\"\n").unwrap();

        let config = PixelPairConfig::load_from_file(&path).unwrap();
        assert_eq!(config.codec.mode, CodecMode::Stego);
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[session\n").unwrap();

        assert!(matches!(
            PixelPairConfig::load_from_file(&path),
            Err(LinkError::Config(_))
        ));
    }
}
