//! Configuration management for the robot streamer.
//!
//! The original deployment ran on compiled-in constants; here everything is
//! a TOML file with the same values as defaults, so a bare `robot-streamer`
//! behaves like the fixed-port build.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::protocol::{DEFAULT_MAGIC, DEFAULT_MAX_PAYLOAD};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete streamer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub camera: CameraConfig,
}

/// UDP channel and wire-protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Port for subscriber registrations
    #[serde(default = "default_subscribe_port")]
    pub subscribe_port: u16,

    /// Port for steering commands
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Video port assumed for subscribers that never named one
    #[serde(default = "default_video_port")]
    pub default_video_port: u16,

    /// JPEG payload bytes per video datagram
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,

    /// Wire-protocol magic constant
    #[serde(default = "default_magic")]
    pub magic: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            subscribe_port: default_subscribe_port(),
            command_port: default_command_port(),
            default_video_port: default_video_port(),
            max_payload: default_max_payload(),
            magic: default_magic(),
        }
    }
}

/// Camera and encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Camera device
    /// - macOS: "0" for the first webcam
    /// - Linux: "/dev/video0"
    /// - Raspberry Pi: libcamera camera name
    #[serde(default = "default_device")]
    pub device: String,

    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// JPEG quality (1-100)
    #[serde(default = "default_quality")]
    pub quality: u32,

    /// Flip method (optional)
    /// - "vertical-flip"
    /// - "horizontal-flip"
    /// - "rotate-180"
    /// - "rotate-90"
    /// - "rotate-270"
    #[serde(default)]
    pub flip_method: Option<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            quality: default_quality(),
            flip_method: None,
        }
    }
}

// Default value functions
fn default_subscribe_port() -> u16 {
    5007
}
fn default_command_port() -> u16 {
    5005
}
fn default_video_port() -> u16 {
    5600
}
fn default_max_payload() -> usize {
    DEFAULT_MAX_PAYLOAD
}
fn default_magic() -> u32 {
    DEFAULT_MAGIC
}
fn default_device() -> String {
    "0".to_string()
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> u32 {
    20
}
fn default_quality() -> u32 {
    80
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            camera: CameraConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Loads from `path` when it exists, otherwise falls back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            info!(path = %path.as_ref().display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Loads configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration
    fn validate(&self) -> Result<(), ConfigError> {
        let net = &self.network;

        if net.subscribe_port == 0 || net.command_port == 0 || net.default_video_port == 0 {
            return Err(ConfigError::Invalid("ports must be > 0".to_string()));
        }

        if net.subscribe_port == net.command_port {
            return Err(ConfigError::Invalid(format!(
                "subscribe and command channels must use distinct ports, both are {}",
                net.subscribe_port
            )));
        }

        if net.max_payload < 64 || net.max_payload > 65_000 {
            return Err(ConfigError::Invalid(format!(
                "max_payload must be between 64 and 65000, got {}",
                net.max_payload
            )));
        }

        let cam = &self.camera;

        if cam.width == 0 || cam.height == 0 {
            return Err(ConfigError::Invalid(
                "width and height must be > 0".to_string(),
            ));
        }

        if cam.fps == 0 || cam.fps > 120 {
            return Err(ConfigError::Invalid(format!(
                "fps must be between 1 and 120, got {}",
                cam.fps
            )));
        }

        if cam.quality == 0 || cam.quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "quality must be between 1 and 100, got {}",
                cam.quality
            )));
        }

        Ok(())
    }

    /// Saves configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
