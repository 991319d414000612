//! Capture and service configuration.
//!
//! Everything is resolved once at startup into a [`FileConfig`]; nothing
//! below the HTTP layer reads the environment.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration applied when a camera is opened and its frames encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Target frames per second requested from the device.
    pub fps: u32,
    /// Capture grayscale frames instead of RGB.
    pub grayscale: bool,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    /// Upper bound for a single open or frame read, in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            grayscale: false,
            jpeg_quality: 85,
            read_timeout_ms: 5000,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Read timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::InvalidQuality(self.jpeg_quality));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    #[error("invalid JPEG quality {0} (must be 1-100)")]
    InvalidQuality(u8),
    #[error("read timeout must be non-zero")]
    InvalidTimeout,
    #[error("duplicate camera device id {0}")]
    DuplicateDevice(u32),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Policy for long-running MJPEG streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames per second delivered to each viewer.
    pub fps: u32,
    /// Pause before retrying after a failed frame, in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fps: 15,
            retry_delay_ms: 100,
        }
    }
}

impl StreamConfig {
    /// Minimum spacing between two frames sent to one viewer.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }

    /// Retry delay as a [`Duration`].
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// One configured camera slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Slot index used in URLs and API calls.
    pub id: u32,
    /// Device node, e.g. `/dev/video0`.
    pub path: String,
    /// Human name, also accepted as a device selector.
    pub name: String,
}

/// The two cameras of the grow-box add-on.
pub fn default_devices() -> Vec<DeviceConfig> {
    vec![
        DeviceConfig {
            id: 0,
            path: "/dev/video0".into(),
            name: "upper".into(),
        },
        DeviceConfig {
            id: 1,
            path: "/dev/video2".into(),
            name: "lower".into(),
        },
    ]
}

/// HTTP service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// Root that relative photo directories are resolved against.
    pub project_root: PathBuf,
    /// Photo directory; empty means `<project_root>/photos`.
    pub photos_dir: String,
    /// Whether the camera sensor is enabled. Disabled cameras answer 503.
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 5000).into(),
            project_root: PathBuf::from("."),
            photos_dir: "photos".into(),
            enabled: true,
        }
    }
}

impl ServerConfig {
    /// Resolves the directory photos are saved to and served from.
    pub fn resolve_photos_dir(&self) -> PathBuf {
        let raw = self.photos_dir.trim();
        if raw.is_empty() {
            return self.project_root.join("photos");
        }
        let dir = Path::new(raw);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.project_root.join(dir)
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            stream: StreamConfig::default(),
            devices: default_devices(),
            server: ServerConfig::default(),
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates capture settings and device slot uniqueness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.id) {
                return Err(ConfigError::DuplicateDevice(device.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = CaptureConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_quality_bounds() {
        let mut config = CaptureConfig::default();
        config.jpeg_quality = 101;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidQuality(101))
        ));
    }

    #[test]
    fn test_photos_dir_resolution() {
        let mut server = ServerConfig {
            project_root: PathBuf::from("/srv/garden"),
            ..Default::default()
        };
        assert_eq!(
            server.resolve_photos_dir(),
            PathBuf::from("/srv/garden/photos")
        );

        server.photos_dir = "  ".into();
        assert_eq!(
            server.resolve_photos_dir(),
            PathBuf::from("/srv/garden/photos")
        );

        server.photos_dir = "captures/cam".into();
        assert_eq!(
            server.resolve_photos_dir(),
            PathBuf::from("/srv/garden/captures/cam")
        );

        server.photos_dir = "/var/lib/photos".into();
        assert_eq!(server.resolve_photos_dir(), PathBuf::from("/var/lib/photos"));
    }

    #[test]
    fn test_parse_partial_file() {
        let config = FileConfig::from_toml(
            r#"
            [capture]
            width = 1280
            height = 720

            [stream]
            fps = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.width, 1280);
        assert_eq!(config.capture.jpeg_quality, 85);
        assert_eq!(config.stream.fps, 5);
        assert_eq!(config.devices, default_devices());
        assert!(config.server.enabled);
    }

    #[test]
    fn test_duplicate_devices_rejected() {
        let result = FileConfig::from_toml(
            r#"
            [[devices]]
            id = 0
            path = "/dev/video0"
            name = "upper"

            [[devices]]
            id = 0
            path = "/dev/video2"
            name = "lower"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::DuplicateDevice(0))));
    }
}
