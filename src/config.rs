//! Application configuration
//!
//! Stored as TOML in the platform config directory. Every section falls back
//! to its defaults, so partial files are fine.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Error, Result};

/// Name of the config file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub recorder: RecorderConfig,
    pub logging: LoggingConfig,
}

/// Sockets and send targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    /// Recorder input port
    pub listen_port: u16,
    /// Live control input port
    pub control_port: u16,
    pub osc_target_host: String,
    pub osc_target_port: u16,
    pub artnet_host: String,
    pub artnet_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            control_port: DEFAULT_CONTROL_PORT,
            osc_target_host: DEFAULT_SEND_HOST.to_string(),
            osc_target_port: DEFAULT_OSC_SEND_PORT,
            artnet_host: DEFAULT_SEND_HOST.to_string(),
            artnet_port: DEFAULT_ARTNET_PORT,
        }
    }
}

/// Transport defaults and queue limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub fps: f64,
    /// Project length in seconds
    pub project_length: f64,
    pub record_queue_max: usize,
    pub preview_max: usize,
    pub drain_chunk: usize,
    pub compact_threshold: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            project_length: DEFAULT_PROJECT_LENGTH_SECS,
            record_queue_max: RECORD_QUEUE_MAX_ITEMS,
            preview_max: PREVIEW_MAX_ITEMS,
            drain_chunk: DRAIN_CHUNK_SIZE,
            compact_threshold: COMPACT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "osc-recorder")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` (or the default location); missing files yield defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let recorder = &self.recorder;
        if !(recorder.fps.is_finite() && recorder.fps > 0.0) {
            return Err(Error::Config(format!("fps must be positive, got {}", recorder.fps)));
        }
        if !(recorder.project_length.is_finite() && recorder.project_length >= 0.0) {
            return Err(Error::Config(format!(
                "project_length must be non-negative, got {}",
                recorder.project_length
            )));
        }
        if recorder.record_queue_max == 0 || recorder.preview_max == 0 || recorder.drain_chunk == 0
        {
            return Err(Error::Config("queue limits must be non-zero".to_string()));
        }
        let network = &self.network;
        if network.listen_port == 0 || network.control_port == 0 {
            return Err(Error::Config("listen ports must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.network.listen_port, 9001);
        assert_eq!(config.network.artnet_port, 6454);
        assert_eq!(config.recorder.drain_chunk, 8192);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str("[recorder]\nfps = 60.0\n").unwrap();
        assert_eq!(config.recorder.fps, 60.0);
        assert_eq!(config.recorder.preview_max, PREVIEW_MAX_ITEMS);
        assert_eq!(config.network, NetworkConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = AppConfig::default();
        config.network.listen_port = 9100;
        config.logging.filter = "debug".into();
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
        assert_eq!(AppConfig::load_or_default(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert_eq!(AppConfig::load_or_default(Some(&path)).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.recorder.fps = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AppConfig::default();
        config.recorder.preview_max = 0;
        assert!(config.validate().is_err());
    }
}
