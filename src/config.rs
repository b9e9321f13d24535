use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub server: ServerConfig,
    pub batch: BatchConfig,
}

/// Client-side connection and segmentation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub addr: String,
    pub port: u16,
    pub file_seg_duration: f64,
    pub file_seg_overlap: f64,
    pub mic_seg_duration: f64,
    pub mic_seg_overlap: f64,
    pub connect_attempts: u32,
    pub recv_timeout_secs: u64,
}

/// Recognition server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub port: u16,
    /// Load the punctuation capability in the background after startup.
    pub punctuation: bool,
    pub engine: EngineConfig,
}

/// Which acoustic engine the server drives
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// External process: f32le audio on stdin, JSON result on stdout.
    Command,
    /// In-process Whisper model (requires the `whisper` feature).
    Whisper,
}

/// Acoustic engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    pub command: Vec<String>,
    pub model_path: Option<PathBuf>,
    pub language: String,
    pub threads: Option<usize>,
}

/// Long-media batch pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub split_duration_secs: f64,
    pub min_remainder_secs: f64,
    pub split_suffix: String,
    pub temp_audio_suffix: String,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub extract_command: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
            port: defaults::SERVER_PORT,
            file_seg_duration: defaults::FILE_SEG_DURATION,
            file_seg_overlap: defaults::FILE_SEG_OVERLAP,
            mic_seg_duration: defaults::MIC_SEG_DURATION,
            mic_seg_overlap: defaults::MIC_SEG_OVERLAP,
            connect_attempts: defaults::CONNECT_ATTEMPTS,
            recv_timeout_secs: defaults::RECV_STALL_TIMEOUT.as_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            punctuation: true,
            engine: EngineConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Command,
            command: Vec::new(),
            model_path: None,
            language: "auto".to_string(),
            threads: None,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            split_duration_secs: defaults::SPLIT_DURATION_SECS,
            min_remainder_secs: defaults::MIN_REMAINDER_SECS,
            split_suffix: defaults::SPLIT_SUFFIX.to_string(),
            temp_audio_suffix: defaults::TEMP_AUDIO_SUFFIX.to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            extract_command: defaults::extract_command_template(),
        }
    }
}

impl ClientConfig {
    /// `host:port` of the recognition server.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

impl ServerConfig {
    /// `host:port` the server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                let missing = e
                    .downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false);
                if missing {
                    Ok(Self::default())
                } else {
                    Err(e.context(format!("Failed to load config from {}", path.display())))
                }
            }
        }
    }

    /// Reject values the pipelines cannot work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::CapscribeError;

        if self.batch.split_duration_secs <= 0.0 {
            return Err(CapscribeError::ConfigInvalidValue {
                key: "batch.split_duration_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.batch.min_remainder_secs < 0.0 {
            return Err(CapscribeError::ConfigInvalidValue {
                key: "batch.min_remainder_secs".to_string(),
                message: "must not be negative".to_string(),
            });
        }
        if self.batch.split_suffix.is_empty() || self.batch.temp_audio_suffix.is_empty() {
            return Err(CapscribeError::ConfigInvalidValue {
                key: "batch.split_suffix".to_string(),
                message: "chunk naming suffixes must not be empty".to_string(),
            });
        }
        if self.client.connect_attempts == 0 {
            return Err(CapscribeError::ConfigInvalidValue {
                key: "client.connect_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for (key, duration, overlap) in [
            (
                "client.file_seg_duration",
                self.client.file_seg_duration,
                self.client.file_seg_overlap,
            ),
            (
                "client.mic_seg_duration",
                self.client.mic_seg_duration,
                self.client.mic_seg_overlap,
            ),
        ] {
            if duration <= 0.0 || overlap < 0.0 {
                return Err(CapscribeError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "duration must be positive and overlap non-negative".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CAPSCRIBE_ADDR → client.addr
    /// - CAPSCRIBE_PORT → client.port and server.port
    /// - CAPSCRIBE_PUNCTUATION → server.punctuation ("0"/"false" disables)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = std::env::var("CAPSCRIBE_ADDR") {
            if !addr.is_empty() {
                self.client.addr = addr;
            }
        }

        if let Ok(port) = std::env::var("CAPSCRIBE_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.client.port = port;
                self.server.port = port;
            }
        }

        if let Ok(flag) = std::env::var("CAPSCRIBE_PUNCTUATION") {
            match flag.to_ascii_lowercase().as_str() {
                "0" | "false" | "off" | "no" => self.server.punctuation = false,
                "1" | "true" | "on" | "yes" => self.server.punctuation = true,
                _ => {}
            }
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/capscribe/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capscribe")
            .join("config.toml")
    }
}
