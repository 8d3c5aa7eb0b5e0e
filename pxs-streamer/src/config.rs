//! Configuration for the test-pattern streamer.

use std::path::Path;

use serde::{Deserialize, Serialize};

use pxs_core::{CompressionPolicy, SendWorkerConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    pub network: NetworkConfig,
    pub stream: StreamConfig,
    /// Segmentation and send worker tuning.
    pub worker: SendWorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server address, `host:port`.
    pub server_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub stream_id: String,
    pub width: u32,
    pub height: u32,
    /// Target frames per second.
    pub fps: u32,
    /// Frames to send before closing (0 = until interrupted).
    pub frames: u64,
    pub compression: CompressionPolicy,
    /// JPEG quality, 1..=100.
    pub quality: u8,
    /// Number of producers splitting the frame into vertical bands.
    pub sources: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            stream: StreamConfig::default(),
            worker: SendWorkerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:1701".into(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_id: "test-pattern".into(),
            width: 1280,
            height: 720,
            fps: 30,
            frames: 0,
            compression: CompressionPolicy::On,
            quality: 75,
            sources: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl StreamerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

// ── Tests ────────────────────────────────────────────────────────
