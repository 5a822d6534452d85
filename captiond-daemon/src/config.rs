//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use captiond_audio::CaptureConfig;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Unix socket path for IPC
    pub socket_path: String,

    /// WebSocket URL of the speech recognizer
    pub recognizer_url: String,

    /// Translation service endpoint
    pub translation_url: String,

    /// Speech synthesis service endpoint
    pub synthesis_url: String,

    /// Caption ingestion endpoint
    pub caption_url: String,

    /// Caption ingestion region parameter
    pub caption_region: String,

    /// Microphone capture settings
    pub capture: CaptureConfig,

    /// Translation model ("ctranslate", "fairseq", or "passthrough")
    pub translation_model: String,

    /// Source language code
    pub source_language: String,

    /// Target language code
    pub target_language: String,

    /// Play synthesized translations through the local output device
    pub auto_play_audio: bool,

    /// Synthesis voice
    pub voice: String,

    /// Broadcast stream key; captioning is disabled when unset
    pub stream_key: Option<String>,

    /// Seconds added to caption target timestamps to line up with the
    /// broadcast delay
    pub caption_offset_secs: f64,

    /// Interleave epoch-millisecond markers with outbound audio frames
    pub send_timestamp_markers: bool,

    /// Override for the sequence counter store location
    pub counter_path: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            socket_path: "/tmp/captiond.sock".to_string(),
            recognizer_url: "ws://localhost:2700".to_string(),
            translation_url: "http://localhost:8100/translate".to_string(),
            synthesis_url: "http://localhost:8200/synthesize".to_string(),
            caption_url: "http://localhost:8300/captions".to_string(),
            caption_region: "reg1".to_string(),
            capture: CaptureConfig::default(),
            translation_model: "ctranslate".to_string(),
            source_language: "hsb".to_string(),
            target_language: "de".to_string(),
            auto_play_audio: false,
            voice: "weronika".to_string(),
            stream_key: None,
            caption_offset_secs: 0.0,
            send_timestamp_markers: false,
            counter_path: None,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default location, or create it.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_config_path())
    }

    /// Load configuration from a specific file, or create a default one there.
    pub fn load_from(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let mut config: DaemonConfig = toml::from_str(&contents)
                .context("Failed to parse config file")?;

            config.config_path = config_path;
            Ok(config)
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save()
                .context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get default config path
    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("captiond")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_creates_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = DaemonConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.socket_path, "/tmp/captiond.sock");
        assert_eq!(config.translation_model, "ctranslate");
        assert_eq!(config.stream_key, None);
        assert!(!config.auto_play_audio);
    }

    #[test]
    fn saved_config_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = DaemonConfig::load_from(&path).unwrap();
        config.stream_key = Some("abcd-efgh".to_string());
        config.caption_offset_secs = 4.5;
        config.capture.device = Some("USB Microphone".to_string());
        config.save().unwrap();

        let reloaded = DaemonConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.stream_key.as_deref(), Some("abcd-efgh"));
        assert_eq!(reloaded.caption_offset_secs, 4.5);
        assert_eq!(reloaded.capture.device.as_deref(), Some("USB Microphone"));
    }
}
