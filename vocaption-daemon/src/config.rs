//! Configuration management

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Supported transcription backend kinds.
///
/// Recognition engines run out of process and attach over the remote
/// adapter; selecting one here is a closed choice made once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Remote,
}

/// Transcription backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub kind: BackendKind,

    /// Address of the remote recognition engine (host:port).
    pub remote_addr: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::Remote,
            remote_addr: "127.0.0.1:2700".to_string(),
        }
    }
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Input device index (None = system default).
    pub device_index: Option<usize>,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_duration_seconds: f32,
    /// Optional low-level blocksize override.
    pub blocksize: Option<usize>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device_index: None,
            sample_rate: 16_000,
            channels: 1,
            chunk_duration_seconds: 0.5,
            blocksize: None,
        }
    }
}

/// Closed-caption endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionSettings {
    /// Caption POST URL distributed by the meeting host.
    pub post_url: Option<String>,
    pub enabled: bool,
    pub min_post_interval_seconds: f64,
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self {
            post_url: None,
            enabled: true,
            min_post_interval_seconds: 1.0,
        }
    }
}

/// Transcript persistence configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptLogSettings {
    pub enabled: bool,
    pub file_path: Option<PathBuf>,
    pub include_timestamps: bool,
    pub overwrite: bool,
}

/// Webhook notifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierSettings {
    pub webhook_url: Option<String>,
    pub username: String,
    pub enabled: bool,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: "Vocaption".to_string(),
            enabled: false,
        }
    }
}

/// Display sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

/// Aggregated daemon settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path this configuration was loaded from.
    #[serde(skip)]
    pub config_path: PathBuf,

    pub backend: BackendSettings,
    pub audio: AudioSettings,
    pub caption: CaptionSettings,
    pub transcript_log: TranscriptLogSettings,
    pub notifier: NotifierSettings,
    pub display: DisplaySettings,
}

impl Settings {
    /// Load settings from the given file, or from the default location,
    /// creating a default config file there if none exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let mut settings: Settings = toml::from_str(&contents)
                .context("Failed to parse config file")?;

            settings.config_path = config_path;
            Ok(settings)
        } else if path.is_some() {
            bail!("Config file not found: {}", config_path.display());
        } else {
            let settings = Self {
                config_path,
                ..Default::default()
            };
            settings.save().context("Failed to save default config")?;
            Ok(settings)
        }
    }

    /// Save settings to their config path.
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

    /// Validate value ranges before any pipeline component is constructed.
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if !(8_000..=96_000).contains(&audio.sample_rate) {
            bail!("audio.sample_rate must be within 8000..=96000 Hz");
        }
        if !(1..=2).contains(&audio.channels) {
            bail!("audio.channels must be 1 or 2");
        }
        if !(audio.chunk_duration_seconds > 0.0 && audio.chunk_duration_seconds <= 5.0) {
            bail!("audio.chunk_duration_seconds must be within (0, 5]");
        }
        if (audio.sample_rate as f32 * audio.chunk_duration_seconds) as usize == 0 {
            bail!("audio chunk duration and sample rate produce zero frames");
        }

        if !(0.1..=5.0).contains(&self.caption.min_post_interval_seconds) {
            bail!("caption.min_post_interval_seconds must be within 0.1..=5.0");
        }
        if let Some(url) = &self.caption.post_url {
            reqwest::Url::parse(url)
                .with_context(|| format!("caption.post_url is not a valid URL: {url}"))?;
        }
        if let Some(url) = &self.notifier.webhook_url {
            reqwest::Url::parse(url)
                .with_context(|| format!("notifier.webhook_url is not a valid URL: {url}"))?;
        }

        if self.backend.remote_addr.is_empty() {
            bail!("backend.remote_addr must not be empty");
        }

        Ok(())
    }

    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vocaption")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.audio.sample_rate, 16_000);
        assert_eq!(settings.caption.min_post_interval_seconds, 1.0);
        assert_eq!(settings.backend.kind, BackendKind::Remote);
        assert!(!settings.display.enabled);
    }

    #[test]
    fn test_invalid_sample_rate_rejected() {
        let settings = Settings {
            audio: AudioSettings {
                sample_rate: 4_000,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_chunk_duration_rejected() {
        let settings = Settings {
            audio: AudioSettings {
                chunk_duration_seconds: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_bad_caption_url_rejected() {
        let settings = Settings {
            caption: CaptionSettings {
                post_url: Some("not a url".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let settings: Settings = toml::from_str(
            r#"
            [caption]
            post_url = "https://example.com/closedcaption?id=abc"
            enabled = true
            min_post_interval_seconds = 0.5

            [display]
            enabled = true
            host = "0.0.0.0"
            port = 9001
            "#,
        )
        .unwrap();

        settings.validate().unwrap();
        assert_eq!(settings.display.port, 9001);
        assert_eq!(settings.audio.sample_rate, 16_000); // defaulted
    }
}
