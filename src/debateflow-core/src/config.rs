//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::OutputFormat;
use crate::error::JudgingError;
use crate::pairing::{Voice, VoicePool};

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub audio: AudioConfig,
    pub providers: ProvidersConfig,
}

/// On-disk layout.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub debates_dir: PathBuf,
    pub annotations_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub sessions_dir: PathBuf,
}

/// Stitched-audio settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Silence between consecutive speeches.
    pub gap_seconds: f32,
    /// Sample rate of the stitched asset.
    pub sample_rate: u32,
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// Primary and fallback speech providers.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub primary: ProviderConfig,
    pub secondary: ProviderConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    ElevenLabs,
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::ElevenLabs => "elevenlabs",
            ProviderKind::OpenAi => "openai",
        }
    }
}

/// Configuration for one speech provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    /// Environment variable holding the credential.
    pub api_key_env: String,
    /// Override for the provider's API base URL.
    #[serde(default)]
    pub api_base: Option<String>,
    pub voices: Vec<Voice>,
}

impl ProviderConfig {
    pub fn pool(&self) -> VoicePool {
        VoicePool::new(self.voices.clone())
    }

    /// Read this provider's credential from the environment, if set.
    pub fn credential_from_env(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, JudgingError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| JudgingError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, JudgingError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| JudgingError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the voice pairing and stitcher rely on.
    pub fn validate(&self) -> Result<(), JudgingError> {
        let primary = self.providers.primary.voices.len();
        let secondary = self.providers.secondary.voices.len();

        if primary < 2 || secondary < 2 {
            return Err(JudgingError::ConfigError(
                "Each voice pool needs at least two voices".to_string(),
            ));
        }
        if primary != secondary {
            return Err(JudgingError::ConfigError(format!(
                "Voice pools must have equal size for fallback remapping \
                 (primary {primary}, secondary {secondary})"
            )));
        }
        if self.audio.gap_seconds.is_nan() || self.audio.gap_seconds < 0.0 {
            return Err(JudgingError::ConfigError(
                "audio.gap_seconds must be non-negative".to_string(),
            ));
        }
        if self.audio.sample_rate == 0 {
            return Err(JudgingError::ConfigError(
                "audio.sample_rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config {
        paths: PathsConfig {
            debates_dir: PathBuf::from("output/debates"),
            annotations_dir: PathBuf::from("output/annotations"),
            audio_dir: PathBuf::from("output/audio"),
            sessions_dir: PathBuf::from("output/sessions"),
        },
        audio: AudioConfig {
            gap_seconds: 2.0,
            sample_rate: 24_000,
            output_format: OutputFormat::Wav,
        },
        providers: ProvidersConfig {
            primary: ProviderConfig {
                kind: ProviderKind::ElevenLabs,
                model: "eleven_multilingual_v2".to_string(),
                api_key_env: "DF_ELEVENLABS_API_KEY".to_string(),
                api_base: None,
                voices: vec![
                    Voice::new("JBFqnCBsd6RMkjVDRZzb", "George"),
                    Voice::new("TX3LPaxmHKxFdv7VOQHJ", "Liam"),
                    Voice::new("XB0fDUnXU5powFXDhCwa", "Charlotte"),
                    Voice::new("pFZP5JQG7iQjIQuC4Bku", "Lily"),
                    Voice::new("bIHbv24MWmeRgasZH58o", "Will"),
                    Voice::new("FGY2WhTYpPnrIDTdsKH5", "Laura"),
                ],
            },
            secondary: ProviderConfig {
                kind: ProviderKind::OpenAi,
                model: "tts-1".to_string(),
                api_key_env: "DF_OPENAI_API_KEY".to_string(),
                api_base: None,
                voices: vec![
                    Voice::new("onyx", "Onyx"),
                    Voice::new("echo", "Echo"),
                    Voice::new("nova", "Nova"),
                    Voice::new("shimmer", "Shimmer"),
                    Voice::new("fable", "Fable"),
                    Voice::new("alloy", "Alloy"),
                ],
            },
        },
    }
}
