use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use super::{SpeechProvider, SynthesisError, http_client, read_audio_body};
use crate::audio::AudioClip;
use crate::config::{ProviderConfig, ProviderKind};
use crate::pairing::{Voice, VoicePool};

pub const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io/v1";

/// PCM rate requested from ElevenLabs.
const SAMPLE_RATE: u32 = 22_050;

/// Voice settings for debate narration: expressive but stable enough that
/// the two sides stay recognizable.
#[derive(Debug, Clone, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.3,
            similarity_boost: 0.75,
            style: 0.6,
            use_speaker_boost: true,
        }
    }
}

/// ElevenLabs text-to-speech over the REST API.
pub struct ElevenLabsProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    pool: VoicePool,
    voice_settings: VoiceSettings,
}

impl ElevenLabsProvider {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, SynthesisError> {
        Ok(Self {
            client: http_client()?,
            api_key,
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| ELEVENLABS_API_BASE.to_string()),
            model: config.model.clone(),
            pool: config.pool(),
            voice_settings: VoiceSettings::default(),
        })
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ElevenLabs
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn pool(&self) -> &VoicePool {
        &self.pool
    }

    async fn synthesize(&self, text: &str, voice: &Voice) -> Result<AudioClip, SynthesisError> {
        let url = format!(
            "{}/text-to-speech/{}?output_format=pcm_{}",
            self.api_base.trim_end_matches('/'),
            voice.id,
            SAMPLE_RATE
        );
        let body = json!({
            "text": text,
            "model_id": self.model,
            "voice_settings": self.voice_settings,
        });

        let response = self
            .client
            .post(url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/pcm")
            .json(&body)
            .send()
            .await?;

        let bytes = read_audio_body("elevenlabs", response).await?;
        AudioClip::from_pcm16_le(&bytes, SAMPLE_RATE).map_err(|e| SynthesisError::Decode {
            provider: "elevenlabs",
            reason: e.to_string(),
        })
    }
}
