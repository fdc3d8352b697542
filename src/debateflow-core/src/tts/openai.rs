use async_trait::async_trait;
use serde_json::json;

use super::{SpeechProvider, SynthesisError, http_client, read_audio_body};
use crate::audio::AudioClip;
use crate::config::{ProviderConfig, ProviderKind};
use crate::pairing::{Voice, VoicePool};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// `response_format=pcm` is always 24 kHz mono s16le.
const SAMPLE_RATE: u32 = 24_000;

/// OpenAI-compatible `/audio/speech` endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    pool: VoicePool,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, SynthesisError> {
        Ok(Self {
            client: http_client()?,
            api_key,
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| OPENAI_API_BASE.to_string()),
            model: config.model.clone(),
            pool: config.pool(),
        })
    }
}

#[async_trait]
impl SpeechProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn pool(&self) -> &VoicePool {
        &self.pool
    }

    async fn synthesize(&self, text: &str, voice: &Voice) -> Result<AudioClip, SynthesisError> {
        let url = format!("{}/audio/speech", self.api_base.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "input": text,
            "voice": voice.id,
            "response_format": "pcm",
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let bytes = read_audio_body("openai", response).await?;
        AudioClip::from_pcm16_le(&bytes, SAMPLE_RATE).map_err(|e| SynthesisError::Decode {
            provider: "openai",
            reason: e.to_string(),
        })
    }
}
