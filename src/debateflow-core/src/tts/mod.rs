//! Speech synthesis for debate audio.
//!
//! Providers implement [`SpeechProvider`]. A [`ProviderChain`] ranks the
//! configured providers once and falls back down the list on call-time
//! failure. [`SegmentCache`] memoizes per-turn audio on disk and
//! [`AudioPreparer`] produces the stitched full-debate asset.

mod cache;
mod chain;
mod elevenlabs;
mod openai;
mod prepare;

pub use cache::{AudioManifest, SegmentCache, TurnAudio};
pub use chain::{Credentials, ProviderChain, Synthesized};
pub use elevenlabs::ElevenLabsProvider;
pub use openai::OpenAiProvider;
pub use prepare::{AudioPreparer, PreparedAudio};

#[cfg(test)]
pub(crate) use chain::tests::FakeProvider;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

use crate::audio::AudioClip;
use crate::config::ProviderKind;
use crate::pairing::{Voice, VoicePool};

/// Failure of a single provider call.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0} returned no audio")]
    EmptyAudio(&'static str),

    #[error("Could not decode {provider} audio: {reason}")]
    Decode {
        provider: &'static str,
        reason: String,
    },
}

/// A text-to-speech backend.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Model identifier, part of the synthesis cache key.
    fn model_id(&self) -> &str;

    /// Voices in pool order.
    fn pool(&self) -> &VoicePool;

    /// Synthesize `text` with `voice`.
    async fn synthesize(&self, text: &str, voice: &Voice) -> Result<AudioClip, SynthesisError>;
}

/// Shared HTTP client with the timeouts used for provider calls.
fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(30))
        .build()
}

/// Check the response status and return the body bytes.
async fn read_audio_body(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<Vec<u8>, SynthesisError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SynthesisError::Status {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(SynthesisError::EmptyAudio(provider));
    }
    Ok(bytes.to_vec())
}

/// Hex SHA-256 of a turn's text.
pub fn text_hash(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
