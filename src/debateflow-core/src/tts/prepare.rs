use std::path::PathBuf;
use tracing::{debug, info};

use super::{AudioManifest, Credentials, ProviderChain, SegmentCache, TurnAudio, text_hash};
use crate::audio::{OutputFormat, stitch};
use crate::config::{AudioConfig, Config};
use crate::debate::DebateView;
use crate::error::JudgingError;
use crate::pairing::{VoicePairing, pair};
use crate::persistence::write_atomic;

/// Playable full-debate asset.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedAudio {
    pub debate_id: String,
    pub path: PathBuf,
    pub pairing: VoicePairing,
    pub duration_secs: f64,
    pub format: OutputFormat,
}

/// Turns a debate into one stitched audio file.
pub struct AudioPreparer {
    chain: ProviderChain,
    cache: SegmentCache,
    gap_seconds: f32,
    sample_rate: u32,
    format: OutputFormat,
}

impl AudioPreparer {
    pub fn new(chain: ProviderChain, cache: SegmentCache, audio: &AudioConfig) -> Self {
        Self {
            chain,
            cache,
            gap_seconds: audio.gap_seconds,
            sample_rate: audio.sample_rate,
            format: audio.output_format,
        }
    }

    /// Select providers from `credentials` and cache under the configured
    /// audio directory.
    pub fn from_config(config: &Config, credentials: &Credentials) -> Result<Self, JudgingError> {
        let chain = ProviderChain::from_config(&config.providers, credentials)?;
        let cache = SegmentCache::new(&config.paths.audio_dir);
        Ok(Self::new(chain, cache, &config.audio))
    }

    pub fn cache(&self) -> &SegmentCache {
        &self.cache
    }

    /// The stitched asset from an earlier [`AudioPreparer::prepare`], if any.
    pub fn stitched_path(&self, debate_id: &str) -> Option<PathBuf> {
        let path = self.cache.full_path(debate_id, self.format);
        path.is_file().then_some(path)
    }

    /// Voice pairing for a debate over the active pool.
    pub fn pairing_for(&self, debate_id: &str) -> Result<VoicePairing, JudgingError> {
        pair(debate_id, self.chain.pool_size()).ok_or_else(|| {
            JudgingError::ConfigError("voice pool needs at least two voices".to_string())
        })
    }

    /// Synthesize (or load from cache) all four turns and stitch them.
    ///
    /// Either every turn is available and the stitched file is written, or
    /// an error is returned and no stitched file is produced.
    pub async fn prepare(&self, debate: &DebateView) -> Result<PreparedAudio, JudgingError> {
        let debate_id = debate.id();
        let mut manifest = match self.cache.load_manifest(debate_id)? {
            Some(existing) => existing,
            None => AudioManifest::new(debate_id, self.pairing_for(debate_id)?),
        };
        let pairing = manifest.pairing;

        let mut clips = Vec::with_capacity(debate.turns().len());
        for turn in debate.turns() {
            let (index, side) = (turn.position(), turn.side());

            if let Some(clip) = self.cache.get(debate_id, index, side)? {
                clips.push(clip);
                continue;
            }

            let synthesized = self.chain.synthesize(turn.text(), pairing, side).await?;
            self.cache.put(debate_id, index, side, &synthesized.clip)?;
            manifest.upsert(TurnAudio {
                turn_index: index,
                side,
                provider: synthesized.provider.as_str().to_string(),
                model: synthesized.model,
                voice_id: synthesized.voice.id,
                voice_name: synthesized.voice.name,
                text_sha256: text_hash(turn.text()),
            });
            self.cache.store_manifest(&manifest)?;
            debug!(debate_id, turn = index, side = %side, "Synthesized turn");

            clips.push(synthesized.clip);
        }

        let full = stitch(clips, self.gap_seconds, self.sample_rate);
        let bytes = self.format.encode(&full)?;
        let path = self.cache.full_path(debate_id, self.format);
        write_atomic(&path, &bytes)?;

        info!(
            debate_id,
            path = %path.display(),
            duration_secs = full.duration_secs(),
            "Prepared debate audio"
        );

        Ok(PreparedAudio {
            debate_id: debate_id.to_string(),
            path,
            pairing,
            duration_secs: full.duration_secs(),
            format: self.format,
        })
    }
}
