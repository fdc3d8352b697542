use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::audio::{AudioClip, OutputFormat};
use crate::debate::Side;
use crate::error::JudgingError;
use crate::pairing::VoicePairing;
use crate::persistence::write_atomic;

/// How one cached turn was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnAudio {
    pub turn_index: usize,
    pub side: Side,
    pub provider: String,
    pub model: String,
    pub voice_id: String,
    pub voice_name: String,
    pub text_sha256: String,
}

/// Pairing and per-turn provenance stored next to a debate's audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioManifest {
    pub debate_id: String,
    pub pairing: VoicePairing,
    pub turns: Vec<TurnAudio>,
}

impl AudioManifest {
    pub fn new(debate_id: impl Into<String>, pairing: VoicePairing) -> Self {
        Self {
            debate_id: debate_id.into(),
            pairing,
            turns: Vec::new(),
        }
    }

    /// Insert or replace the entry for a turn, keeping turn order.
    pub fn upsert(&mut self, turn: TurnAudio) {
        self.turns.retain(|t| t.turn_index != turn.turn_index);
        self.turns.push(turn);
        self.turns.sort_by_key(|t| t.turn_index);
    }
}

/// Disk cache of synthesized turns keyed by (debate, turn index, side).
///
/// Layout under `root`:
/// ```text
/// {debate_id}/{debate_id}_turn_{i}_{side}.wav
/// {debate_id}/manifest.json
/// {debate_id}_full.{ext}
/// ```
#[derive(Debug, Clone)]
pub struct SegmentCache {
    root: PathBuf,
}

impl SegmentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn turn_path(&self, debate_id: &str, turn_index: usize, side: Side) -> PathBuf {
        self.root
            .join(debate_id)
            .join(format!("{debate_id}_turn_{turn_index}_{side}.wav"))
    }

    pub fn manifest_path(&self, debate_id: &str) -> PathBuf {
        self.root.join(debate_id).join("manifest.json")
    }

    pub fn full_path(&self, debate_id: &str, format: OutputFormat) -> PathBuf {
        self.root
            .join(format!("{debate_id}_full.{}", format.extension()))
    }

    pub fn get(
        &self,
        debate_id: &str,
        turn_index: usize,
        side: Side,
    ) -> Result<Option<AudioClip>, JudgingError> {
        let path = self.turn_path(debate_id, turn_index, side);
        if !path.is_file() {
            return Ok(None);
        }
        debug!(path = %path.display(), "Segment cache hit");
        let bytes = fs::read(&path)?;
        Ok(Some(AudioClip::from_wav_bytes(&bytes)?))
    }

    pub fn put(
        &self,
        debate_id: &str,
        turn_index: usize,
        side: Side,
        clip: &AudioClip,
    ) -> Result<(), JudgingError> {
        let bytes = clip.to_wav_bytes()?;
        write_atomic(&self.turn_path(debate_id, turn_index, side), &bytes)?;
        Ok(())
    }

    pub fn load_manifest(&self, debate_id: &str) -> Result<Option<AudioManifest>, JudgingError> {
        let path = self.manifest_path(debate_id);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn store_manifest(&self, manifest: &AudioManifest) -> Result<(), JudgingError> {
        let json = serde_json::to_vec_pretty(manifest)?;
        write_atomic(&self.manifest_path(&manifest.debate_id), &json)?;
        Ok(())
    }
}
