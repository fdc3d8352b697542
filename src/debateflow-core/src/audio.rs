//! Audio clips, stitching and container encoding.

use serde::Deserialize;
use std::io::Cursor;

use crate::error::JudgingError;

/// Mono audio held as normalized f32 samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn silence(seconds: f32, sample_rate: u32) -> Self {
        Self::new(vec![0.0; seconds_to_samples(seconds, sample_rate)], sample_rate)
    }

    /// Decode mono signed 16-bit little-endian PCM, as returned by the
    /// speech providers.
    pub fn from_pcm16_le(bytes: &[u8], sample_rate: u32) -> Result<Self, JudgingError> {
        if bytes.len() < 2 {
            return Err(JudgingError::Audio("empty PCM payload".to_string()));
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
            .collect();
        Ok(Self::new(samples, sample_rate))
    }

    /// Decode a WAV container (16-bit integer or 32-bit float), downmixing
    /// to mono.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, JudgingError> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
                .collect::<Result<_, _>>()?,
        };

        let channels = spec.channels.max(1) as usize;
        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };
        Ok(Self::new(samples, spec.sample_rate))
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Convert to another sample rate.
    pub fn resampled(self, sample_rate: u32) -> Self {
        if sample_rate == self.sample_rate || self.sample_rate == 0 || sample_rate == 0 {
            return self;
        }
        let ratio = self.sample_rate as f32 / sample_rate as f32;
        Self::new(resample_linear(self.samples, ratio), sample_rate)
    }

    /// Encode as a 16-bit mono WAV file.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, JudgingError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for &sample in &self.samples {
                writer.write_sample(to_i16(sample))?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    /// Raw signed 16-bit little-endian PCM.
    pub fn to_pcm16_le(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|&s| to_i16(s).to_le_bytes())
            .collect()
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn seconds_to_samples(seconds: f32, sample_rate: u32) -> usize {
    (seconds.max(0.0) * sample_rate as f32).round() as usize
}

/// Container the transport wants the stitched asset in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Wav,
    /// Headerless mono s16le, for transports that encode (e.g. to Opus)
    /// themselves.
    Pcm16,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Pcm16 => "pcm",
        }
    }

    pub fn encode(self, clip: &AudioClip) -> Result<Vec<u8>, JudgingError> {
        match self {
            OutputFormat::Wav => clip.to_wav_bytes(),
            OutputFormat::Pcm16 => Ok(clip.to_pcm16_le()),
        }
    }
}

/// Resample using linear interpolation.
/// Ratio > 1.0 shortens the signal, ratio < 1.0 lengthens it.
fn resample_linear(samples: Vec<f32>, ratio: f32) -> Vec<f32> {
    if (ratio - 1.0).abs() < 0.001 {
        return samples;
    }

    let new_len = (samples.len() as f32 / ratio) as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f32 * ratio;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f32;

        if src_idx + 1 < samples.len() {
            result.push(samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac);
        } else if src_idx < samples.len() {
            result.push(samples[src_idx]);
        }
    }

    result
}

/// Join segments with a fixed silence between consecutive segments and none
/// after the last. Segments are converted to `sample_rate` first.
pub fn stitch(segments: Vec<AudioClip>, gap_seconds: f32, sample_rate: u32) -> AudioClip {
    let gap = vec![0.0; seconds_to_samples(gap_seconds, sample_rate)];
    let mut combined = Vec::new();

    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            combined.extend_from_slice(&gap);
        }
        combined.extend(segment.resampled(sample_rate).samples);
    }

    AudioClip::new(combined, sample_rate)
}
