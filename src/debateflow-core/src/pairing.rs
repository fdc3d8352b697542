//! Deterministic assignment of voices to debate sides.
//!
//! The debate id is hashed into the space of unordered pairs drawn from the
//! voice pool. The pairing is kept as pool positions so it can be resolved
//! against any pool of the same size; this is how the affirmative/negative
//! distinction survives a switch to the fallback provider.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A provider voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
}

impl Voice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Ordered pool of voices for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePool {
    voices: Vec<Voice>,
}

impl VoicePool {
    pub fn new(voices: Vec<Voice>) -> Self {
        Self { voices }
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }
}

/// Pool positions assigned to each side. `aff < neg` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoicePairing {
    pub aff_index: usize,
    pub neg_index: usize,
}

impl VoicePairing {
    pub fn index_for(&self, side: crate::debate::Side) -> usize {
        match side {
            crate::debate::Side::Aff => self.aff_index,
            crate::debate::Side::Neg => self.neg_index,
        }
    }

    /// Resolve the pairing against a concrete pool.
    pub fn resolve<'a>(&self, pool: &'a VoicePool) -> Option<(&'a Voice, &'a Voice)> {
        Some((pool.get(self.aff_index)?, pool.get(self.neg_index)?))
    }
}

/// Stable pair index for a debate id.
fn pair_index(debate_id: &str, pair_count: usize) -> usize {
    let digest = Sha256::digest(debate_id.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % pair_count as u64) as usize
}

/// Map a pair index to its (i, j) combination, i < j, in lexicographic order.
fn nth_combination(mut n: usize, k: usize) -> (usize, usize) {
    for i in 0..k {
        let row = k - i - 1;
        if n < row {
            return (i, i + 1 + n);
        }
        n -= row;
    }
    (0, 1)
}

/// Deterministic voice pairing for a pool of `pool_size` voices.
///
/// Returns `None` when the pool cannot supply two distinct voices.
pub fn pair(debate_id: &str, pool_size: usize) -> Option<VoicePairing> {
    if pool_size < 2 {
        return None;
    }
    let pairs = pool_size * (pool_size - 1) / 2;
    let (aff_index, neg_index) = nth_combination(pair_index(debate_id, pairs), pool_size);
    Some(VoicePairing {
        aff_index,
        neg_index,
    })
}
