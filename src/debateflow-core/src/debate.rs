//! Debate data model as seen by annotation code.
//!
//! A [`DebateView`] is the only debate type that leaves the [`crate::store`]
//! module. It carries the resolution, category and the four turns, and has
//! no field for the hidden evaluation-control block.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::JudgingError;

/// Number of speeches in every debate.
pub const TURN_COUNT: usize = 4;

/// Debate side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Arguing in favor of the resolution.
    Aff,
    /// Arguing against the resolution.
    Neg,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Aff, Side::Neg];

    /// Wire name, as used in annotation records and callback data.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Aff => "aff",
            Side::Neg => "neg",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Side::Aff => "AFFIRMATIVE",
            Side::Neg => "NEGATIVE",
        }
    }

    pub fn short_label(self) -> &'static str {
        match self {
            Side::Aff => "AFF",
            Side::Neg => "NEG",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = JudgingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aff" | "affirmative" => Ok(Side::Aff),
            "neg" | "negative" => Ok(Side::Neg),
            other => Err(JudgingError::InvalidSlot(format!("unknown side '{other}'"))),
        }
    }
}

/// Role of a speech, fixed by its position in the debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Opening,
    Response,
    Rebuttal,
    Closing,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::Opening => "opening",
            TurnRole::Response => "response",
            TurnRole::Rebuttal => "rebuttal",
            TurnRole::Closing => "closing",
        }
    }
}

/// Side speaking at `position` (0,2 affirmative; 1,3 negative).
pub fn side_at(position: usize) -> Side {
    if position % 2 == 0 { Side::Aff } else { Side::Neg }
}

/// Role of the speech at `position`.
pub fn role_at(position: usize) -> Option<TurnRole> {
    match position {
        0 => Some(TurnRole::Opening),
        1 => Some(TurnRole::Response),
        2 => Some(TurnRole::Rebuttal),
        3 => Some(TurnRole::Closing),
        _ => None,
    }
}

/// Resolution topic category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebateCategory {
    Policy,
    Values,
    Empirical,
}

impl DebateCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            DebateCategory::Policy => "policy",
            DebateCategory::Values => "values",
            DebateCategory::Empirical => "empirical",
        }
    }
}

/// One speech. Side and role are derived from the position and cannot be
/// set independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    position: usize,
    text: String,
}

impl Turn {
    pub(crate) fn new(position: usize, text: String) -> Self {
        Self { position, text }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn side(&self) -> Side {
        side_at(self.position)
    }

    pub fn role(&self) -> TurnRole {
        // Turns are only built for positions 0..TURN_COUNT.
        role_at(self.position).unwrap_or(TurnRole::Closing)
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Annotation-facing projection of a debate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebateView {
    id: String,
    resolution: String,
    category: DebateCategory,
    turns: Vec<Turn>,
}

impl DebateView {
    pub(crate) fn new(
        id: String,
        resolution: String,
        category: DebateCategory,
        turns: Vec<Turn>,
    ) -> Self {
        Self {
            id,
            resolution,
            category,
            turns,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resolution(&self) -> &str {
        &self.resolution
    }

    pub fn category(&self) -> DebateCategory {
        self.category
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Plain-text transcript for text-only judging.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{} ({}):\n{}", t.side().short_label(), t.role().as_str(), t.text()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
