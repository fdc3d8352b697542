//! Annotation records and the identifiers they are keyed by.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::debate::Side;
use crate::error::JudgingError;

pub const ANNOTATION_VERSION: &str = "0.1.0";

/// Rubric dimension, in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Clash,
    Burden,
    Rebuttal,
    Extension,
    Adaptation,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Clash,
        Dimension::Burden,
        Dimension::Rebuttal,
        Dimension::Extension,
        Dimension::Adaptation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Clash => "clash",
            Dimension::Burden => "burden",
            Dimension::Rebuttal => "rebuttal",
            Dimension::Extension => "extension",
            Dimension::Adaptation => "adaptation",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Dimension::Clash => "Clash Engagement",
            Dimension::Burden => "Burden Fulfillment",
            Dimension::Rebuttal => "Rebuttal Quality",
            Dimension::Extension => "Argument Extension",
            Dimension::Adaptation => "Strategic Adaptation",
        }
    }

    pub fn short_label(self) -> &'static str {
        match self {
            Dimension::Clash => "Clash",
            Dimension::Burden => "Burden",
            Dimension::Rebuttal => "Rebuttal",
            Dimension::Extension => "Extension",
            Dimension::Adaptation => "Adaptation",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = JudgingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clash" | "clash_engagement" => Ok(Dimension::Clash),
            "burden" | "burden_of_proof" | "burden_fulfillment" => Ok(Dimension::Burden),
            "rebuttal" | "rebuttal_quality" => Ok(Dimension::Rebuttal),
            "extension" | "argument_extension" => Ok(Dimension::Extension),
            "adaptation" | "strategic_adaptation" => Ok(Dimension::Adaptation),
            other => Err(JudgingError::InvalidSlot(format!("unknown dimension '{other}'"))),
        }
    }
}

/// One (dimension, side) pair requiring a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub dimension: Dimension,
    pub side: Side,
}

impl Slot {
    pub const COUNT: usize = 10;

    pub fn new(dimension: Dimension, side: Side) -> Self {
        Self { dimension, side }
    }

    /// All ten slots in presentation order: each dimension's affirmative
    /// prompt immediately followed by its negative prompt.
    pub fn presentation_order() -> impl Iterator<Item = Slot> {
        Dimension::ALL
            .into_iter()
            .flat_map(|d| Side::ALL.into_iter().map(move |s| Slot::new(d, s)))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dimension, self.side)
    }
}

/// A 3-point Likert score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Score(u8);

impl Score {
    pub fn new(value: i64) -> Result<Self, JudgingError> {
        match value {
            1..=3 => Ok(Score(value as u8)),
            other => Err(JudgingError::InvalidValue(other)),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "Weak",
            2 => "OK",
            _ => "Strong",
        }
    }
}

impl TryFrom<i64> for Score {
    type Error = JudgingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Score::new(value)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

static ANNOTATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]{1,20}$").expect("annotator pattern compiles"));

/// Validated annotator pseudonym. Embedded in `{debate}_{annotator}` file
/// names, so restricted to letters, digits and '-'.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnnotatorId(String);

impl AnnotatorId {
    pub fn new(name: impl Into<String>) -> Result<Self, JudgingError> {
        let name = name.into();
        let trimmed = name.trim();
        if ANNOTATOR_RE.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(JudgingError::InvalidAnnotator(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnnotatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AnnotatorId {
    type Error = JudgingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AnnotatorId::new(value)
    }
}

impl From<AnnotatorId> for String {
    fn from(id: AnnotatorId) -> Self {
        id.0
    }
}

/// Affirmative and negative score for one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideScores {
    pub aff: Score,
    pub neg: Score,
}

impl SideScores {
    pub fn get(&self, side: Side) -> Score {
        match side {
            Side::Aff => self.aff,
            Side::Neg => self.neg,
        }
    }
}

/// How the annotation was collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Provenance {
    /// Whether the annotator was given the synthesized audio.
    pub audio_used: bool,
}

/// Completed human judgment of one debate. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub debate_id: String,
    pub annotator_id: AnnotatorId,
    pub timestamp: DateTime<Utc>,
    pub winner: Side,
    pub justification: Option<String>,
    pub scores: BTreeMap<Dimension, SideScores>,
    pub provenance: Provenance,
    pub annotation_version: String,
}

impl Annotation {
    pub fn score(&self, slot: Slot) -> Option<Score> {
        self.scores.get(&slot.dimension).map(|s| s.get(slot.side))
    }

    /// Multi-line summary of the scores and winner.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .scores
            .iter()
            .map(|(dim, s)| {
                format!(
                    "  {:12}  AFF {} · NEG {}",
                    dim.short_label(),
                    s.aff.label(),
                    s.neg.label()
                )
            })
            .collect();
        let winner = match self.winner {
            Side::Aff => "Affirmative",
            Side::Neg => "Negative",
        };
        lines.push(format!("  Winner: {winner}"));
        lines.join("\n")
    }
}
