//! Judging session state machine.
//!
//! A [`JudgingSession`] is one annotator's working state for one debate.
//! Transitions are pure: [`JudgingSession::transition`] maps the current
//! session and an [`Event`] to the next session plus the [`Effect`]s a
//! caller must carry out. Nothing in this module touches the filesystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use tracing::{debug, info};

use crate::annotation::{
    ANNOTATION_VERSION, Annotation, AnnotatorId, Dimension, Provenance, Score, SideScores, Slot,
};
use crate::debate::{DebateView, Side};
use crate::error::JudgingError;
use crate::prompt::Prompt;

/// Where a session is in the scoring flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "slot", rename_all = "snake_case")]
pub enum SessionState {
    SelectingDebate,
    AudioPending,
    /// Waiting for the score of this slot.
    Scoring(Slot),
    AwaitingWinner,
    AwaitingJustification,
    Complete,
    Abandoned,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Abandoned)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::SelectingDebate => write!(f, "selecting_debate"),
            SessionState::AudioPending => write!(f, "audio_pending"),
            SessionState::Scoring(slot) => write!(f, "scoring {slot}"),
            SessionState::AwaitingWinner => write!(f, "awaiting_winner"),
            SessionState::AwaitingJustification => write!(f, "awaiting_justification"),
            SessionState::Complete => write!(f, "complete"),
            SessionState::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Input delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The debate has been chosen and loaded.
    DebateSelected,
    /// Audio for all four turns is ready and was delivered.
    AudioReady,
    /// Proceed text-only, without audio.
    SkipAudio,
    Score {
        dimension: Dimension,
        side: Side,
        value: i64,
    },
    Winner(Side),
    /// Free-text justification. `None` or blank text skips it.
    Justification(Option<String>),
    Cancel,
}

impl Event {
    fn action(&self) -> String {
        match self {
            Event::DebateSelected => "select a debate".to_string(),
            Event::AudioReady => "start scoring".to_string(),
            Event::SkipAudio => "skip audio".to_string(),
            Event::Score {
                dimension, side, ..
            } => format!("score {}", Slot::new(*dimension, *side)),
            Event::Winner(_) => "record the winner".to_string(),
            Event::Justification(_) => "record a justification".to_string(),
            Event::Cancel => "cancel".to_string(),
        }
    }
}

/// Side effect requested by a transition, executed by the caller in order.
/// If one fails, the remaining effects must not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Journal the session so it can be resumed.
    Checkpoint(SessionSnapshot),
    /// Write the completed annotation.
    Persist(Annotation),
    /// Remove the annotator's journal entry.
    ClearCheckpoint(AnnotatorId),
}

/// One recorded score in a [`SessionSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotScore {
    pub dimension: Dimension,
    pub side: Side,
    pub score: Score,
}

/// Durable form of a session, keyed by annotator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub annotator_id: AnnotatorId,
    pub debate_id: String,
    pub state: SessionState,
    pub scores: Vec<SlotScore>,
    pub winner: Option<Side>,
    pub justification: Option<String>,
    pub audio_used: bool,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub queue: Vec<String>,
}

/// Working state of one annotator judging one debate.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgingSession {
    debate: DebateView,
    annotator: AnnotatorId,
    state: SessionState,
    scores: HashMap<Slot, Score>,
    winner: Option<Side>,
    justification: Option<String>,
    audio_used: bool,
    completed_at: Option<DateTime<Utc>>,
    queue: VecDeque<String>,
}

impl JudgingSession {
    /// Fresh session in [`SessionState::SelectingDebate`].
    pub fn new(debate: DebateView, annotator: AnnotatorId, queue: VecDeque<String>) -> Self {
        Self {
            debate,
            annotator,
            state: SessionState::SelectingDebate,
            scores: HashMap::new(),
            winner: None,
            justification: None,
            audio_used: false,
            completed_at: None,
            queue,
        }
    }

    /// Rebuild a journaled session. Fails if the snapshot belongs to another
    /// debate or its recorded state does not agree with its recorded inputs.
    pub fn from_snapshot(
        snapshot: SessionSnapshot,
        debate: DebateView,
    ) -> Result<Self, JudgingError> {
        if snapshot.debate_id != debate.id() {
            return Err(JudgingError::WrongDebate {
                expected: debate.id().to_string(),
                got: snapshot.debate_id,
            });
        }

        let mut scores = HashMap::new();
        for entry in &snapshot.scores {
            let slot = Slot::new(entry.dimension, entry.side);
            if scores.insert(slot, entry.score).is_some() {
                return Err(JudgingError::invalid_state(
                    snapshot.state,
                    format!("restore duplicate score for {slot}"),
                ));
            }
        }

        let session = Self {
            debate,
            annotator: snapshot.annotator_id,
            state: snapshot.state,
            scores,
            winner: snapshot.winner,
            justification: snapshot.justification,
            audio_used: snapshot.audio_used,
            completed_at: snapshot.completed_at,
            queue: snapshot.queue.into(),
        };

        if !session.is_consistent() {
            return Err(JudgingError::invalid_state(session.state, "restore session"));
        }
        Ok(session)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let scores = Slot::presentation_order()
            .filter_map(|slot| {
                self.scores.get(&slot).map(|score| SlotScore {
                    dimension: slot.dimension,
                    side: slot.side,
                    score: *score,
                })
            })
            .collect();

        SessionSnapshot {
            annotator_id: self.annotator.clone(),
            debate_id: self.debate.id().to_string(),
            state: self.state,
            scores,
            winner: self.winner,
            justification: self.justification.clone(),
            audio_used: self.audio_used,
            completed_at: self.completed_at,
            queue: self.queue.iter().cloned().collect(),
        }
    }

    pub fn debate(&self) -> &DebateView {
        &self.debate
    }

    pub fn annotator(&self) -> &AnnotatorId {
        &self.annotator
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn score(&self, slot: Slot) -> Option<Score> {
        self.scores.get(&slot).copied()
    }

    pub fn scored_count(&self) -> usize {
        self.scores.len()
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn justification(&self) -> Option<&str> {
        self.justification.as_deref()
    }

    pub fn audio_used(&self) -> bool {
        self.audio_used
    }

    /// Debate ids still pending in this batch.
    pub fn queue(&self) -> &VecDeque<String> {
        &self.queue
    }

    pub fn into_queue(self) -> VecDeque<String> {
        self.queue
    }

    /// Next unset slot in presentation order.
    pub fn cursor(&self) -> Option<Slot> {
        Slot::presentation_order().find(|slot| !self.scores.contains_key(slot))
    }

    /// What the transport should ask for next.
    pub fn prompt(&self) -> Prompt {
        Prompt::for_session(self)
    }

    /// The finished record. `None` unless the session is complete.
    pub fn annotation(&self) -> Option<Annotation> {
        if self.state != SessionState::Complete {
            return None;
        }

        let mut scores = BTreeMap::new();
        for dimension in Dimension::ALL {
            let aff = self.score(Slot::new(dimension, Side::Aff))?;
            let neg = self.score(Slot::new(dimension, Side::Neg))?;
            scores.insert(dimension, SideScores { aff, neg });
        }

        Some(Annotation {
            debate_id: self.debate.id().to_string(),
            annotator_id: self.annotator.clone(),
            timestamp: self.completed_at?,
            winner: self.winner?,
            justification: self.justification.clone(),
            scores,
            provenance: Provenance {
                audio_used: self.audio_used,
            },
            annotation_version: ANNOTATION_VERSION.to_string(),
        })
    }

    /// Compute the session after `event`. `self` is never modified; on
    /// error the caller keeps the current session unchanged.
    pub fn transition(
        &self,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<(Self, Vec<Effect>), JudgingError> {
        let mut next = self.clone();

        match (self.state, event) {
            (state, Event::Cancel) if state.is_terminal() => {
                return Err(JudgingError::invalid_state(state, event.action()));
            }
            (_, Event::Cancel) => {
                next.state = SessionState::Abandoned;
                return Ok((next, vec![Effect::ClearCheckpoint(self.annotator.clone())]));
            }
            (SessionState::SelectingDebate, Event::DebateSelected) => {
                next.state = SessionState::AudioPending;
            }
            (SessionState::AudioPending, Event::AudioReady) => {
                next.audio_used = true;
                next.state = next.cursor_state();
            }
            (SessionState::AudioPending, Event::SkipAudio) => {
                next.audio_used = false;
                next.state = next.cursor_state();
            }
            (
                SessionState::Scoring(_),
                Event::Score {
                    dimension,
                    side,
                    value,
                },
            ) => {
                let slot = Slot::new(*dimension, *side);
                if self.scores.contains_key(&slot) {
                    return Err(JudgingError::invalid_state(
                        self.state,
                        format!("re-score {slot}"),
                    ));
                }
                let score = Score::new(*value)?;
                next.scores.insert(slot, score);
                next.state = next.cursor_state();
            }
            (SessionState::AwaitingWinner, Event::Winner(side)) => {
                next.winner = Some(*side);
                next.state = SessionState::AwaitingJustification;
            }
            (SessionState::AwaitingJustification, Event::Justification(text)) => {
                next.justification = text
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string);
                next.completed_at = Some(now);
                next.state = SessionState::Complete;

                let annotation = next
                    .annotation()
                    .ok_or_else(|| JudgingError::invalid_state(self.state, event.action()))?;
                let effects = vec![
                    Effect::Checkpoint(next.snapshot()),
                    Effect::Persist(annotation),
                    Effect::ClearCheckpoint(self.annotator.clone()),
                ];
                return Ok((next, effects));
            }
            (state, event) => {
                return Err(JudgingError::invalid_state(state, event.action()));
            }
        }

        let effects = vec![Effect::Checkpoint(next.snapshot())];
        Ok((next, effects))
    }

    /// Apply `event` in place, returning the effects to execute.
    pub fn apply(&mut self, event: Event, now: DateTime<Utc>) -> Result<Vec<Effect>, JudgingError> {
        let (next, effects) = self.transition(&event, now)?;
        debug!(
            debate_id = self.debate.id(),
            annotator = %self.annotator,
            from = %self.state,
            to = %next.state,
            "Session transition"
        );

        match &event {
            Event::Score {
                dimension,
                side,
                value,
            } => info!(
                debate_id = self.debate.id(),
                slot = %Slot::new(*dimension, *side),
                value,
                "Recorded score"
            ),
            Event::Winner(side) => {
                info!(debate_id = self.debate.id(), winner = %side, "Recorded winner")
            }
            Event::Justification(_) => info!(
                debate_id = self.debate.id(),
                chars = next.justification.as_deref().map_or(0, |t| t.chars().count()),
                "Recorded justification"
            ),
            _ => {}
        }

        *self = next;
        Ok(effects)
    }

    fn cursor_state(&self) -> SessionState {
        match self.cursor() {
            Some(slot) => SessionState::Scoring(slot),
            None => SessionState::AwaitingWinner,
        }
    }

    fn is_consistent(&self) -> bool {
        let all_scored = self.cursor().is_none();
        match self.state {
            SessionState::SelectingDebate | SessionState::AudioPending => {
                self.scores.is_empty() && self.winner.is_none()
            }
            SessionState::Scoring(slot) => self.cursor() == Some(slot) && self.winner.is_none(),
            SessionState::AwaitingWinner => all_scored && self.winner.is_none(),
            SessionState::AwaitingJustification => {
                all_scored && self.winner.is_some() && self.completed_at.is_none()
            }
            SessionState::Complete => {
                all_scored && self.winner.is_some() && self.completed_at.is_some()
            }
            SessionState::Abandoned => false,
        }
    }
}
