//! What a transport should show after each transition.
//!
//! Prompts are built from the session's [`DebateView`] only.

use crate::annotation::{Dimension, Score, Slot};
use crate::command::{Action, Command};
use crate::debate::{DebateCategory, DebateView, Side};
use crate::session::{JudgingSession, SessionState};

/// A tappable option and the callback data it sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    fn new(label: impl Into<String>, command: Command) -> Self {
        Self {
            label: label.into(),
            data: command.to_string(),
        }
    }
}

/// The input a prompt is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Preparing,
    Listen,
    Score(Slot),
    Winner,
    Justification,
    Done,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub kind: PromptKind,
    pub text: String,
    pub buttons: Vec<Button>,
    /// Whether free text is accepted as an answer.
    pub accepts_text: bool,
}

impl Prompt {
    pub fn for_session(session: &JudgingSession) -> Self {
        let debate = session.debate();
        let id = debate.id();

        match session.state() {
            SessionState::SelectingDebate => Prompt {
                kind: PromptKind::Preparing,
                text: format!("Loading debate #{id}..."),
                buttons: Vec::new(),
                accepts_text: false,
            },
            SessionState::AudioPending => Prompt {
                kind: PromptKind::Listen,
                text: format!(
                    "Debate #{id}\n\nResolution: \"{}\"\n\n\
                     Listen to the full debate, then tap below to start scoring.",
                    debate.resolution()
                ),
                buttons: vec![action_button("Score This Debate", id, Action::Ready)],
                accepts_text: false,
            },
            SessionState::Scoring(slot) => Prompt {
                kind: PromptKind::Score(slot),
                text: format!(
                    "({}/{}) Score {} - {}:\n{}\n\nRate the {}",
                    session.scored_count() + 1,
                    Slot::COUNT,
                    slot.dimension.title(),
                    slot.side.short_label(),
                    question(slot, debate),
                    slot.side.display_name()
                ),
                buttons: score_buttons(id, slot),
                accepts_text: false,
            },
            SessionState::AwaitingWinner => Prompt {
                kind: PromptKind::Winner,
                text: "Who won this debate?".to_string(),
                buttons: Side::ALL
                    .into_iter()
                    .map(|side| {
                        Button::new(
                            side_title(side),
                            Command::Winner {
                                debate_id: id.to_string(),
                                side,
                            },
                        )
                    })
                    .collect(),
                accepts_text: false,
            },
            SessionState::AwaitingJustification => Prompt {
                kind: PromptKind::Justification,
                text: "Brief justification? (Reply with text, or tap Skip)".to_string(),
                buttons: vec![action_button("Skip", id, Action::Skip)],
                accepts_text: true,
            },
            SessionState::Complete => {
                let summary = session
                    .annotation()
                    .map(|a| a.summary())
                    .unwrap_or_default();
                Prompt {
                    kind: PromptKind::Done,
                    text: format!("Debate #{id} annotated!\n\n{summary}"),
                    buttons: vec![
                        action_button("Next Debate", id, Action::Next),
                        action_button("Done for Now", id, Action::Done),
                    ],
                    accepts_text: false,
                }
            }
            SessionState::Abandoned => Prompt {
                kind: PromptKind::Abandoned,
                text: format!("Debate #{id} cancelled. Nothing was saved."),
                buttons: Vec::new(),
                accepts_text: false,
            },
        }
    }
}

fn action_button(label: &str, debate_id: &str, action: Action) -> Button {
    Button::new(
        label,
        Command::Action {
            debate_id: debate_id.to_string(),
            action,
        },
    )
}

fn score_buttons(debate_id: &str, slot: Slot) -> Vec<Button> {
    (1..=3)
        .filter_map(|value| Score::new(value).ok())
        .map(|score| {
            Button::new(
                format!("{} ({})", score.label(), score.value()),
                Command::Score {
                    debate_id: debate_id.to_string(),
                    dimension: slot.dimension,
                    side: slot.side,
                    value: i64::from(score.value()),
                },
            )
        })
        .collect()
}

fn side_title(side: Side) -> &'static str {
    match side {
        Side::Aff => "Affirmative",
        Side::Neg => "Negative",
    }
}

/// Rubric question for a slot. Burden wording depends on the category.
fn question(slot: Slot, debate: &DebateView) -> String {
    let side = match slot.side {
        Side::Aff => "the affirmative",
        Side::Neg => "the negative",
    };
    match slot.dimension {
        Dimension::Clash => {
            format!("Did {side} engage directly with the opponent's arguments?")
        }
        Dimension::Burden => match debate.category() {
            DebateCategory::Policy => format!(
                "Did {side} show whether the proposed policy is needed and would work?"
            ),
            DebateCategory::Values => format!(
                "Did {side} show why the value it defends should outweigh the competing one?"
            ),
            DebateCategory::Empirical => format!(
                "Did {side} support its factual claim with enough evidence to carry its burden?"
            ),
        },
        Dimension::Rebuttal => {
            format!("How well did {side} answer the opponent's strongest points?")
        }
        Dimension::Extension => {
            format!("Did {side} develop its arguments across speeches instead of repeating them?")
        }
        Dimension::Adaptation => {
            format!("Did {side} adjust its strategy as the debate unfolded?")
        }
    }
}
