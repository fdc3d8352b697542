//! Button payloads exchanged with a transport.
//!
//! ```text
//! score:{debate_id}:{dimension}:{side}:{value}
//! winner:{debate_id}:{side}
//! action:{debate_id}:{ready|skip|next|done}
//! ```

use std::fmt;
use std::str::FromStr;

use crate::annotation::Dimension;
use crate::debate::Side;
use crate::error::JudgingError;

/// Non-scoring button actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start scoring.
    Ready,
    /// Skip the justification.
    Skip,
    /// Move on to the next debate.
    Next,
    /// Stop for now.
    Done,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Ready => "ready",
            Action::Skip => "skip",
            Action::Next => "next",
            Action::Done => "done",
        }
    }
}

impl FromStr for Action {
    type Err = JudgingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(Action::Ready),
            "skip" => Ok(Action::Skip),
            "next" => Ok(Action::Next),
            "done" => Ok(Action::Done),
            other => Err(JudgingError::InvalidCommand(format!("unknown action '{other}'"))),
        }
    }
}

/// A decoded button tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Score {
        debate_id: String,
        dimension: Dimension,
        side: Side,
        value: i64,
    },
    Winner {
        debate_id: String,
        side: Side,
    },
    Action {
        debate_id: String,
        action: Action,
    },
}

impl Command {
    /// Decode callback data. Unknown dimensions or sides fail with
    /// [`JudgingError::InvalidSlot`]; anything else malformed with
    /// [`JudgingError::InvalidCommand`].
    pub fn parse(data: &str) -> Result<Self, JudgingError> {
        let parts: Vec<&str> = data.trim().split(':').collect();
        let invalid = || JudgingError::InvalidCommand(data.to_string());

        match parts.as_slice() {
            ["score", debate_id, dimension, side, value] if !debate_id.is_empty() => {
                Ok(Command::Score {
                    debate_id: debate_id.to_string(),
                    dimension: dimension.parse()?,
                    side: side.parse()?,
                    value: value.parse().map_err(|_| invalid())?,
                })
            }
            ["winner", debate_id, side] if !debate_id.is_empty() => Ok(Command::Winner {
                debate_id: debate_id.to_string(),
                side: side.parse()?,
            }),
            ["action", debate_id, action] if !debate_id.is_empty() => Ok(Command::Action {
                debate_id: debate_id.to_string(),
                action: action.parse()?,
            }),
            _ => Err(invalid()),
        }
    }

    pub fn debate_id(&self) -> &str {
        match self {
            Command::Score { debate_id, .. }
            | Command::Winner { debate_id, .. }
            | Command::Action { debate_id, .. } => debate_id,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Score {
                debate_id,
                dimension,
                side,
                value,
            } => write!(f, "score:{debate_id}:{dimension}:{side}:{value}"),
            Command::Winner { debate_id, side } => write!(f, "winner:{debate_id}:{side}"),
            Command::Action { debate_id, action } => {
                write!(f, "action:{debate_id}:{}", action.as_str())
            }
        }
    }
}

impl FromStr for Command {
    type Err = JudgingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}
