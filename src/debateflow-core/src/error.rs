//! Error types for the judging system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JudgingError {
    #[error("No debates remaining for annotator '{annotator}'")]
    NoDebatesRemaining { annotator: String },

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Invalid score value {0}: expected 1, 2 or 3")]
    InvalidValue(i64),

    #[error("Cannot {action} while session is {state}")]
    InvalidState { state: String, action: String },

    #[error("Event for debate '{got}' but session is judging '{expected}'")]
    WrongDebate { expected: String, got: String },

    #[error("Speech synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    #[error("No speech provider configured: set {primary_env} or {secondary_env}")]
    NoProviderConfigured {
        primary_env: String,
        secondary_env: String,
    },

    #[error("Failed to persist annotation {key}: {reason}")]
    PersistenceError { key: String, reason: String },

    #[error("Annotation {key} is already stored with different content")]
    AnnotationConflict { key: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Malformed debate '{id}': {reason}")]
    MalformedDebate { id: String, reason: String },

    #[error("Debate not found: {0}")]
    DebateNotFound(String),

    #[error("Invalid annotator name '{0}': use 1-20 letters, digits or '-'")]
    InvalidAnnotator(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JudgingError {
    /// Whether the same call may succeed if simply repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JudgingError::PersistenceError { .. } | JudgingError::SynthesisUnavailable(_)
        )
    }

    pub(crate) fn invalid_state(state: impl ToString, action: impl Into<String>) -> Self {
        JudgingError::InvalidState {
            state: state.to_string(),
            action: action.into(),
        }
    }
}

impl From<hound::Error> for JudgingError {
    fn from(e: hound::Error) -> Self {
        JudgingError::Audio(e.to_string())
    }
}
