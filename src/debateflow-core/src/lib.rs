//! DebateFlow Core Library
//!
//! Human judging of generated debates: the judging session state machine,
//! debate and annotation stores, and the audio pipeline that reads each
//! debate aloud in two voices.

pub mod annotation;
pub mod audio;
pub mod command;
pub mod config;
pub mod debate;
pub mod error;
pub mod judge;
pub mod pairing;
pub mod persistence;
pub mod prompt;
pub mod session;
pub mod store;
pub mod tts;

pub use annotation::{Annotation, AnnotatorId, Dimension, Score, Slot};
pub use command::{Action, Command};
pub use config::Config;
pub use debate::{DebateCategory, DebateView, Side};
pub use error::JudgingError;
pub use judge::{Flow, JudgingService};
pub use prompt::{Button, Prompt, PromptKind};
pub use session::{Event, JudgingSession, SessionState};
pub use tts::{AudioPreparer, Credentials, PreparedAudio};
