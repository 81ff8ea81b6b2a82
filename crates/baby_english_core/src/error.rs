//! crates/baby_english_core/src/error.rs
//!
//! Errors surfaced by the core to its callers.

use crate::ports::PortError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Age level {0} is outside the supported range 0-18")]
    InvalidAgeLevel(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Raised only in strict mode, when a message uses words outside the
    /// learner's vocabulary.
    #[error(
        "Message contains words that are not allowed for this age level: {}",
        rejected.join(", ")
    )]
    ForbiddenVocabulary { rejected: Vec<String> },

    #[error("Session {0} has already ended")]
    SessionEnded(Uuid),

    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),
}

pub type CoreResult<T> = Result<T, CoreError>;
