//! crates/baby_english_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use crate::domain::{
    AgeLevel, Message, ScoreEvent, Session, SessionSummary, TurnRecord, User, VocabularyCategory,
};
use crate::vocabulary::Vocabulary;
use async_trait::async_trait;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Read-only source of curated word lists.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VocabularyStore: Send + Sync {
    /// Words of `category` for the list whose age range contains `age_level`.
    async fn find_words(
        &self,
        category: VocabularyCategory,
        age_level: AgeLevel,
    ) -> PortResult<Vec<String>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_or_create_user(&self, user_id: Uuid) -> PortResult<User>;

    /// Sets the level unconditionally, including downwards.
    async fn update_age_level(&self, user_id: Uuid, age_level: AgeLevel) -> PortResult<User>;

    /// Stores `age_level` unless the stored level is already higher, and
    /// returns the user as stored afterwards.
    async fn raise_age_level(&self, user_id: Uuid, age_level: AgeLevel) -> PortResult<User>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Session Management ---
    async fn create_session(
        &self,
        user_id: Uuid,
        mission: VocabularyCategory,
    ) -> PortResult<Session>;

    async fn get_session_by_id(&self, session_id: Uuid) -> PortResult<Session>;

    async fn end_session(&self, session_id: Uuid) -> PortResult<Session>;

    /// Sessions of a user, most recently started first.
    async fn list_session_summaries(
        &self,
        user_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> PortResult<Vec<SessionSummary>>;

    async fn count_sessions_for_user(&self, user_id: Uuid) -> PortResult<u32>;

    // --- Transcript ---
    /// Saves both messages and the optional score in a single transaction.
    async fn record_turn(&self, record: TurnRecord) -> PortResult<()>;

    async fn get_messages_for_session(&self, session_id: Uuid) -> PortResult<Vec<Message>>;

    async fn get_scores_for_session(&self, session_id: Uuid) -> PortResult<Vec<ScoreEvent>>;
}

/// The model's answer to one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletion {
    pub reply: String,
    pub total_tokens: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatCompletionService: Send + Sync {
    /// Replies to `message`, instructing the model to stay within `vocabulary`.
    async fn reply(
        &self,
        age_level: AgeLevel,
        vocabulary: &Vocabulary,
        message: &str,
    ) -> PortResult<ChatCompletion>;
}
