//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use baby_english_core::ports::{DatabaseService, UserStore};
use baby_english_core::turn::ChatTurn;
use baby_english_core::vocabulary::VocabularyResolver;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub users: Arc<dyn UserStore>,
    pub vocabulary: Arc<VocabularyResolver>,
    /// Owns the per-session progression trackers.
    pub chat_turn: Arc<ChatTurn>,
}
