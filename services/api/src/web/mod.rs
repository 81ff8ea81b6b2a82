pub mod protocol;
pub mod rest;
pub mod state;

// Re-export the handlers so the binary can build the router in one place.
pub use rest::{
    chat_handler, create_session_handler, end_session_handler, export_session_handler,
    get_user_handler, list_missions_handler, list_sessions_handler, update_user_handler,
};
