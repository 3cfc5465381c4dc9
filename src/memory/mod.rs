//! Conversation memory
//!
//! Per-session, append-only chat history consulted in a recency-truncated
//! window by the classifiers and by free-form response generation.

pub mod store;

pub use store::{ChatRole, ChatTurn, ConversationHistory, HISTORY_WINDOW};
