//! Conversation history storage
//!
//! Stores the ordered sequence of chat turns for one session and renders
//! the recency-truncated window used in prompts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Number of most-recent turns every classifier and the general-chat
/// handler get to see.
pub const HISTORY_WINDOW: usize = 10;

/// Role of a turn's author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    fn label(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A single turn in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub turn_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
        }
    }
}

/// Ordered, append-only conversation history for one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: VecDeque<ChatTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self {
            turns: VecDeque::new(),
        }
    }

    /// Append one turn.
    pub fn push(&mut self, role: ChatRole, content: impl Into<String>) {
        self.turns.push_back(ChatTurn::new(role, content));
    }

    /// Iterate over all turns, oldest first
    pub fn turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter()
    }

    /// The `count` most recent turns, still oldest first
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ChatTurn> {
        let skip = self.turns.len().saturating_sub(count);
        self.turns.iter().skip(skip)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Render the last `count` turns as the `role: content` block the
    /// prompts embed under their `History:` header.
    pub fn prompt_block(&self, count: usize) -> String {
        self.recent(count)
            .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
