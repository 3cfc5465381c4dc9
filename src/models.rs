//! Core data models for the task agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder recipient the draft prompt falls back to when the user
/// names nobody. A send against this address is always rejected.
pub const PLACEHOLDER_RECIPIENT: &str = "someone@example.com";

//
// ================= Routing =================
//

/// Top-level intent assigned to one utterance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteIntent {
    TaskHandling,
    EmailHandling,
    GeneralChat,
}

impl RouteIntent {
    /// Parse a wire label; `None` for anything outside the recognized set.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "TASK_HANDLING" => Some(Self::TaskHandling),
            "EMAIL_HANDLING" => Some(Self::EmailHandling),
            "GENERAL_CHAT" => Some(Self::GeneralChat),
            _ => None,
        }
    }
}

/// Action chosen inside the task-handling branch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskAction {
    ExtractAndAdd,
    Summarize,
}

impl TaskAction {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "EXTRACT_AND_ADD" => Some(Self::ExtractAndAdd),
            "SUMMARIZE" => Some(Self::Summarize),
            _ => None,
        }
    }
}

/// Action chosen inside the email-handling branch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailAction {
    Draft,
    Send,
}

impl EmailAction {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "DRAFT" => Some(Self::Draft),
            "SEND" => Some(Self::Send),
            _ => None,
        }
    }
}

//
// ================= Tasks =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
        };
        write!(f, "{}", s)
    }
}

/// One stored task. Ids are process-lifetime monotonic and never reused;
/// records are appended, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: u64,
    pub description: String,
    /// Canonical absolute timestamp, `YYYY-MM-DD HH:MM:SS`.
    pub date_full: String,
    /// Time of day of the same instant, `HH:MM:SS`.
    pub time_only: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields the task extractor pulls out of an utterance. All default to
/// empty so a partial JSON object still deserializes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedTask {
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
}

//
// ================= Email =================
//

/// A drafted email, carried across turn boundaries so a later "send"
/// can reuse the fields without the user repeating them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailDraft {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}
