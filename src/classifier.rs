//! Decision-point classifiers
//!
//! Each decision in the turn state machine (route, task action, email
//! action) is delegated to a text-generation call constrained to one-line
//! JSON, then collapsed to a guaranteed-valid enum value: any transport
//! failure, malformed response, or out-of-set label becomes the safe
//! default so the turn always completes.

use crate::llm::TextGenerator;
use crate::models::{EmailAction, RouteIntent, TaskAction};
use serde_json::Value;
use tracing::{debug, warn};

const ROUTER_INSTRUCTION: &str = r#"You are a strict router. Decide the next node for the user's latest message.
Choices:
- TASK_HANDLING: adding/listing/summarizing tasks, deadlines, schedules, reminders.
- EMAIL_HANDLING: drafting or sending emails.
- GENERAL_CHAT: everything else.

Return ONLY valid JSON on one line, exactly:
{"route":"TASK_HANDLING"|"EMAIL_HANDLING"|"GENERAL_CHAT"}"#;

const TASK_DECIDER_INSTRUCTION: &str = r#"You decide which ONE tool to use for task handling.
Options:
- EXTRACT_AND_ADD: if the user is describing a new task to schedule/add.
- SUMMARIZE: if the user asks to summarize, list, or show existing tasks.

Return ONLY valid JSON on one line:
{"task_action":"EXTRACT_AND_ADD"|"SUMMARIZE"}"#;

const EMAIL_DECIDER_INSTRUCTION: &str = r#"You decide which ONE action to take for email handling.
Options:
- DRAFT: if the user wants an email written or revised.
- SEND: if the user confirms that the prepared draft should go out.

Return ONLY valid JSON on one line:
{"action":"DRAFT"|"SEND"}"#;

/// Strip optional markdown code fences so `{"route": ...}` survives a
/// model that insists on wrapping its JSON.
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Pull a string field out of a one-line JSON response.
fn extract_label(raw: &str, key: &str) -> Option<String> {
    let value: Value = serde_json::from_str(strip_code_fences(raw)).ok()?;
    value.get(key)?.as_str().map(str::to_string)
}

fn prompt_for(history_block: &str, utterance: &str) -> String {
    format!("History:\n{}\n\nUser: {}", history_block, utterance)
}

/// Parse a router response; anything unrecognized collapses to GENERAL_CHAT.
pub fn parse_route_label(raw: &str) -> RouteIntent {
    extract_label(raw, "route")
        .and_then(|label| RouteIntent::from_label(&label))
        .unwrap_or(RouteIntent::GeneralChat)
}

/// Parse a task-decider response; default is EXTRACT_AND_ADD.
pub fn parse_task_action_label(raw: &str) -> TaskAction {
    extract_label(raw, "task_action")
        .and_then(|label| TaskAction::from_label(&label))
        .unwrap_or(TaskAction::ExtractAndAdd)
}

/// Parse an email-decider response; default is DRAFT.
pub fn parse_email_action_label(raw: &str) -> EmailAction {
    extract_label(raw, "action")
        .and_then(|label| EmailAction::from_label(&label))
        .unwrap_or(EmailAction::Draft)
}

/// Routes an utterance to task handling, email handling, or general chat
pub struct IntentRouter;

impl IntentRouter {
    pub async fn classify(
        llm: &dyn TextGenerator,
        history_block: &str,
        utterance: &str,
    ) -> RouteIntent {
        let prompt = prompt_for(history_block, utterance);

        match llm.generate(ROUTER_INSTRUCTION, &prompt, 0.0).await {
            Ok(raw) => {
                let route = parse_route_label(&raw);
                debug!(?route, "Router classified utterance");
                route
            }
            Err(e) => {
                warn!("Router call failed, falling back to general chat: {}", e);
                RouteIntent::GeneralChat
            }
        }
    }
}

/// Chooses between extracting a new task and summarizing existing ones
pub struct TaskActionClassifier;

impl TaskActionClassifier {
    pub async fn classify(
        llm: &dyn TextGenerator,
        history_block: &str,
        utterance: &str,
    ) -> TaskAction {
        let prompt = prompt_for(history_block, utterance);

        match llm.generate(TASK_DECIDER_INSTRUCTION, &prompt, 0.0).await {
            Ok(raw) => {
                let action = parse_task_action_label(&raw);
                debug!(?action, "Task decider classified utterance");
                action
            }
            Err(e) => {
                warn!("Task decider call failed, defaulting to extract-and-add: {}", e);
                TaskAction::ExtractAndAdd
            }
        }
    }
}

/// Chooses between drafting a new email and sending the pending draft
pub struct EmailActionClassifier;

impl EmailActionClassifier {
    pub async fn classify(
        llm: &dyn TextGenerator,
        history_block: &str,
        utterance: &str,
    ) -> EmailAction {
        let prompt = prompt_for(history_block, utterance);

        match llm.generate(EMAIL_DECIDER_INSTRUCTION, &prompt, 0.0).await {
            Ok(raw) => {
                let action = parse_email_action_label(&raw);
                debug!(?action, "Email decider classified utterance");
                action
            }
            Err(e) => {
                warn!("Email decider call failed, defaulting to draft: {}", e);
                EmailAction::Draft
            }
        }
    }
}
