//! Structured extraction from model output
//!
//! Task fields and email drafts come back from the model as one-line JSON
//! objects. Parsing is tolerant of code fences and missing fields but
//! returns `None` on anything that is not a JSON object, leaving the
//! caller to produce its handled failure message.

use crate::classifier::strip_code_fences;
use crate::llm::TextGenerator;
use crate::models::{EmailDraft, ExtractedTask};
use crate::Result;

const TASK_EXTRACT_INSTRUCTION: &str = r#"You extract one task from the user's message.
Fields:
- task: short imperative description of what must be done (no dates or times in it).
- date: explicit calendar date as YYYY-MM-DD, or "" if none can be resolved.
- time: clock time as HH:MM (24-hour), or "" if none can be resolved.

Return ONLY valid JSON on one line, exactly:
{"task":"...","date":"YYYY-MM-DD","time":"HH:MM"}"#;

const EMAIL_DRAFT_INSTRUCTION: &str = r#"You generate a complete email draft.
If no recipient is specified, put a reasonable placeholder like someone@example.com and greet with 'Hi'.
Return ONLY JSON on one line:
{"to":"someone@example.com","subject":"...","body":"..."}"#;

/// Parse the task-extraction response. `None` when the payload is not a
/// JSON object; an object with missing fields yields empty strings.
pub fn parse_task_fields(raw: &str) -> Option<ExtractedTask> {
    let mut extracted: ExtractedTask = serde_json::from_str(strip_code_fences(raw)).ok()?;
    extracted.task = extracted.task.trim().to_string();
    extracted.date = extracted.date.trim().to_string();
    extracted.time = extracted.time.trim().to_string();
    Some(extracted)
}

/// Parse the email-draft response. Same tolerance as task parsing.
pub fn parse_email_draft(raw: &str) -> Option<EmailDraft> {
    let mut draft: EmailDraft = serde_json::from_str(strip_code_fences(raw)).ok()?;
    draft.to = draft.to.trim().to_string();
    draft.subject = draft.subject.trim().to_string();
    Some(draft)
}

/// Ask the model for task fields from the utterance.
pub async fn extract_task(
    llm: &dyn TextGenerator,
    history_block: &str,
    utterance: &str,
) -> Result<String> {
    let prompt = format!("History:\n{}\n\nUser: {}", history_block, utterance);
    llm.generate(TASK_EXTRACT_INSTRUCTION, &prompt, 0.0).await
}

/// Ask the model for a full email draft from the utterance.
pub async fn extract_email_draft(
    llm: &dyn TextGenerator,
    history_block: &str,
    utterance: &str,
) -> Result<String> {
    let prompt = format!("History:\n{}\n\nUser request:\n{}", history_block, utterance);
    llm.generate(EMAIL_DRAFT_INSTRUCTION, &prompt, 0.0).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_fields_parse() {
        let raw = r#"{"task":"submit the report","date":"2024-06-11","time":"19:00"}"#;
        let extracted = parse_task_fields(raw).unwrap();
        assert_eq!(extracted.task, "submit the report");
        assert_eq!(extracted.date, "2024-06-11");
        assert_eq!(extracted.time, "19:00");
    }

    #[test]
    fn test_task_fields_missing_keys_default_empty() {
        let extracted = parse_task_fields(r#"{"task":"water the plants"}"#).unwrap();
        assert_eq!(extracted.task, "water the plants");
        assert_eq!(extracted.date, "");
        assert_eq!(extracted.time, "");
    }

    #[test]
    fn test_task_fields_malformed_is_none() {
        assert!(parse_task_fields("I added it for you!").is_none());
        assert!(parse_task_fields("").is_none());
    }

    #[test]
    fn test_task_fields_fenced_json() {
        let raw = "```json\n{\"task\":\"call Brian\",\"date\":\"\",\"time\":\"16:00\"}\n```";
        let extracted = parse_task_fields(raw).unwrap();
        assert_eq!(extracted.task, "call Brian");
        assert_eq!(extracted.time, "16:00");
    }

    #[test]
    fn test_email_draft_parses() {
        let raw = r#"{"to":"brian@corp.test","subject":"Meeting","body":"Hi Brian,\n\nSee you there."}"#;
        let draft = parse_email_draft(raw).unwrap();
        assert_eq!(draft.to, "brian@corp.test");
        assert_eq!(draft.subject, "Meeting");
        assert!(draft.body.contains("Hi Brian"));
    }

    #[test]
    fn test_email_draft_malformed_is_none() {
        assert!(parse_email_draft("Sure, here's a draft:").is_none());
    }
}
