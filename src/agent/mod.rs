//! Turn orchestrator - implements the request/response state machine
//!
//! UTTERANCE → ROUTE → DECIDE → HANDLE → RESPOND
//!
//! Every branch produces a response string under all conditions; no error
//! from a delegated call escapes past this module.

use crate::classifier::{EmailActionClassifier, IntentRouter, TaskActionClassifier};
use crate::datetime;
use crate::extract;
use crate::llm::TextGenerator;
use crate::mailer::Mailer;
use crate::memory::{ChatRole, ConversationHistory, HISTORY_WINDOW};
use crate::models::{EmailAction, EmailDraft, RouteIntent, TaskAction, TaskRecord, PLACEHOLDER_RECIPIENT};
use crate::store::TaskStore;
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use tracing::{debug, info, warn};

const GENERAL_CHAT_INSTRUCTION: &str = "You are a concise, helpful assistant.";

/// Per-conversation state: the transcript plus the email draft carried
/// forward so a later "send" can reuse it.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub history: ConversationHistory,
    pub pending_draft: Option<EmailDraft>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// States of one turn. Every handler state transitions to Done with its
/// response; only the router and the two deciders branch.
enum TurnState {
    Router,
    TaskDecider,
    TaskAdd,
    TaskSummarize,
    EmailDecide,
    EmailDraft,
    EmailSend,
    GeneralChat,
    Done(String),
}

/// Orchestrates one utterance through classification and handling
pub struct Orchestrator {
    llm: Box<dyn TextGenerator>,
    mailer: Box<dyn Mailer>,
    store: Arc<TaskStore>,
}

impl Orchestrator {
    pub fn new(llm: Box<dyn TextGenerator>, mailer: Box<dyn Mailer>, store: Arc<TaskStore>) -> Self {
        Self { llm, mailer, store }
    }

    /// The shared task list, most-recent-first.
    pub async fn tasks(&self) -> Vec<TaskRecord> {
        self.store.list().await
    }

    /// Process one utterance against the local clock.
    pub async fn handle_turn(&self, session: &mut SessionContext, utterance: &str) -> String {
        self.handle_turn_at(session, utterance, Local::now().naive_local())
            .await
    }

    /// Process one utterance against an explicit reference instant.
    pub async fn handle_turn_at(
        &self,
        session: &mut SessionContext,
        utterance: &str,
        now: NaiveDateTime,
    ) -> String {
        let history_block = session.history.prompt_block(HISTORY_WINDOW);

        debug!(%utterance, "Turn started");

        let mut state = TurnState::Router;
        let response = loop {
            state = match state {
                TurnState::Router => {
                    match IntentRouter::classify(self.llm.as_ref(), &history_block, utterance)
                        .await
                    {
                        RouteIntent::TaskHandling => TurnState::TaskDecider,
                        RouteIntent::EmailHandling => TurnState::EmailDecide,
                        RouteIntent::GeneralChat => TurnState::GeneralChat,
                    }
                }
                TurnState::TaskDecider => {
                    match TaskActionClassifier::classify(
                        self.llm.as_ref(),
                        &history_block,
                        utterance,
                    )
                    .await
                    {
                        TaskAction::ExtractAndAdd => TurnState::TaskAdd,
                        TaskAction::Summarize => TurnState::TaskSummarize,
                    }
                }
                TurnState::EmailDecide => {
                    match EmailActionClassifier::classify(
                        self.llm.as_ref(),
                        &history_block,
                        utterance,
                    )
                    .await
                    {
                        EmailAction::Draft => TurnState::EmailDraft,
                        EmailAction::Send => TurnState::EmailSend,
                    }
                }
                TurnState::TaskAdd => {
                    TurnState::Done(self.task_add(&history_block, utterance, now).await)
                }
                TurnState::TaskSummarize => TurnState::Done(self.task_summarize().await),
                TurnState::EmailDraft => {
                    TurnState::Done(self.email_draft(session, &history_block, utterance).await)
                }
                TurnState::EmailSend => TurnState::Done(self.email_send(session).await),
                TurnState::GeneralChat => {
                    TurnState::Done(self.general_chat(&history_block, utterance).await)
                }
                TurnState::Done(response) => break response,
            };
        };

        session.history.push(ChatRole::User, utterance);
        session.history.push(ChatRole::Assistant, response.clone());

        response
    }

    /// TASK_ADD: extract fields, normalize, append to the store.
    async fn task_add(&self, history_block: &str, utterance: &str, now: NaiveDateTime) -> String {
        let raw = match extract::extract_task(self.llm.as_ref(), history_block, utterance).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Task extraction call failed: {}", e);
                return format!("Couldn't add the task. ({})", e);
            }
        };

        let Some(extracted) = extract::parse_task_fields(&raw) else {
            warn!(raw = %raw, "Task extraction returned malformed output");
            return "Couldn't add the task. (task extraction returned malformed output)"
                .to_string();
        };

        if extracted.task.is_empty() {
            return "Couldn't add the task. (no task description was found)".to_string();
        }

        // Relative words in the utterance still resolve when the extractor
        // returned no explicit date or time.
        let instant = if extracted.date.is_empty() && extracted.time.is_empty() {
            datetime::resolve_utterance(utterance, now)
        } else {
            datetime::resolve_fields(&extracted.date, &extracted.time, now)
        };

        let date_full = datetime::date_full(&instant);
        let time_only = datetime::time_only(&instant);

        let id = self
            .store
            .add(&extracted.task, date_full.clone(), time_only.clone())
            .await;

        info!(id, task = %extracted.task, date = %date_full, "Task stored");

        format!(
            "Task: {}, Date: {}, Time: {} is added successfully (id={}).",
            extracted.task, date_full, time_only, id
        )
    }

    /// TASK_SUMMARIZE: list all tasks, most-recent-first.
    async fn task_summarize(&self) -> String {
        let tasks = self.store.list().await;

        if tasks.is_empty() {
            return "No tasks found.".to_string();
        }

        let lines: Vec<String> = tasks
            .iter()
            .map(|t| {
                format!(
                    "- [{}] (#{}) {} — {} / {}",
                    t.status, t.id, t.description, t.date_full, t.time_only
                )
            })
            .collect();

        format!("Here are your tasks:\n{}", lines.join("\n"))
    }

    /// EMAIL_DRAFT: generate a draft and carry it forward for a later send.
    async fn email_draft(
        &self,
        session: &mut SessionContext,
        history_block: &str,
        utterance: &str,
    ) -> String {
        let raw =
            match extract::extract_email_draft(self.llm.as_ref(), history_block, utterance).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Draft generation call failed: {}", e);
                    return format!("Couldn't prepare the email draft. ({})", e);
                }
            };

        let Some(mut draft) = extract::parse_email_draft(&raw) else {
            warn!(raw = %raw, "Draft generation returned malformed output");
            return "Couldn't prepare the email draft. (draft generation returned malformed output)"
                .to_string();
        };

        if draft.to.is_empty() {
            draft.to = PLACEHOLDER_RECIPIENT.to_string();
        }

        let rendered = format!(
            "To: {}\nSubject: {}\n\n{}",
            draft.to, draft.subject, draft.body
        );
        session.pending_draft = Some(draft);

        format!(
            "Here is your email draft:\n\n{}\n\n(To send this email, please confirm it.)",
            rendered
        )
    }

    /// EMAIL_SEND: validate the pending draft, then hand off to the mailer.
    /// The draft is consumed on success and kept for a retry on failure.
    async fn email_send(&self, session: &mut SessionContext) -> String {
        let draft = session.pending_draft.clone().unwrap_or_default();

        let to = draft.to.trim();
        if to.is_empty() || to == PLACEHOLDER_RECIPIENT {
            return "No valid recipient found. Please include a real 'to' address.".to_string();
        }

        let subject = draft.subject.trim();
        if subject.is_empty() {
            return "Subject is empty. Please add a subject before sending.".to_string();
        }

        if draft.body.trim().is_empty() {
            return "Body is empty. Please add content before sending.".to_string();
        }

        match self.mailer.send(to, subject, &draft.body).await {
            Ok(()) => {
                session.pending_draft = None;
                info!(to = %to, "Email sent");
                format!("Email sent to {} with subject '{}'.", to, subject)
            }
            Err(e) => {
                warn!("Mail delivery failed: {}", e);
                format!("Failed to send email. ({})", e)
            }
        }
    }

    /// GENERAL_CHAT: pass the windowed history and utterance straight to
    /// the model.
    async fn general_chat(&self, history_block: &str, utterance: &str) -> String {
        let prompt = if history_block.is_empty() {
            utterance.to_string()
        } else {
            format!("History:\n{}\n\nUser: {}", history_block, utterance)
        };

        match self
            .llm
            .generate(GENERAL_CHAT_INSTRUCTION, &prompt, 0.0)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!("General chat call failed: {}", e);
                format!("Sorry, I couldn't generate a response. ({})", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::llm::ScriptedGenerator;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct RecordingMailer {
        deliveries: Arc<Mutex<Vec<(String, String, String)>>>,
        fail: bool,
    }

    impl RecordingMailer {
        fn new() -> (Self, Arc<Mutex<Vec<(String, String, String)>>>) {
            let deliveries = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    deliveries: Arc::clone(&deliveries),
                    fail: false,
                },
                deliveries,
            )
        }

        fn failing() -> Self {
            Self {
                deliveries: Arc::new(Mutex::new(Vec::new())),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, body: &str) -> crate::Result<()> {
            if self.fail {
                return Err(AgentError::MailError("connection refused".to_string()));
            }
            self.deliveries
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn orchestrator_with<const N: usize>(
        script: [&str; N],
        mailer: Box<dyn Mailer>,
    ) -> (Orchestrator, Arc<TaskStore>) {
        let store = Arc::new(TaskStore::new());
        let orchestrator = Orchestrator::new(
            Box::new(ScriptedGenerator::new(script)),
            mailer,
            Arc::clone(&store),
        );
        (orchestrator, store)
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, s))
            .unwrap()
    }

    #[tokio::test]
    async fn test_task_add_end_to_end() {
        let (mailer, _) = RecordingMailer::new();
        let (orchestrator, store) = orchestrator_with(
            [
                r#"{"route":"TASK_HANDLING"}"#,
                r#"{"task_action":"EXTRACT_AND_ADD"}"#,
                r#"{"task":"submit the report","date":"","time":""}"#,
            ],
            Box::new(mailer),
        );

        let mut session = SessionContext::new();
        let response = orchestrator
            .handle_turn_at(
                &mut session,
                "I need to submit the report by tomorrow 7pm",
                at(2024, 6, 10, 9, 0, 0),
            )
            .await;

        assert!(response.contains("submit the report"));
        assert!(response.contains("2024-06-11 19:00:00"));
        assert!(response.contains("id=1"));

        let tasks = store.list().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "submit the report");
        assert_eq!(tasks[0].date_full, "2024-06-11 19:00:00");
        assert_eq!(tasks[0].time_only, "19:00:00");
    }

    #[tokio::test]
    async fn test_task_add_uses_extracted_fields_when_present() {
        let (mailer, _) = RecordingMailer::new();
        let (orchestrator, store) = orchestrator_with(
            [
                r#"{"route":"TASK_HANDLING"}"#,
                r#"{"task_action":"EXTRACT_AND_ADD"}"#,
                r#"{"task":"board meeting prep","date":"2024-07-01","time":"14:30"}"#,
            ],
            Box::new(mailer),
        );

        let mut session = SessionContext::new();
        orchestrator
            .handle_turn_at(
                &mut session,
                "prep for the board meeting",
                at(2024, 6, 10, 9, 0, 0),
            )
            .await;

        let tasks = store.list().await;
        assert_eq!(tasks[0].date_full, "2024-07-01 14:30:00");
        assert_eq!(tasks[0].time_only, "14:30:00");
    }

    #[tokio::test]
    async fn test_malformed_extraction_stores_nothing() {
        let (mailer, _) = RecordingMailer::new();
        let (orchestrator, store) = orchestrator_with(
            [
                r#"{"route":"TASK_HANDLING"}"#,
                r#"{"task_action":"EXTRACT_AND_ADD"}"#,
                "I went ahead and added that for you!",
            ],
            Box::new(mailer),
        );

        let mut session = SessionContext::new();
        let response = orchestrator
            .handle_turn_at(&mut session, "remind me to stretch", at(2024, 6, 10, 9, 0, 0))
            .await;

        assert!(response.starts_with("Couldn't add the task."));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_task_text_is_rejected() {
        let (mailer, _) = RecordingMailer::new();
        let (orchestrator, store) = orchestrator_with(
            [
                r#"{"route":"TASK_HANDLING"}"#,
                r#"{"task_action":"EXTRACT_AND_ADD"}"#,
                r#"{"task":"","date":"2024-07-01","time":""}"#,
            ],
            Box::new(mailer),
        );

        let mut session = SessionContext::new();
        let response = orchestrator
            .handle_turn_at(&mut session, "hmm", at(2024, 6, 10, 9, 0, 0))
            .await;

        assert!(response.starts_with("Couldn't add the task."));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_summarize_lists_most_recent_first() {
        let (mailer, _) = RecordingMailer::new();
        let (orchestrator, store) = orchestrator_with(
            [
                r#"{"route":"TASK_HANDLING"}"#,
                r#"{"task_action":"SUMMARIZE"}"#,
            ],
            Box::new(mailer),
        );

        store
            .add("submit the report", "2024-06-11 19:00:00".into(), "19:00:00".into())
            .await;
        store
            .add("buy groceries", "2024-06-12 00:00:00".into(), "00:00:00".into())
            .await;

        let mut session = SessionContext::new();
        let response = orchestrator
            .handle_turn_at(&mut session, "summarize tasks", at(2024, 6, 10, 9, 0, 0))
            .await;

        assert!(response.starts_with("Here are your tasks:"));
        let second = response.find("(#2)").unwrap();
        let first = response.find("(#1)").unwrap();
        assert!(second < first);
        assert!(response.contains("- [pending] (#1) submit the report — 2024-06-11 19:00:00 / 19:00:00"));
    }

    #[tokio::test]
    async fn test_summarize_empty_store() {
        let (mailer, _) = RecordingMailer::new();
        let (orchestrator, _store) = orchestrator_with(
            [
                r#"{"route":"TASK_HANDLING"}"#,
                r#"{"task_action":"SUMMARIZE"}"#,
            ],
            Box::new(mailer),
        );

        let mut session = SessionContext::new();
        let response = orchestrator
            .handle_turn_at(&mut session, "show my tasks", at(2024, 6, 10, 9, 0, 0))
            .await;

        assert_eq!(response, "No tasks found.");
    }

    #[tokio::test]
    async fn test_draft_is_carried_forward() {
        let (mailer, _) = RecordingMailer::new();
        let (orchestrator, _store) = orchestrator_with(
            [
                r#"{"route":"EMAIL_HANDLING"}"#,
                r#"{"action":"DRAFT"}"#,
                r#"{"to":"brian@corp.test","subject":"Meeting","body":"Hi Brian"}"#,
            ],
            Box::new(mailer),
        );

        let mut session = SessionContext::new();
        let response = orchestrator
            .handle_turn_at(
                &mut session,
                "email Brian about the meeting",
                at(2024, 6, 10, 9, 0, 0),
            )
            .await;

        assert!(response.contains("To: brian@corp.test"));
        assert!(response.contains("(To send this email, please confirm it.)"));

        let draft = session.pending_draft.as_ref().unwrap();
        assert_eq!(draft.to, "brian@corp.test");
        assert_eq!(draft.subject, "Meeting");
    }

    #[tokio::test]
    async fn test_placeholder_recipient_is_rejected_without_delivery() {
        let (mailer, deliveries) = RecordingMailer::new();
        let (orchestrator, _store) = orchestrator_with(
            [r#"{"route":"EMAIL_HANDLING"}"#, r#"{"action":"SEND"}"#],
            Box::new(mailer),
        );

        let mut session = SessionContext::new();
        session.pending_draft = Some(EmailDraft {
            to: PLACEHOLDER_RECIPIENT.to_string(),
            subject: "Meeting".to_string(),
            body: "Hi".to_string(),
        });

        let response = orchestrator
            .handle_turn_at(&mut session, "send it", at(2024, 6, 10, 9, 0, 0))
            .await;

        assert_eq!(
            response,
            "No valid recipient found. Please include a real 'to' address."
        );
        assert!(deliveries.lock().unwrap().is_empty());
        assert!(session.pending_draft.is_some());
    }

    #[tokio::test]
    async fn test_missing_subject_and_body_rejections_are_distinct() {
        let (mailer, deliveries) = RecordingMailer::new();
        let (orchestrator, _store) = orchestrator_with(
            [
                r#"{"route":"EMAIL_HANDLING"}"#,
                r#"{"action":"SEND"}"#,
                r#"{"route":"EMAIL_HANDLING"}"#,
                r#"{"action":"SEND"}"#,
            ],
            Box::new(mailer),
        );

        let mut session = SessionContext::new();
        session.pending_draft = Some(EmailDraft {
            to: "brian@corp.test".to_string(),
            subject: String::new(),
            body: "Hi".to_string(),
        });
        let response = orchestrator
            .handle_turn_at(&mut session, "send it", at(2024, 6, 10, 9, 0, 0))
            .await;
        assert_eq!(response, "Subject is empty. Please add a subject before sending.");

        session.pending_draft = Some(EmailDraft {
            to: "brian@corp.test".to_string(),
            subject: "Meeting".to_string(),
            body: "   ".to_string(),
        });
        let response = orchestrator
            .handle_turn_at(&mut session, "send it", at(2024, 6, 10, 9, 0, 0))
            .await;
        assert_eq!(response, "Body is empty. Please add content before sending.");

        assert!(deliveries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_success_clears_draft() {
        let (mailer, deliveries) = RecordingMailer::new();
        let (orchestrator, _store) = orchestrator_with(
            [r#"{"route":"EMAIL_HANDLING"}"#, r#"{"action":"SEND"}"#],
            Box::new(mailer),
        );

        let mut session = SessionContext::new();
        session.pending_draft = Some(EmailDraft {
            to: "brian@corp.test".to_string(),
            subject: "Meeting".to_string(),
            body: "Hi Brian".to_string(),
        });

        let response = orchestrator
            .handle_turn_at(&mut session, "send it", at(2024, 6, 10, 9, 0, 0))
            .await;

        assert_eq!(response, "Email sent to brian@corp.test with subject 'Meeting'.");
        assert_eq!(deliveries.lock().unwrap().len(), 1);
        assert!(session.pending_draft.is_none());
    }

    #[tokio::test]
    async fn test_delivery_failure_is_reported_and_draft_kept() {
        let (orchestrator, _store) = orchestrator_with(
            [r#"{"route":"EMAIL_HANDLING"}"#, r#"{"action":"SEND"}"#],
            Box::new(RecordingMailer::failing()),
        );

        let mut session = SessionContext::new();
        session.pending_draft = Some(EmailDraft {
            to: "brian@corp.test".to_string(),
            subject: "Meeting".to_string(),
            body: "Hi Brian".to_string(),
        });

        let response = orchestrator
            .handle_turn_at(&mut session, "send it", at(2024, 6, 10, 9, 0, 0))
            .await;

        assert!(response.starts_with("Failed to send email."));
        assert!(response.contains("connection refused"));
        assert!(session.pending_draft.is_some());
    }

    #[tokio::test]
    async fn test_unroutable_utterance_falls_through_to_chat() {
        let (mailer, _) = RecordingMailer::new();
        let (orchestrator, _store) = orchestrator_with(
            ["definitely not json", "Hello! How can I help?"],
            Box::new(mailer),
        );

        let mut session = SessionContext::new();
        let response = orchestrator
            .handle_turn_at(&mut session, "hey there", at(2024, 6, 10, 9, 0, 0))
            .await;

        assert_eq!(response, "Hello! How can I help?");
    }

    #[tokio::test]
    async fn test_turn_appends_both_history_entries() {
        let (mailer, _) = RecordingMailer::new();
        let (orchestrator, _store) = orchestrator_with(
            [r#"{"route":"GENERAL_CHAT"}"#, "Sure."],
            Box::new(mailer),
        );

        let mut session = SessionContext::new();
        orchestrator
            .handle_turn_at(&mut session, "thanks", at(2024, 6, 10, 9, 0, 0))
            .await;

        assert_eq!(session.history.len(), 2);
        let roles: Vec<ChatRole> = session.history.turns().map(|t| t.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant]);
    }
}
