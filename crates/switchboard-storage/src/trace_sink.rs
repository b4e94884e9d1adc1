// Database-backed TraceSink implementation
//
// Writes one agent_traces row per run. A few summary columns are derived
// from the buffered messages so the trace table can be browsed without
// unpacking the JSONB payloads: the first user message, the last agent
// reply, and whether the turn carried attachments.

use async_trait::async_trait;

use switchboard_core::error::{OrchestratorError, Result};
use switchboard_core::message::{Message, MessageRole};
use switchboard_core::trace::TraceRecord;
use switchboard_core::traits::TraceSink;

use crate::models::CreateTraceRow;
use crate::repositories::Database;

// Summary columns are for browsing, not the source of truth; long inputs
// are cut rather than rejected.
const SUMMARY_MAX_CHARS: usize = 10_000;

/// Database-backed trace sink
#[derive(Clone)]
pub struct PgTraceSink {
    db: Database,
}

impl PgTraceSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn first_user_content(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .find(|m| m.role == MessageRole::User)
        .map(|m| truncate_chars(&m.content, SUMMARY_MAX_CHARS))
}

fn last_reply_content(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| matches!(m.role, MessageRole::Assistant | MessageRole::Tool))
        .map(|m| truncate_chars(&m.content, SUMMARY_MAX_CHARS))
}

fn carried_attachments(user_message: Option<&String>) -> bool {
    user_message.is_some_and(|content| content.contains("[Attached"))
}

#[async_trait]
impl TraceSink for PgTraceSink {
    async fn record_trace(&self, record: TraceRecord) -> Result<()> {
        let user_message = first_user_content(&record.messages);
        let assistant_response = last_reply_content(&record.messages);
        let has_attachments = carried_attachments(user_message.as_ref());

        let events = serde_json::to_value(&record.events)
            .map_err(|e| OrchestratorError::trace(format!("unserializable events: {e}")))?;
        let messages = serde_json::to_value(&record.messages)
            .map_err(|e| OrchestratorError::trace(format!("unserializable messages: {e}")))?;

        let input = CreateTraceRow {
            trace_id: record.trace_id,
            run_id: record.run_id,
            conversation_id: record.conversation_id,
            user_id: record.user_id,
            agent_type: record.agent_type,
            model_used: record.model_used,
            user_message,
            assistant_response,
            has_attachments,
            events,
            messages,
            started_at: record.started_at,
            finished_at: record.finished_at,
        };

        self.db
            .insert_trace(input)
            .await
            .map_err(|e| OrchestratorError::trace(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_picks_first_user_and_last_reply() {
        let messages = vec![
            Message::user("first question"),
            Message::assistant("main", "first answer"),
            Message::user("second question"),
            Message::assistant("script", "second answer"),
        ];

        assert_eq!(
            first_user_content(&messages).as_deref(),
            Some("first question")
        );
        assert_eq!(
            last_reply_content(&messages).as_deref(),
            Some("second answer")
        );
    }

    #[test]
    fn test_tool_output_counts_as_reply() {
        let messages = vec![
            Message::user("run the report"),
            Message::tool("tool", "report generated"),
        ];

        assert_eq!(
            last_reply_content(&messages).as_deref(),
            Some("report generated")
        );
    }

    #[test]
    fn test_attachment_marker_detected() {
        let with = Some("look at this\n\n[Attached image: a.png, URL: http://x/a.png]".to_string());
        let without = Some("plain text".to_string());

        assert!(carried_attachments(with.as_ref()));
        assert!(!carried_attachments(without.as_ref()));
        assert!(!carried_attachments(None));
    }

    #[test]
    fn test_summary_is_truncated() {
        let long = "x".repeat(SUMMARY_MAX_CHARS + 500);
        let messages = vec![Message::user(&long)];

        let summary = first_user_content(&messages);
        assert_eq!(summary.map(|s| s.chars().count()), Some(SUMMARY_MAX_CHARS));
    }
}
