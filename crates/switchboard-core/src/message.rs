// Message types
//
// Message is a DB-agnostic message type representing a single entry in a
// conversation: user input, agent replies, tool results, and error surfaces.
// Messages are immutable once emitted; status moves thinking -> completed|error
// before emission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// User message
    User,
    /// Agent response
    Assistant,
    /// System message (instructions, handoff continuations)
    System,
    /// Tool execution result
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

impl From<&str> for MessageRole {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            "tool" => MessageRole::Tool,
            _ => MessageRole::User,
        }
    }
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// The agent is still working on this turn
    Thinking,
    /// Turn finished normally
    Completed,
    /// Turn finished with an error
    Error,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Thinking => write!(f, "thinking"),
            MessageStatus::Completed => write!(f, "completed"),
            MessageStatus::Error => write!(f, "error"),
        }
    }
}

impl From<&str> for MessageStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "thinking" => MessageStatus::Thinking,
            "error" => MessageStatus::Error,
            _ => MessageStatus::Completed,
        }
    }
}

/// Status of a tool task inside a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

/// One tool invocation inside a turn, one-to-one with the call it tracks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Task {
    /// Create a pending task for a named tool
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            status: TaskStatus::Pending,
            details: None,
        }
    }

    /// Mark the task completed
    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
    }

    /// Mark the task failed with details
    pub fn fail(&mut self, details: impl Into<String>) {
        self.status = TaskStatus::Error;
        self.details = Some(details.into());
    }
}

/// A request to transfer the conversation to another agent, embedded in a Message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HandoffRequest {
    /// Target agent: a built-in kind name or a custom agent UUID
    pub target_agent: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<serde_json::Value>,
}

/// Attachment kind as referenced in user messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    File,
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachmentKind::Image => write!(f, "image"),
            AttachmentKind::File => write!(f, "file"),
        }
    }
}

/// A file the user attached to their input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub kind: AttachmentKind,
}

/// Render attachment references as bracketed text appended to the user message.
/// Format is load-bearing: the completion service extracts URLs from it.
pub fn format_attachments(attachments: &[Attachment]) -> String {
    attachments
        .iter()
        .map(|a| format!("[Attached {}: {}, URL: {}]", a.kind, a.name, a.url))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Message {
    /// Unique message ID
    pub id: Uuid,

    /// Message role
    pub role: MessageRole,

    /// Message text
    pub content: String,

    /// Agent persona that produced this message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,

    /// Delivery status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,

    /// Structured command payload attached by an agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<serde_json::Value>,

    /// Tool tasks spawned inside this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Task>,

    /// Handoff carried by this message, if the agent requested one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_request: Option<HandoffRequest>,

    /// Timestamp when the message was created
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn base(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content: content.into(),
            agent_type: None,
            status: None,
            command: None,
            tasks: Vec::new(),
            handoff_request: None,
            created_at: Utc::now(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::base(MessageRole::User, content)
    }

    /// Create a completed assistant message from a named agent
    pub fn assistant(agent_type: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::base(MessageRole::Assistant, content);
        msg.agent_type = Some(agent_type.into());
        msg.status = Some(MessageStatus::Completed);
        msg
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::base(MessageRole::System, content)
    }

    /// Create a tool-role message carrying an execution result
    pub fn tool(agent_type: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::base(MessageRole::Tool, content);
        msg.agent_type = Some(agent_type.into());
        msg.status = Some(MessageStatus::Completed);
        msg
    }

    /// Create an error message from a named agent
    pub fn error(agent_type: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::base(MessageRole::Assistant, content);
        msg.agent_type = Some(agent_type.into());
        msg.status = Some(MessageStatus::Error);
        msg
    }

    /// Attach a handoff request
    pub fn with_handoff(mut self, handoff: HandoffRequest) -> Self {
        self.handoff_request = Some(handoff);
        self
    }

    /// Attach tool tasks
    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Whether this message reports an error
    pub fn is_error(&self) -> bool {
        self.status == Some(MessageStatus::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "Hello");
        assert!(msg.status.is_none());
    }

    #[test]
    fn test_assistant_message() {
        let msg = Message::assistant("main", "Hi there!");
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.agent_type.as_deref(), Some("main"));
        assert_eq!(msg.status, Some(MessageStatus::Completed));
    }

    #[test]
    fn test_error_message() {
        let msg = Message::error("script", "Error: something broke");
        assert!(msg.is_error());
        assert_eq!(msg.role, MessageRole::Assistant);
    }

    #[test]
    fn test_task_lifecycle() {
        let mut task = Task::pending("product-shot-v2");
        assert_eq!(task.status, TaskStatus::Pending);

        task.fail("timed out");
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.details.as_deref(), Some("timed out"));
    }

    #[test]
    fn test_format_attachments() {
        let attachments = vec![
            Attachment {
                name: "photo.png".to_string(),
                url: "https://cdn.example.com/photo.png".to_string(),
                kind: AttachmentKind::Image,
            },
            Attachment {
                name: "brief.pdf".to_string(),
                url: "https://cdn.example.com/brief.pdf".to_string(),
                kind: AttachmentKind::File,
            },
        ];

        let text = format_attachments(&attachments);
        assert!(text.contains("[Attached image: photo.png, URL: https://cdn.example.com/photo.png]"));
        assert!(text.contains("[Attached file: brief.pdf, URL: https://cdn.example.com/brief.pdf]"));
    }

    #[test]
    fn test_message_serde_skips_empty_fields() {
        let msg = Message::user("Hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("handoff_request").is_none());
        assert!(json.get("tasks").is_none());
        assert_eq!(json["role"], "user");
    }
}
