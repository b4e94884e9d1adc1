// Row types and their conversions
//
// One struct per table, derived with FromRow, plus conversions into the core
// domain types. JSONB columns written by this crate are parsed strictly: a
// row this code cannot read back is a data error, not a silent default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use switchboard_core::agents::CustomAgentProfile;
use switchboard_core::automation::{ActionStatus, AutomationAction, AutomationSession, SessionStatus};
use switchboard_core::error::{OrchestratorError, Result};
use switchboard_core::message::{Message, MessageRole, MessageStatus};
use switchboard_core::traits::ToolSummary;

/// A conversation between a user and the agents
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub agent_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub agent_type: Option<String>,
    pub status: Option<String>,
    pub command: Option<serde_json::Value>,
    pub tasks: serde_json::Value,
    pub handoff_request: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        let tasks = serde_json::from_value(self.tasks)
            .map_err(|e| OrchestratorError::data(format!("bad tasks payload: {e}")))?;
        let handoff_request = self
            .handoff_request
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| OrchestratorError::data(format!("bad handoff payload: {e}")))?;

        Ok(Message {
            id: self.id,
            role: MessageRole::from(self.role.as_str()),
            content: self.content,
            agent_type: self.agent_type,
            status: self.status.as_deref().map(MessageStatus::from),
            command: self.command,
            tasks,
            handoff_request,
            created_at: self.created_at,
        })
    }
}

/// A custom agent as stored, including ownership and timestamps
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomAgentRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub instructions: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CustomAgentRecord> for CustomAgentProfile {
    fn from(record: CustomAgentRecord) -> Self {
        CustomAgentProfile {
            id: record.id,
            name: record.name,
            description: record.description,
            instructions: record.instructions,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ToolRow {
    pub name: String,
    pub description: String,
    pub required_credits: f64,
    pub parameters: serde_json::Value,
}

impl From<ToolRow> for ToolSummary {
    fn from(row: ToolRow) -> Self {
        ToolSummary {
            name: row.name,
            description: row.description,
            required_credits: row.required_credits,
            parameters: row.parameters,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub instructions: String,
    pub status: String,
    pub provider_task_id: Option<String>,
    pub live_url: Option<String>,
    pub current_url: Option<String>,
    pub progress: Option<f32>,
    pub output: Option<String>,
    pub media_urls: serde_json::Value,
    pub screenshot: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    pub fn into_session(self) -> Result<AutomationSession> {
        let media_urls = serde_json::from_value(self.media_urls)
            .map_err(|e| OrchestratorError::data(format!("bad media_urls payload: {e}")))?;

        Ok(AutomationSession {
            id: self.id,
            user_id: self.user_id,
            instructions: self.instructions,
            status: SessionStatus::from(self.status.as_str()),
            provider_task_id: self.provider_task_id,
            live_url: self.live_url,
            current_url: self.current_url,
            progress: self.progress,
            output: self.output,
            media_urls,
            screenshot: self.screenshot,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ActionRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub action_type: String,
    pub action_details: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub screenshot_url: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ActionRow> for AutomationAction {
    fn from(row: ActionRow) -> Self {
        AutomationAction {
            id: row.id,
            session_id: row.session_id,
            action_type: row.action_type,
            action_details: row.action_details,
            status: ActionStatus::from(row.status.as_str()),
            attempts: row.attempts.max(0) as u32,
            screenshot_url: row.screenshot_url,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ============================================
// Insert inputs
// ============================================

/// Input for inserting a message row
#[derive(Debug, Clone)]
pub struct CreateMessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub agent_type: Option<String>,
    pub status: Option<String>,
    pub command: Option<serde_json::Value>,
    pub tasks: serde_json::Value,
    pub handoff_request: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a custom agent
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomAgent {
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub instructions: String,
}

/// Input for updating a custom agent (None = keep existing value)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCustomAgent {
    pub name: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
}

/// Input for inserting a trace row
#[derive(Debug, Clone)]
pub struct CreateTraceRow {
    pub trace_id: Uuid,
    pub run_id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub agent_type: String,
    pub model_used: Option<String>,
    pub user_message: Option<String>,
    pub assistant_response: Option<String>,
    pub has_attachments: bool,
    pub events: serde_json::Value,
    pub messages: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
