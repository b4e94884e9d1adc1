// Service seams
//
// Every external dependency of the orchestrator sits behind a trait: the
// completion service, the tool execution service, message persistence, trace
// persistence, the agent/tool directory, the automation session store, and
// the browser automation provider. Production wires these to HTTP clients and
// Postgres; tests swap in scripted fakes.
//
// The request/response types here are wire contracts and serialize in
// camelCase, matching the services on the other end. Internal types
// (Message, AutomationSession) keep snake_case.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::CustomAgentProfile;
use crate::automation::{AutomationAction, AutomationSession};
use crate::error::Result;
use crate::message::{HandoffRequest, Message};
use crate::trace::TraceRecord;

// ===== Completion wire types =====

/// One message as the completion service expects it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for CompletionMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.to_string(),
            content: message.content.clone(),
        }
    }
}

/// Per-turn context forwarded to the completion service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextData {
    pub has_attachments: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment_types: Vec<String>,
    pub is_custom_agent: bool,
    pub is_handoff_continuation: bool,
    pub use_performance_model: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_tool: Option<String>,
    /// Context the handing-off agent wanted the receiver to see
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_tools: Vec<ToolSummary>,
}

/// Request body for the completion service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub messages: Vec<CompletionMessage>,
    pub agent_type: String,
    pub user_id: Uuid,
    pub context_data: ContextData,
}

/// Structured handoff field on a completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffDirective {
    pub target_agent: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<serde_json::Value>,
}

impl From<HandoffDirective> for HandoffRequest {
    fn from(directive: HandoffDirective) -> Self {
        HandoffRequest {
            target_agent: directive.target_agent,
            reason: directive.reason,
            additional_context: directive.additional_context,
        }
    }
}

/// Response body from the completion service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub completion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_request: Option<HandoffDirective>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

// ===== Tool wire types =====

/// A tool as listed in the directory, forwarded to the tool agent's context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub required_credits: f64,
    pub parameters: serde_json::Value,
}

/// Request body for the tool execution service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_name: String,
    pub parameters: serde_json::Value,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Uuid>,
}

/// Response body from the tool execution service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

// ===== Automation provider wire types =====

/// Handle returned when a provider task is started
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTaskHandle {
    pub task_id: String,
    pub live_url: Option<String>,
}

/// Provider-side lifecycle phase of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPhase {
    Created,
    Running,
    Paused,
    Finished,
    Failed,
    Stopped,
}

impl ProviderPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProviderPhase::Finished | ProviderPhase::Failed | ProviderPhase::Stopped
        )
    }
}

impl From<&str> for ProviderPhase {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "created" => ProviderPhase::Created,
            "paused" => ProviderPhase::Paused,
            "finished" => ProviderPhase::Finished,
            "failed" => ProviderPhase::Failed,
            "stopped" => ProviderPhase::Stopped,
            // Unknown phases keep the session polling rather than wedging it.
            _ => ProviderPhase::Running,
        }
    }
}

/// One step the provider reports having taken
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStep {
    pub action_type: String,
    pub details: Option<String>,
}

/// Snapshot of a provider task, as returned by a status poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTaskStatus {
    pub status: ProviderPhase,
    pub progress: Option<f32>,
    pub current_url: Option<String>,
    pub live_url: Option<String>,
    pub output: Option<String>,
    #[serde(default)]
    pub steps: Vec<ProviderStep>,
}

// ===== Seams =====

/// The agent completion service
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

/// The tool execution service
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, invocation: ToolInvocation) -> Result<ToolOutcome>;
}

/// Conversation message persistence
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn store_message(&self, conversation_id: Uuid, message: &Message) -> Result<()>;
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;
}

/// Trace persistence
#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn record_trace(&self, record: TraceRecord) -> Result<()>;
}

/// Lookup of custom agents and executable tools
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn find_custom_agent(&self, id: Uuid) -> Result<Option<CustomAgentProfile>>;
    async fn available_tools(&self) -> Result<Vec<ToolSummary>>;
}

/// Automation session and action persistence, plus the credit ledger
#[async_trait]
pub trait AutomationStore: Send + Sync {
    async fn create_session(&self, session: &AutomationSession) -> Result<()>;
    async fn get_session(&self, id: Uuid) -> Result<Option<AutomationSession>>;
    async fn update_session(&self, session: &AutomationSession) -> Result<()>;
    /// Sessions in a non-terminal status, for recovery after a restart
    async fn active_sessions(&self) -> Result<Vec<AutomationSession>>;

    async fn insert_action(&self, action: &AutomationAction) -> Result<()>;
    async fn update_action(&self, action: &AutomationAction) -> Result<()>;
    async fn session_actions(&self, session_id: Uuid) -> Result<Vec<AutomationAction>>;
    /// The oldest queued action for a session, if any
    async fn pending_action(&self, session_id: Uuid) -> Result<Option<AutomationAction>>;

    async fn user_credits(&self, user_id: Uuid) -> Result<f64>;
    /// Atomically deduct credits. Returns false when the balance is too low;
    /// nothing is deducted in that case.
    async fn deduct_credits(&self, user_id: Uuid, amount: f64) -> Result<bool>;
}

/// The browser automation provider
#[async_trait]
pub trait AutomationProvider: Send + Sync {
    async fn run_task(&self, instructions: &str) -> Result<ProviderTaskHandle>;
    async fn pause_task(&self, task_id: &str) -> Result<()>;
    async fn resume_task(&self, task_id: &str) -> Result<()>;
    async fn stop_task(&self, task_id: &str) -> Result<()>;
    async fn task_status(&self, task_id: &str) -> Result<ProviderTaskStatus>;
    /// Recording/media URLs for a finished task
    async fn task_media(&self, task_id: &str) -> Result<Vec<String>>;
    /// Current screenshot as a data URL
    async fn capture_screenshot(&self, task_id: &str) -> Result<String>;
    async fn execute_action(
        &self,
        task_id: &str,
        action_type: &str,
        parameters: &serde_json::Value,
    ) -> Result<()>;
}
