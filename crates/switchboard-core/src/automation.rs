// Automation session model
//
// A session tracks one browser automation task from creation to a terminal
// state. Status changes go through an explicit transition table; an illegal
// transition is an error, and terminal states accept no further transitions.
// The engine in the worker crate drives these transitions from provider
// polls; the API crate drives them from user requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::traits::ProviderPhase;

/// Default interval between provider status polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Attempts per automation action before it is marked failed
pub const ACTION_MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between action attempts
pub const ACTION_RETRY_DELAY_SECS: u64 = 2;

/// Credits a user must hold before a session may start
pub const MINIMUM_SESSION_CREDITS: f64 = 1.0;

/// 1x1 transparent PNG, served when a screenshot cannot be captured
pub const TRANSPARENT_PIXEL_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJgg==";

/// Lifecycle state of an automation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created locally, provider task not started yet
    Pending,
    /// Provider task is executing
    Running,
    /// Paused by the user; the provider holds the task
    Paused,
    /// Provider finished the task
    Completed,
    /// Provider reported failure, or the session could not start
    Failed,
    /// Stopped by the user
    Stopped,
    /// Provider no longer knows the task
    Expired,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed
                | SessionStatus::Failed
                | SessionStatus::Stopped
                | SessionStatus::Expired
        )
    }

    /// Whether the session still needs polling
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Legal moves in the session state machine
    pub fn can_transition(self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, to),
            (Pending, Running | Failed | Stopped)
                | (Running, Paused | Completed | Failed | Stopped | Expired)
                | (Paused, Running | Stopped | Completed | Failed | Expired)
        )
    }

    /// Session status corresponding to a provider phase
    pub fn from_phase(phase: ProviderPhase) -> Self {
        match phase {
            ProviderPhase::Created | ProviderPhase::Running => SessionStatus::Running,
            ProviderPhase::Paused => SessionStatus::Paused,
            ProviderPhase::Finished => SessionStatus::Completed,
            ProviderPhase::Failed => SessionStatus::Failed,
            ProviderPhase::Stopped => SessionStatus::Stopped,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
            SessionStatus::Stopped => write!(f, "stopped"),
            SessionStatus::Expired => write!(f, "expired"),
        }
    }
}

impl From<&str> for SessionStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "running" => SessionStatus::Running,
            "paused" => SessionStatus::Paused,
            "completed" => SessionStatus::Completed,
            "failed" => SessionStatus::Failed,
            "stopped" => SessionStatus::Stopped,
            "expired" => SessionStatus::Expired,
            _ => SessionStatus::Pending,
        }
    }
}

/// One browser automation session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AutomationSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub instructions: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AutomationSession {
    /// Create a pending session; nothing has been sent to the provider yet
    pub fn new(user_id: Uuid, instructions: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id,
            instructions: instructions.into(),
            status: SessionStatus::Pending,
            provider_task_id: None,
            live_url: None,
            current_url: None,
            progress: None,
            output: None,
            media_urls: Vec::new(),
            screenshot: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Move to a new status. A transition to the current status is a no-op;
    /// an illegal transition is rejected without modifying the session.
    pub fn transition_to(&mut self, to: SessionStatus) -> Result<()> {
        if to == self.status {
            return Ok(());
        }
        if !self.status.can_transition(to) {
            return Err(OrchestratorError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }

        self.status = to;
        self.updated_at = Utc::now();
        if to.is_terminal() {
            self.finished_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Record a failure and move to Failed
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.error = Some(error.into());
        self.transition_to(SessionStatus::Failed)
    }
}

/// Execution state of a queued automation action.
///
/// At most one action per session is `pending` at a time: it is the head of
/// the queue, and the next step is only materialized once it resolves to
/// `executed` or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Executed,
    Failed,
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStatus::Pending => write!(f, "pending"),
            ActionStatus::Executed => write!(f, "executed"),
            ActionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl From<&str> for ActionStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "executed" => ActionStatus::Executed,
            "failed" => ActionStatus::Failed,
            _ => ActionStatus::Pending,
        }
    }
}

/// One discrete step queued against a session's provider task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AutomationAction {
    pub id: Uuid,
    pub session_id: Uuid,
    pub action_type: String,
    pub action_details: serde_json::Value,
    pub status: ActionStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationAction {
    pub fn new(
        session_id: Uuid,
        action_type: impl Into<String>,
        action_details: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            session_id,
            action_type: action_type.into(),
            action_details,
            status: ActionStatus::Pending,
            attempts: 0,
            screenshot_url: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the action executed
    pub fn executed(&mut self) {
        self.status = ActionStatus::Executed;
        self.updated_at = Utc::now();
    }

    /// Mark the action failed with the final error
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ActionStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }
}
