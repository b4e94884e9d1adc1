// Automation session HTTP routes
//
// Session lifecycle goes through the engine; reads go straight to storage.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use switchboard_browser::BrowserUseClient;
use switchboard_core::{AutomationAction, AutomationSession, OrchestratorError};
use switchboard_storage::{Database, PgAutomationStore};
use switchboard_worker::AutomationEngine;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::{api_error, ListResponse, UserScope};

/// Engine wired to the production provider and store.
pub type Engine = AutomationEngine<BrowserUseClient, PgAutomationStore>;

/// App state for automation routes
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub db: Database,
}

/// Request to start an automation session
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StartSessionRequest {
    /// User the session runs on behalf of
    pub user_id: Uuid,
    /// What the browser agent should accomplish
    #[schema(example = "Order a large pepperoni pizza from slice.example.com")]
    pub instructions: String,
}

/// Request to set a user's credit balance
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetCreditsRequest {
    #[schema(example = 25.0)]
    pub credits: f64,
}

/// A user's remaining automation credits
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreditBalance {
    pub user_id: Uuid,
    pub credits_remaining: f64,
}

/// Create automation routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/automation/sessions",
            post(start_session).get(list_sessions),
        )
        .route("/v1/automation/sessions/{session_id}", get(get_session))
        .route(
            "/v1/automation/sessions/{session_id}/pause",
            post(pause_session),
        )
        .route(
            "/v1/automation/sessions/{session_id}/resume",
            post(resume_session),
        )
        .route(
            "/v1/automation/sessions/{session_id}/stop",
            post(stop_session),
        )
        .route(
            "/v1/automation/sessions/{session_id}/actions",
            get(list_actions),
        )
        .route("/v1/credits/{user_id}", get(get_credits).put(set_credits))
        .with_state(state)
}

/// POST /v1/automation/sessions - Start a browser automation session
#[utoipa::path(
    post,
    path = "/v1/automation/sessions",
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Session started successfully", body = AutomationSession),
        (status = 400, description = "Instructions are blank"),
        (status = 402, description = "Insufficient credits"),
        (status = 502, description = "Automation provider rejected the task"),
        (status = 500, description = "Internal server error")
    ),
    tag = "automation"
)]
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<AutomationSession>), StatusCode> {
    if req.instructions.trim().is_empty() {
        return Err(api_error(OrchestratorError::validation(
            "instructions must not be blank",
        )));
    }

    let session = state
        .engine
        .start_session(req.user_id, req.instructions)
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /v1/automation/sessions - List a user's automation sessions
#[utoipa::path(
    get,
    path = "/v1/automation/sessions",
    params(
        ("user_id" = Uuid, Query, description = "User to list sessions for")
    ),
    responses(
        (status = 200, description = "List of sessions", body = ListResponse<AutomationSession>),
        (status = 500, description = "Internal server error")
    ),
    tag = "automation"
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(scope): Query<UserScope>,
) -> Result<Json<ListResponse<AutomationSession>>, StatusCode> {
    let rows = state.db.list_user_sessions(scope.user_id).await.map_err(|e| {
        tracing::error!("Failed to list automation sessions: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let sessions = rows
        .into_iter()
        .map(|row| row.into_session())
        .collect::<Result<Vec<_>, _>>()
        .map_err(api_error)?;

    Ok(Json(ListResponse::new(sessions)))
}

/// GET /v1/automation/sessions/{session_id} - Get an automation session
#[utoipa::path(
    get,
    path = "/v1/automation/sessions/{session_id}",
    params(
        ("session_id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session found", body = AutomationSession),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "automation"
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<AutomationSession>, StatusCode> {
    let row = state
        .db
        .get_automation_session(session_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get automation session: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let session = row.into_session().map_err(api_error)?;
    Ok(Json(session))
}

/// POST /v1/automation/sessions/{session_id}/pause - Pause a running session
#[utoipa::path(
    post,
    path = "/v1/automation/sessions/{session_id}/pause",
    params(
        ("session_id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session paused", body = AutomationSession),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is not in a pausable state"),
        (status = 502, description = "Automation provider rejected the request")
    ),
    tag = "automation"
)]
pub async fn pause_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<AutomationSession>, StatusCode> {
    let session = state
        .engine
        .pause_session(session_id)
        .await
        .map_err(api_error)?;
    Ok(Json(session))
}

/// POST /v1/automation/sessions/{session_id}/resume - Resume a paused session
#[utoipa::path(
    post,
    path = "/v1/automation/sessions/{session_id}/resume",
    params(
        ("session_id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session resumed", body = AutomationSession),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is not paused"),
        (status = 502, description = "Automation provider rejected the request")
    ),
    tag = "automation"
)]
pub async fn resume_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<AutomationSession>, StatusCode> {
    let session = state
        .engine
        .resume_session(session_id)
        .await
        .map_err(api_error)?;
    Ok(Json(session))
}

/// POST /v1/automation/sessions/{session_id}/stop - Stop a session
#[utoipa::path(
    post,
    path = "/v1/automation/sessions/{session_id}/stop",
    params(
        ("session_id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session stopped", body = AutomationSession),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session already finished"),
        (status = 502, description = "Automation provider rejected the request")
    ),
    tag = "automation"
)]
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<AutomationSession>, StatusCode> {
    let session = state
        .engine
        .stop_session(session_id)
        .await
        .map_err(api_error)?;
    Ok(Json(session))
}

/// GET /v1/automation/sessions/{session_id}/actions - List a session's actions
#[utoipa::path(
    get,
    path = "/v1/automation/sessions/{session_id}/actions",
    params(
        ("session_id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Actions in execution order", body = ListResponse<AutomationAction>),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "automation"
)]
pub async fn list_actions(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ListResponse<AutomationAction>>, StatusCode> {
    state
        .db
        .get_automation_session(session_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get automation session: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let rows = state.db.list_session_actions(session_id).await.map_err(|e| {
        tracing::error!("Failed to list session actions: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let actions: Vec<AutomationAction> = rows.into_iter().map(AutomationAction::from).collect();
    Ok(Json(ListResponse::new(actions)))
}

/// GET /v1/credits/{user_id} - Get a user's credit balance
#[utoipa::path(
    get,
    path = "/v1/credits/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Current balance", body = CreditBalance),
        (status = 500, description = "Internal server error")
    ),
    tag = "credits"
)]
pub async fn get_credits(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<CreditBalance>, StatusCode> {
    let credits_remaining = state.db.get_user_credits(user_id).await.map_err(|e| {
        tracing::error!("Failed to get user credits: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(CreditBalance {
        user_id,
        credits_remaining,
    }))
}

/// PUT /v1/credits/{user_id} - Set a user's credit balance
#[utoipa::path(
    put,
    path = "/v1/credits/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "User ID")
    ),
    request_body = SetCreditsRequest,
    responses(
        (status = 200, description = "Balance updated", body = CreditBalance),
        (status = 400, description = "Credits must be a finite, non-negative number"),
        (status = 500, description = "Internal server error")
    ),
    tag = "credits"
)]
pub async fn set_credits(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SetCreditsRequest>,
) -> Result<Json<CreditBalance>, StatusCode> {
    if !req.credits.is_finite() || req.credits < 0.0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let credits_remaining = state
        .db
        .set_user_credits(user_id, req.credits)
        .await
        .map_err(|e| {
            tracing::error!("Failed to set user credits: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(CreditBalance {
        user_id,
        credits_remaining,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_session_request_deserializes() {
        let json = format!(
            r#"{{"user_id": "{}", "instructions": "Book a table for two"}}"#,
            Uuid::now_v7()
        );
        let req: StartSessionRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.instructions, "Book a table for two");
    }

    #[test]
    fn test_credit_balance_serializes() {
        let balance = CreditBalance {
            user_id: Uuid::now_v7(),
            credits_remaining: 12.5,
        };
        let json = serde_json::to_value(&balance).unwrap();
        assert_eq!(json["credits_remaining"], 12.5);
    }
}
