// Custom agent CRUD HTTP routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use switchboard_core::CustomAgentProfile;
use switchboard_storage::{CreateCustomAgent, Database, UpdateCustomAgent};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::{ListResponse, UserScope};
use crate::services::CustomAgentService;

/// Request to create a custom agent
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateCustomAgentRequest {
    /// Owner of the agent
    pub user_id: Uuid,
    #[schema(example = "Poet")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// System instructions the agent answers under
    #[schema(example = "Answer every question in rhyming verse.")]
    pub instructions: String,
}

/// Request to update a custom agent. Only provided fields will be updated.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateCustomAgentRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// App state for custom agent routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CustomAgentService>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            service: Arc::new(CustomAgentService::new(db)),
        }
    }
}

/// Create custom agent routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/custom-agents",
            post(create_custom_agent).get(list_custom_agents),
        )
        .route(
            "/v1/custom-agents/{agent_id}",
            get(get_custom_agent)
                .patch(update_custom_agent)
                .delete(delete_custom_agent),
        )
        .with_state(state)
}

/// POST /v1/custom-agents - Create a new custom agent
#[utoipa::path(
    post,
    path = "/v1/custom-agents",
    request_body = CreateCustomAgentRequest,
    responses(
        (status = 201, description = "Custom agent created successfully", body = CustomAgentProfile),
        (status = 400, description = "Missing name or instructions"),
        (status = 500, description = "Internal server error")
    ),
    tag = "custom-agents"
)]
pub async fn create_custom_agent(
    State(state): State<AppState>,
    Json(req): Json<CreateCustomAgentRequest>,
) -> Result<(StatusCode, Json<CustomAgentProfile>), StatusCode> {
    if req.name.trim().is_empty() || req.instructions.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let input = CreateCustomAgent {
        user_id: req.user_id,
        name: req.name,
        description: req.description,
        instructions: req.instructions,
    };

    let agent = state.service.create(input).await.map_err(|e| {
        tracing::error!("Failed to create custom agent: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /v1/custom-agents - List a user's custom agents
#[utoipa::path(
    get,
    path = "/v1/custom-agents",
    params(
        ("user_id" = Uuid, Query, description = "Owner to list agents for")
    ),
    responses(
        (status = 200, description = "List of custom agents", body = ListResponse<CustomAgentProfile>),
        (status = 500, description = "Internal server error")
    ),
    tag = "custom-agents"
)]
pub async fn list_custom_agents(
    State(state): State<AppState>,
    Query(scope): Query<UserScope>,
) -> Result<Json<ListResponse<CustomAgentProfile>>, StatusCode> {
    let agents = state.service.list(scope.user_id).await.map_err(|e| {
        tracing::error!("Failed to list custom agents: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(ListResponse::new(agents)))
}

/// GET /v1/custom-agents/{agent_id} - Get custom agent by ID
#[utoipa::path(
    get,
    path = "/v1/custom-agents/{agent_id}",
    params(
        ("agent_id" = Uuid, Path, description = "Custom agent ID")
    ),
    responses(
        (status = 200, description = "Custom agent found", body = CustomAgentProfile),
        (status = 404, description = "Custom agent not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "custom-agents"
)]
pub async fn get_custom_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<CustomAgentProfile>, StatusCode> {
    let agent = state
        .service
        .get(agent_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get custom agent: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(agent))
}

/// PATCH /v1/custom-agents/{agent_id} - Update custom agent
#[utoipa::path(
    patch,
    path = "/v1/custom-agents/{agent_id}",
    params(
        ("agent_id" = Uuid, Path, description = "Custom agent ID"),
        ("user_id" = Uuid, Query, description = "Owner of the agent")
    ),
    request_body = UpdateCustomAgentRequest,
    responses(
        (status = 200, description = "Custom agent updated successfully", body = CustomAgentProfile),
        (status = 404, description = "Custom agent not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "custom-agents"
)]
pub async fn update_custom_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Query(scope): Query<UserScope>,
    Json(req): Json<UpdateCustomAgentRequest>,
) -> Result<Json<CustomAgentProfile>, StatusCode> {
    let input = UpdateCustomAgent {
        name: req.name,
        description: req.description,
        instructions: req.instructions,
    };

    let agent = state
        .service
        .update(agent_id, scope.user_id, input)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update custom agent: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(agent))
}

/// DELETE /v1/custom-agents/{agent_id} - Delete custom agent
#[utoipa::path(
    delete,
    path = "/v1/custom-agents/{agent_id}",
    params(
        ("agent_id" = Uuid, Path, description = "Custom agent ID"),
        ("user_id" = Uuid, Query, description = "Owner of the agent")
    ),
    responses(
        (status = 204, description = "Custom agent deleted successfully"),
        (status = 404, description = "Custom agent not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "custom-agents"
)]
pub async fn delete_custom_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Query(scope): Query<UserScope>,
) -> Result<StatusCode, StatusCode> {
    let deleted = state
        .service
        .delete(agent_id, scope.user_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete custom agent: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_requires_name_and_instructions() {
        let json = format!(
            r#"{{"user_id": "{}", "name": "Poet", "instructions": "Rhyme."}}"#,
            Uuid::now_v7()
        );
        let req: CreateCustomAgentRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.name, "Poet");
        assert_eq!(req.description, None);
    }

    #[test]
    fn test_update_request_all_fields_optional() {
        let req: UpdateCustomAgentRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.name, None);
        assert_eq!(req.description, None);
        assert_eq!(req.instructions, None);

        let req: UpdateCustomAgentRequest =
            serde_json::from_str(r#"{"instructions": "Be brief."}"#).unwrap();
        assert_eq!(req.instructions.as_deref(), Some("Be brief."));
    }
}
