// Conversation CRUD HTTP routes
// Posting a user message runs a full agent turn before the response returns.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use switchboard_core::{AgentKind, Attachment, Message, RunnerConfig, TurnInput};
use switchboard_gateway::GatewayClient;
use switchboard_storage::{Conversation, Database};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::{api_error, ListResponse, UserScope};
use crate::services::{ChatService, ConversationService};

/// Request to create a conversation
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateConversationRequest {
    /// Owner of the conversation
    pub user_id: Uuid,
    /// Agent persona answering this conversation: a built-in name
    /// ("main", "script", "image", "tool", "scene") or a custom agent UUID.
    #[serde(default)]
    #[schema(example = "main")]
    pub agent_type: Option<String>,
    /// Human-readable title
    #[serde(default)]
    pub title: Option<String>,
}

/// Request to send a user message into a conversation
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    /// The user's input text
    #[schema(example = "Write me a two-line poem about rain")]
    pub content: String,
    /// Files attached to this message
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Tool the user explicitly picked, forwarded to the tool agent as a hint
    #[serde(default)]
    pub requested_tool: Option<String>,
}

/// App state for conversation routes
#[derive(Clone)]
pub struct AppState {
    pub conversations: Arc<ConversationService>,
    pub chat: Arc<ChatService>,
}

impl AppState {
    pub fn new(db: Database, gateway: Arc<GatewayClient>) -> Self {
        Self {
            conversations: Arc::new(ConversationService::new(db.clone())),
            chat: Arc::new(ChatService::new(db, gateway, RunnerConfig::default())),
        }
    }
}

/// Create conversation routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route(
            "/v1/conversations/{conversation_id}",
            get(get_conversation).delete(delete_conversation),
        )
        .route(
            "/v1/conversations/{conversation_id}/messages",
            post(send_message).get(list_messages),
        )
        .with_state(state)
}

/// POST /v1/conversations - Create a new conversation
#[utoipa::path(
    post,
    path = "/v1/conversations",
    request_body = CreateConversationRequest,
    responses(
        (status = 201, description = "Conversation created successfully", body = Conversation),
        (status = 400, description = "Unknown agent type"),
        (status = 500, description = "Internal server error")
    ),
    tag = "conversations"
)]
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), StatusCode> {
    let agent_type = req.agent_type.unwrap_or_else(|| "main".to_string());
    if AgentKind::parse(&agent_type).is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let conversation = state
        .conversations
        .create(req.user_id, &agent_type, req.title.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create conversation: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /v1/conversations - List a user's conversations
#[utoipa::path(
    get,
    path = "/v1/conversations",
    params(
        ("user_id" = Uuid, Query, description = "Owner to list conversations for")
    ),
    responses(
        (status = 200, description = "List of conversations", body = ListResponse<Conversation>),
        (status = 500, description = "Internal server error")
    ),
    tag = "conversations"
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(scope): Query<UserScope>,
) -> Result<Json<ListResponse<Conversation>>, StatusCode> {
    let conversations = state.conversations.list(scope.user_id).await.map_err(|e| {
        tracing::error!("Failed to list conversations: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(ListResponse::new(conversations)))
}

/// GET /v1/conversations/{conversation_id} - Get conversation by ID
#[utoipa::path(
    get,
    path = "/v1/conversations/{conversation_id}",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Conversation found", body = Conversation),
        (status = 404, description = "Conversation not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "conversations"
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Conversation>, StatusCode> {
    let conversation = state
        .conversations
        .get(conversation_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get conversation: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(conversation))
}

/// DELETE /v1/conversations/{conversation_id} - Delete conversation
#[utoipa::path(
    delete,
    path = "/v1/conversations/{conversation_id}",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID"),
        ("user_id" = Uuid, Query, description = "Owner of the conversation")
    ),
    responses(
        (status = 204, description = "Conversation deleted successfully"),
        (status = 404, description = "Conversation not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "conversations"
)]
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(scope): Query<UserScope>,
) -> Result<StatusCode, StatusCode> {
    let deleted = state
        .conversations
        .delete(conversation_id, scope.user_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete conversation: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// POST /v1/conversations/{conversation_id}/messages - Send a user message
///
/// Runs one agent turn synchronously; the response is the reply message the
/// turn produced, which may be an error-status message.
#[utoipa::path(
    post,
    path = "/v1/conversations/{conversation_id}/messages",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Turn completed, reply message returned", body = Message),
        (status = 400, description = "Empty message"),
        (status = 404, description = "Conversation not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "messages"
)]
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), StatusCode> {
    if req.content.trim().is_empty() && req.attachments.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let conversation = state
        .conversations
        .get(conversation_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get conversation: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let mut turn = TurnInput::new(req.content, conversation.user_id)
        .with_attachments(req.attachments);
    if let Some(tool) = req.requested_tool {
        turn = turn.with_requested_tool(tool);
    }

    let reply = state
        .chat
        .send(&conversation, turn)
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(reply)))
}

/// GET /v1/conversations/{conversation_id}/messages - List messages
#[utoipa::path(
    get,
    path = "/v1/conversations/{conversation_id}/messages",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "List of messages", body = ListResponse<Message>),
        (status = 404, description = "Conversation not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "messages"
)]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ListResponse<Message>>, StatusCode> {
    let _conversation = state
        .conversations
        .get(conversation_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get conversation: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let messages = state
        .conversations
        .messages(conversation_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list messages: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(ListResponse::new(messages)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_conversation_request_minimal() {
        let json = format!(r#"{{"user_id": "{}"}}"#, Uuid::now_v7());
        let req: CreateConversationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.agent_type, None);
        assert_eq!(req.title, None);
    }

    #[test]
    fn test_create_conversation_request_with_agent() {
        let json = format!(
            r#"{{"user_id": "{}", "agent_type": "script", "title": "Pilot draft"}}"#,
            Uuid::now_v7()
        );
        let req: CreateConversationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.agent_type.as_deref(), Some("script"));
        assert_eq!(req.title.as_deref(), Some("Pilot draft"));
    }

    #[test]
    fn test_send_message_request_defaults() {
        let json = r#"{"content": "hello"}"#;
        let req: SendMessageRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.content, "hello");
        assert!(req.attachments.is_empty());
        assert_eq!(req.requested_tool, None);
    }

    #[test]
    fn test_send_message_request_with_attachment() {
        let json = r#"{
            "content": "what is this?",
            "attachments": [{"name": "photo.png", "url": "https://cdn.example/p.png", "kind": "image"}]
        }"#;
        let req: SendMessageRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.attachments.len(), 1);
        assert_eq!(req.attachments[0].name, "photo.png");
    }
}
