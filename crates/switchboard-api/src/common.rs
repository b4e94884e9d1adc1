// Common DTOs and error mapping for the public API

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use switchboard_core::OrchestratorError;
use utoipa::ToSchema;

/// Response wrapper for list endpoints.
/// All list endpoints return responses wrapped in a `data` field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListResponse<T> {
    /// Array of items returned by the list operation.
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// Scopes a request to one user. Auth is out of scope for this service,
/// so callers pass the user explicitly.
#[derive(Debug, Clone, Deserialize)]
pub struct UserScope {
    pub user_id: uuid::Uuid,
}

/// HTTP status a domain error surfaces as
pub fn error_status(e: &OrchestratorError) -> StatusCode {
    match e {
        OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::InsufficientCredits(_) => StatusCode::PAYMENT_REQUIRED,
        OrchestratorError::NotFound(_) | OrchestratorError::UnknownAgent(_) => {
            StatusCode::NOT_FOUND
        }
        OrchestratorError::InvalidTransition { .. } => StatusCode::CONFLICT,
        OrchestratorError::Provider(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Log a failed request and convert the error for the handler's response
pub fn api_error(e: OrchestratorError) -> StatusCode {
    let status = error_status(&e);
    if status.is_server_error() {
        tracing::error!(error = %e, "request failed");
    } else {
        tracing::debug!(error = %e, status = %status, "request rejected");
    }
    status
}
