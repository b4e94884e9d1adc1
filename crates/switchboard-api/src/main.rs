// Switchboard API server
// Decision: the automation engine runs in-process by default; the standalone
// worker binary covers deployments that split HTTP from automation.

mod automation;
mod common;
mod conversations;
mod custom_agents;
mod services;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use switchboard_browser::BrowserUseClient;
use switchboard_core::{
    ActionStatus, Attachment, AttachmentKind, AutomationAction, AutomationSession,
    CustomAgentProfile, HandoffRequest, Message, MessageRole, MessageStatus, SessionStatus, Task,
    TaskStatus,
};
use switchboard_gateway::GatewayClient;
use switchboard_storage::{Conversation, Database, PgAutomationStore};
use switchboard_worker::{AutomationEngine, EngineConfig};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use common::ListResponse;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        conversations::create_conversation,
        conversations::list_conversations,
        conversations::get_conversation,
        conversations::delete_conversation,
        conversations::send_message,
        conversations::list_messages,
        custom_agents::create_custom_agent,
        custom_agents::list_custom_agents,
        custom_agents::get_custom_agent,
        custom_agents::update_custom_agent,
        custom_agents::delete_custom_agent,
        automation::start_session,
        automation::list_sessions,
        automation::get_session,
        automation::pause_session,
        automation::resume_session,
        automation::stop_session,
        automation::list_actions,
        automation::get_credits,
        automation::set_credits,
    ),
    components(
        schemas(
            Conversation,
            Message, MessageRole, MessageStatus,
            Task, TaskStatus, HandoffRequest,
            Attachment, AttachmentKind,
            CustomAgentProfile,
            AutomationSession, SessionStatus,
            AutomationAction, ActionStatus,
            conversations::CreateConversationRequest,
            conversations::SendMessageRequest,
            custom_agents::CreateCustomAgentRequest,
            custom_agents::UpdateCustomAgentRequest,
            automation::StartSessionRequest,
            automation::SetCreditsRequest,
            automation::CreditBalance,
            ListResponse<Conversation>,
            ListResponse<Message>,
            ListResponse<CustomAgentProfile>,
            ListResponse<AutomationSession>,
            ListResponse<AutomationAction>,
        )
    ),
    tags(
        (name = "conversations", description = "Conversation management endpoints"),
        (name = "messages", description = "Message endpoints"),
        (name = "custom-agents", description = "Custom agent management endpoints"),
        (name = "automation", description = "Browser automation session endpoints"),
        (name = "credits", description = "Automation credit endpoints")
    ),
    info(
        title = "Switchboard API",
        version = "0.1.0",
        description = "API for multi-agent conversations, custom agents, and browser automation",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("switchboard-api starting...");

    dotenvy::dotenv().ok();

    // Initialize database
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?;
    let db = Database::from_url(&database_url)
        .await
        .context("Failed to connect to database")?;
    // Idempotent; whichever of api/worker starts first applies the schema.
    db.migrate().await.context("Failed to run migrations")?;
    tracing::info!("Connected to database");

    // The gateway fronts both completions and tool execution
    let gateway = Arc::new(GatewayClient::from_env());

    // The engine runs inside this process; the worker binary exists for
    // deployments that want the HTTP surface and automation split apart.
    let engine = Arc::new(AutomationEngine::new(
        Arc::new(BrowserUseClient::from_env()),
        Arc::new(PgAutomationStore::new(db.clone())),
        EngineConfig::from_env(),
    ));
    let attached = engine
        .recover()
        .await
        .context("Failed to recover automation sessions")?;
    tracing::info!(pollers = attached, "Automation engine ready");

    // Create module-specific states
    let conversations_state = conversations::AppState::new(db.clone(), gateway);
    let custom_agents_state = custom_agents::AppState::new(db.clone());
    let automation_state = automation::AppState {
        engine,
        db: db.clone(),
    };

    // Load API prefix from environment (default: empty)
    // Example: API_PREFIX="/api" results in routes like /api/v1/conversations
    let api_prefix = std::env::var("API_PREFIX").unwrap_or_default();
    if !api_prefix.is_empty() {
        tracing::info!(prefix = %api_prefix, "API prefix configured");
    }

    // Load CORS allowed origins from environment (optional)
    // Only needed when UI is served from a different origin than the API
    // Example: CORS_ALLOWED_ORIGINS="https://app.example.com,https://admin.example.com"
    let cors_origins: Vec<HeaderValue> = std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();

    if cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
    }

    // Build API routes
    let api_routes = Router::new()
        .merge(conversations::routes(conversations_state))
        .merge(custom_agents::routes(custom_agents_state))
        .merge(automation::routes(automation_state));

    // Build main router with health (not prefixed) and prefixed API routes
    let mut app = Router::new().route("/health", get(health));

    // Apply API prefix if configured
    app = app.merge(build_router_with_prefix(api_routes, &api_prefix));

    // Add Swagger UI
    let app =
        app.merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    // Add CORS layer only if origins are configured
    let app = if !cors_origins.is_empty() {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::ORIGIN,
                    header::CACHE_CONTROL,
                ])
                .allow_credentials(true),
        )
    } else {
        app
    };

    // Add tracing
    let app = app.layer(TraceLayer::new_for_http());

    // Start server
    let addr = "0.0.0.0:9000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Build router with optional API prefix (extracted for testing)
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_routes() -> Router {
        Router::new().route("/v1/test", get(|| async { "ok" }))
    }

    #[tokio::test]
    async fn test_api_prefix_empty() {
        let app = build_router_with_prefix(test_routes(), "");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_api_prefix_set() {
        let app = build_router_with_prefix(test_routes(), "/api");

        // Route should work with prefix
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 200);

        // Route should NOT work without prefix
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 404);
    }
}
