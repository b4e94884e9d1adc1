// Completion service client
//
// POST /v1/agent-completions with the full message history and per-turn
// context; the service owns prompt construction and model access. Error
// bodies are inspected for quota markers before anything else, because a
// quota failure must come back as QuotaExceeded so the retry policy skips it.

use async_trait::async_trait;

use switchboard_core::error::{OrchestratorError, Result};
use switchboard_core::traits::{CompletionClient, CompletionRequest, CompletionResponse};

use crate::client::GatewayClient;

const QUOTA_MARKERS: [&str; 2] = ["insufficient_quota", "exceeded your current quota"];

pub(crate) fn is_quota_error(body: &str) -> bool {
    QUOTA_MARKERS.iter().any(|marker| body.contains(marker))
}

#[async_trait]
impl CompletionClient for GatewayClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let response = self
            .authorize(self.http.post(self.endpoint("/v1/agent-completions")))
            .timeout(self.config.completion_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OrchestratorError::completion("completion request timed out")
                } else {
                    OrchestratorError::completion(format!("completion request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if is_quota_error(&body) {
                tracing::warn!(%status, "completion service reported quota exhaustion");
                return Err(OrchestratorError::quota(body));
            }

            return Err(match status.as_u16() {
                401 | 403 => OrchestratorError::auth(format!(
                    "completion service rejected credentials: {body}"
                )),
                402 => OrchestratorError::credits(body),
                _ => OrchestratorError::completion(format!(
                    "completion service error {status}: {body}"
                )),
            });
        }

        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| OrchestratorError::completion(format!("invalid completion response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GatewayConfig;
    use serde_json::json;
    use switchboard_core::retry::{retry_with, RetryPolicy};
    use switchboard_core::traits::{CompletionMessage, ContextData};
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![CompletionMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            }],
            agent_type: "main".to_string(),
            user_id: Uuid::now_v7(),
            context_data: ContextData::default(),
        }
    }

    #[tokio::test]
    async fn test_complete_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/agent-completions"))
            .and(body_partial_json(json!({ "agentType": "main" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "completion": "Hello there!",
                "modelUsed": "gpt-4o-mini"
            })))
            .mount(&server)
            .await;

        let client = GatewayClient::new(GatewayConfig::new(server.uri()));
        let response = client.complete(request()).await.unwrap();
        assert_eq!(response.completion, "Hello there!");
        assert_eq!(response.model_used.as_deref(), Some("gpt-4o-mini"));
        assert!(response.handoff_request.is_none());
    }

    #[tokio::test]
    async fn test_structured_handoff_parses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "completion": "Transferring you now.",
                "handoffRequest": { "targetAgent": "script", "reason": "dialogue work" }
            })))
            .mount(&server)
            .await;

        let client = GatewayClient::new(GatewayConfig::new(server.uri()));
        let response = client.complete(request()).await.unwrap();
        let handoff = response.handoff_request.unwrap();
        assert_eq!(handoff.target_agent, "script");
        assert_eq!(handoff.reason, "dialogue work");
    }

    #[tokio::test]
    async fn test_api_key_is_sent_as_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "completion": "ok" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client =
            GatewayClient::new(GatewayConfig::new(server.uri()).with_api_key("sk-test"));
        client.complete(request()).await.unwrap();
    }

    #[tokio::test]
    async fn test_quota_error_calls_service_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "You exceeded your current quota, please check your plan." }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GatewayClient::new(GatewayConfig::new(server.uri()));
        let result = retry_with(&RetryPolicy::completion(), "completion", || {
            let client = client.clone();
            async move { client.complete(request()).await }
        })
        .await;

        assert!(matches!(result, Err(OrchestratorError::QuotaExceeded(_))));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_insufficient_quota_marker_is_detected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "type": "insufficient_quota" }
            })))
            .mount(&server)
            .await;

        let client = GatewayClient::new(GatewayConfig::new(server.uri()));
        let result = client.complete(request()).await;
        assert!(matches!(result, Err(OrchestratorError::QuotaExceeded(_))));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_to_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "completion": "recovered" })),
            )
            .mount(&server)
            .await;

        let client = GatewayClient::new(GatewayConfig::new(server.uri()));
        let response = retry_with(&RetryPolicy::completion(), "completion", || {
            let client = client.clone();
            async move { client.complete(request()).await }
        })
        .await
        .unwrap();
        assert_eq!(response.completion, "recovered");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = GatewayClient::new(GatewayConfig::new(server.uri()));
        let result = client.complete(request()).await;
        assert!(matches!(result, Err(OrchestratorError::Auth(_))));
    }

    #[tokio::test]
    async fn test_payment_required_maps_to_credits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_string("chat credits exhausted"))
            .mount(&server)
            .await;

        let client = GatewayClient::new(GatewayConfig::new(server.uri()));
        let result = client.complete(request()).await;
        assert!(matches!(
            result,
            Err(OrchestratorError::InsufficientCredits(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_completion_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = GatewayClient::new(GatewayConfig::new(server.uri()));
        let result = client.complete(request()).await;
        assert!(matches!(result, Err(OrchestratorError::Completion(_))));
    }

    #[test]
    fn test_quota_markers() {
        assert!(is_quota_error("insufficient_quota"));
        assert!(is_quota_error(
            "You exceeded your current quota, please check your plan and billing details."
        ));
        assert!(!is_quota_error("rate limit exceeded"));
    }
}
