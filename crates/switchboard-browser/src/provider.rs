// AutomationProvider implementation
//
// Endpoint layout follows the provider's API: POST run-task, PUT
// {pause,resume,stop}-task?task_id=, GET task/{id} for status, plus media,
// screenshot and action sub-resources. Responses are mapped into the core
// provider types here; nothing provider-shaped leaks past this module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use switchboard_core::error::{OrchestratorError, Result};
use switchboard_core::traits::{
    AutomationProvider, ProviderPhase, ProviderStep, ProviderTaskHandle, ProviderTaskStatus,
};

use crate::client::BrowserUseClient;

#[derive(Debug, Serialize)]
struct RunTaskRequest {
    task: String,
    save_browser_data: bool,
}

#[derive(Debug, Deserialize)]
struct RunTaskResponse {
    id: String,
    #[serde(default)]
    live_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskDetail {
    status: String,
    #[serde(default)]
    progress: Option<f32>,
    #[serde(default)]
    live_url: Option<String>,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    steps: Vec<TaskStep>,
}

#[derive(Debug, Deserialize)]
struct TaskStep {
    #[serde(default)]
    next_goal: Option<String>,
    #[serde(default)]
    evaluation_previous_goal: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    #[serde(default)]
    recordings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ScreenshotResponse {
    #[serde(default)]
    screenshot: Option<String>,
}

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    action: &'a str,
    parameters: &'a serde_json::Value,
}

impl From<TaskDetail> for ProviderTaskStatus {
    fn from(detail: TaskDetail) -> Self {
        // The provider reports the page per step; the newest one is where
        // the browser currently is.
        let current_url = detail.steps.iter().rev().find_map(|s| s.url.clone());
        let steps = detail
            .steps
            .into_iter()
            .map(|step| ProviderStep {
                action_type: step.next_goal.unwrap_or_else(|| "step".to_string()),
                details: step.evaluation_previous_goal.or(step.url),
            })
            .collect();

        ProviderTaskStatus {
            status: ProviderPhase::from(detail.status.as_str()),
            progress: detail.progress,
            current_url,
            live_url: detail.live_url,
            output: detail.output,
            steps,
        }
    }
}

impl BrowserUseClient {
    async fn control(&self, verb: &str, task_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("/api/v1/{verb}-task"));
        let response = self
            .send_with_backoff(|| {
                self.authorize(self.http.put(&url))
                    .query(&[("task_id", task_id)])
            })
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AutomationProvider for BrowserUseClient {
    async fn run_task(&self, instructions: &str) -> Result<ProviderTaskHandle> {
        let body = RunTaskRequest {
            task: instructions.to_string(),
            save_browser_data: true,
        };
        let url = self.endpoint("/api/v1/run-task");
        let response = self
            .send_with_backoff(|| self.authorize(self.http.post(&url)).json(&body))
            .await?;
        let response = Self::check(response).await?;

        let payload: RunTaskResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::provider(format!("invalid run-task response: {e}")))?;

        Ok(ProviderTaskHandle {
            task_id: payload.id,
            live_url: payload.live_url,
        })
    }

    async fn pause_task(&self, task_id: &str) -> Result<()> {
        self.control("pause", task_id).await
    }

    async fn resume_task(&self, task_id: &str) -> Result<()> {
        self.control("resume", task_id).await
    }

    async fn stop_task(&self, task_id: &str) -> Result<()> {
        self.control("stop", task_id).await
    }

    async fn task_status(&self, task_id: &str) -> Result<ProviderTaskStatus> {
        let url = self.endpoint(&format!("/api/v1/task/{task_id}"));
        let response = self
            .send_with_backoff(|| self.authorize(self.http.get(&url)))
            .await?;
        let response = Self::check(response).await?;

        let detail: TaskDetail = response
            .json()
            .await
            .map_err(|e| OrchestratorError::provider(format!("invalid task response: {e}")))?;
        Ok(detail.into())
    }

    async fn task_media(&self, task_id: &str) -> Result<Vec<String>> {
        let url = self.endpoint(&format!("/api/v1/task/{task_id}/media"));
        let response = self
            .send_with_backoff(|| self.authorize(self.http.get(&url)))
            .await?;
        let response = Self::check(response).await?;

        let payload: MediaResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::provider(format!("invalid media response: {e}")))?;
        Ok(payload.recordings)
    }

    async fn capture_screenshot(&self, task_id: &str) -> Result<String> {
        let url = self.endpoint(&format!("/api/v1/task/{task_id}/screenshot"));
        let response = self
            .send_with_backoff(|| self.authorize(self.http.get(&url)))
            .await?;
        let response = Self::check(response).await?;

        let payload: ScreenshotResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::provider(format!("invalid screenshot response: {e}")))?;

        match payload.screenshot {
            Some(data) if !data.is_empty() => {
                if data.starts_with("data:") {
                    Ok(data)
                } else {
                    Ok(format!("data:image/png;base64,{data}"))
                }
            }
            _ => Err(OrchestratorError::provider("no screenshot available")),
        }
    }

    async fn execute_action(
        &self,
        task_id: &str,
        action_type: &str,
        parameters: &serde_json::Value,
    ) -> Result<()> {
        let body = ActionRequest {
            action: action_type,
            parameters,
        };
        let url = self.endpoint(&format!("/api/v1/task/{task_id}/action"));
        let response = self
            .send_with_backoff(|| self.authorize(self.http.post(&url)).json(&body))
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BrowserUseConfig;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BrowserUseClient {
        BrowserUseClient::new(BrowserUseConfig::new(server.uri()))
    }

    #[tokio::test]
    async fn test_run_task_returns_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/run-task"))
            .and(body_partial_json(json!({ "task": "book a table" })))
            .and(header("Authorization", "Bearer bu-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "task-123",
                "live_url": "https://live.example.com/task-123"
            })))
            .mount(&server)
            .await;

        let client =
            BrowserUseClient::new(BrowserUseConfig::new(server.uri()).with_api_key("bu-key"));
        let handle = client.run_task("book a table").await.unwrap();
        assert_eq!(handle.task_id, "task-123");
        assert_eq!(
            handle.live_url.as_deref(),
            Some("https://live.example.com/task-123")
        );
    }

    #[tokio::test]
    async fn test_task_status_maps_phase_and_steps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/task/task-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "running",
                "live_url": "https://live",
                "steps": [
                    { "next_goal": "open the site", "url": "https://a.example.com" },
                    {
                        "next_goal": "fill the form",
                        "url": "https://b.example.com",
                        "evaluation_previous_goal": "site opened"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let status = client(&server).task_status("task-123").await.unwrap();
        assert_eq!(status.status, ProviderPhase::Running);
        assert_eq!(status.current_url.as_deref(), Some("https://b.example.com"));
        assert_eq!(status.steps.len(), 2);
        assert_eq!(status.steps[1].action_type, "fill the form");
        assert_eq!(status.steps[1].details.as_deref(), Some("site opened"));
    }

    #[tokio::test]
    async fn test_missing_task_is_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let result = client(&server).task_status("gone").await;
        assert!(matches!(result, Err(OrchestratorError::TaskExpired)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_absorbed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "status": "finished" })),
            )
            .mount(&server)
            .await;

        let status = client(&server).task_status("task-123").await.unwrap();
        assert_eq!(status.status, ProviderPhase::Finished);
    }

    #[tokio::test]
    async fn test_pause_uses_query_parameter() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/pause-task"))
            .and(query_param("task_id", "task-123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).pause_task("task-123").await.unwrap();
        server.verify().await;
    }

    #[tokio::test]
    async fn test_media_defaults_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/task/task-123/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let media = client(&server).task_media("task-123").await.unwrap();
        assert!(media.is_empty());
    }

    #[tokio::test]
    async fn test_media_lists_recordings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/task/task-123/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "recordings": ["https://cdn/rec-1.mp4", "https://cdn/rec-2.mp4"]
            })))
            .mount(&server)
            .await;

        let media = client(&server).task_media("task-123").await.unwrap();
        assert_eq!(media.len(), 2);
        assert_eq!(media[0], "https://cdn/rec-1.mp4");
    }

    #[tokio::test]
    async fn test_screenshot_becomes_data_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/task/task-123/screenshot"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "screenshot": "aGVsbG8=" })),
            )
            .mount(&server)
            .await;

        let screenshot = client(&server).capture_screenshot("task-123").await.unwrap();
        assert_eq!(screenshot, "data:image/png;base64,aGVsbG8=");
    }

    #[tokio::test]
    async fn test_empty_screenshot_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let result = client(&server).capture_screenshot("task-123").await;
        assert!(matches!(result, Err(OrchestratorError::Provider(_))));
    }

    #[tokio::test]
    async fn test_execute_action_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/task/task-123/action"))
            .and(body_partial_json(json!({ "action": "click" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .execute_action("task-123", "click", &json!({ "selector": "#submit" }))
            .await
            .unwrap();
        server.verify().await;
    }

    #[tokio::test]
    async fn test_provider_failure_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("browser pool exhausted"))
            .mount(&server)
            .await;

        let result = client(&server).run_task("anything").await;
        match result {
            Err(OrchestratorError::Provider(msg)) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("browser pool exhausted"));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }
}
