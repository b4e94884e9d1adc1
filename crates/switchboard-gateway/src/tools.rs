// Tool execution service client
//
// POST /v1/tool-executions, 60 second budget per call. A tool that declines
// the request comes back 200 with success=false and passes through untouched;
// only transport and service failures become errors here.

use async_trait::async_trait;

use switchboard_core::error::{OrchestratorError, Result};
use switchboard_core::traits::{ToolExecutor, ToolInvocation, ToolOutcome};

use crate::client::GatewayClient;

#[async_trait]
impl ToolExecutor for GatewayClient {
    async fn execute(&self, invocation: ToolInvocation) -> Result<ToolOutcome> {
        let response = self
            .authorize(self.http.post(self.endpoint("/v1/tool-executions")))
            .timeout(self.config.tool_timeout)
            .json(&invocation)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OrchestratorError::tool(format!(
                        "tool '{}' timed out after {:?}",
                        invocation.tool_name, self.config.tool_timeout
                    ))
                } else {
                    OrchestratorError::tool(format!("tool request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::tool(format!(
                "tool service error {status}: {body}"
            )));
        }

        response
            .json::<ToolOutcome>()
            .await
            .map_err(|e| OrchestratorError::tool(format!("invalid tool response: {e}")))
    }
}
