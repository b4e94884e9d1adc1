// Gateway client
//
// One reqwest client fronting both agent service endpoints. Endpoint paths
// are fixed; base URL, credentials and timeouts come from configuration.

use std::time::Duration;

/// Configuration for the gateway client
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub completion_timeout: Duration,
    pub tool_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            completion_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(60),
        }
    }

    /// Read configuration from the environment, with localhost defaults
    pub fn from_env() -> Self {
        let base_url = std::env::var("SWITCHBOARD_GATEWAY_URL")
            .unwrap_or_else(|_| "http://localhost:8787".to_string());

        Self {
            base_url,
            api_key: std::env::var("SWITCHBOARD_GATEWAY_KEY").ok(),
            completion_timeout: env_secs("SWITCHBOARD_COMPLETION_TIMEOUT_SECS", 120),
            tool_timeout: env_secs("SWITCHBOARD_TOOL_TIMEOUT_SECS", 60),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }
}

fn env_secs(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

/// HTTP client for the completion and tool execution services
#[derive(Debug, Clone)]
pub struct GatewayClient {
    pub(crate) http: reqwest::Client,
    pub(crate) config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(GatewayConfig::from_env())
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    pub(crate) fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = GatewayClient::new(GatewayConfig::new("http://localhost:8787/"));
        assert_eq!(
            client.endpoint("/v1/agent-completions"),
            "http://localhost:8787/v1/agent-completions"
        );
    }

    #[test]
    fn test_default_timeouts() {
        let config = GatewayConfig::new("http://x");
        assert_eq!(config.completion_timeout, Duration::from_secs(120));
        assert_eq!(config.tool_timeout, Duration::from_secs(60));
    }
}
