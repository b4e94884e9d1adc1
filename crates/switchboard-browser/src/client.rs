// Browser provider client
//
// Transport plumbing for the automation provider API. Two provider quirks are
// absorbed here: a 404 on any task endpoint means the provider has forgotten
// the task (mapped to TaskExpired), and 429s are retried in-place with a
// short backoff before becoming an error.

use std::time::Duration;

use reqwest::StatusCode;

use switchboard_core::error::{OrchestratorError, Result};
use switchboard_core::retry::RetryPolicy;

/// Configuration for the provider client
#[derive(Debug, Clone)]
pub struct BrowserUseConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

impl BrowserUseConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("SWITCHBOARD_BROWSER_URL")
            .unwrap_or_else(|_| "https://api.browser-use.com".to_string());

        Self {
            base_url,
            api_key: std::env::var("SWITCHBOARD_BROWSER_KEY").ok(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// HTTP client for the browser automation provider
#[derive(Debug, Clone)]
pub struct BrowserUseClient {
    pub(crate) http: reqwest::Client,
    pub(crate) config: BrowserUseConfig,
    pub(crate) backoff: RetryPolicy,
}

impl BrowserUseClient {
    pub fn new(config: BrowserUseConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            backoff: RetryPolicy::provider_backoff(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(BrowserUseConfig::from_env())
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    pub(crate) fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.timeout(self.config.request_timeout);
        match &self.config.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    /// Send a request, absorbing 429s with a 1s/2s backoff before giving up
    pub(crate) async fn send_with_backoff<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let response = build()
                .send()
                .await
                .map_err(|e| OrchestratorError::provider(format!("provider request failed: {e}")))?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS
                && attempt < self.backoff.max_attempts
            {
                let delay = self.backoff.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "provider rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Ok(response);
        }
    }

    /// Map a provider response to the error taxonomy
    pub(crate) async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(OrchestratorError::TaskExpired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::provider(format!(
                "provider error {status}: {body}"
            )));
        }
        Ok(response)
    }
}
