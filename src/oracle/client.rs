//! OpenAI-compatible chat completions client.
//!
//! # Configuration
//!
//! Settings come from [`crate::config`]:
//! - `SCENARIO_PILOT_LLM_ENDPOINT`: API endpoint URL
//! - `SCENARIO_PILOT_LLM_MODEL`: Model name
//! - `SCENARIO_PILOT_LLM_API_KEY`: Bearer credential
//! - `SCENARIO_PILOT_LLM_MAX_TOKENS`: Max tokens in response
//! - `SCENARIO_PILOT_LLM_TIMEOUT`: Request timeout (seconds)

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{Oracle, OracleError, OracleResult};
use crate::config;

/// Configuration for the oracle client
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name to use
    pub model: String,
    /// Bearer credential
    pub api_key: Option<String>,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Request timeout (seconds)
    pub timeout: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            endpoint: cfg.llm.endpoint.clone(),
            model: cfg.llm.model.clone(),
            api_key: cfg.llm.api_key.clone(),
            max_tokens: cfg.llm.max_tokens,
            timeout: cfg.llm.timeout,
        }
    }
}

impl OracleConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Hosted endpoints need a credential; loopback servers do not
    pub fn requires_credentials(&self) -> bool {
        let host = host_port(&self.endpoint);
        !(host.starts_with("localhost") || host.starts_with("127.0.0.1") || host.starts_with("[::1]"))
    }
}

/// Oracle backed by an OpenAI-compatible HTTP endpoint
#[derive(Debug, Clone)]
pub struct OpenAiOracle {
    config: OracleConfig,
    http: reqwest::Client,
}

impl OpenAiOracle {
    /// Build a client, failing immediately when a required credential is absent
    pub fn new(config: OracleConfig) -> OracleResult<Self> {
        if config.requires_credentials() && config.api_key.is_none() {
            return Err(OracleError::MissingCredentials);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| OracleError::ConnectionFailed(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn complete(&self, prompt: &str) -> OracleResult<String> {
        let request = serde_json::json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": prompt
            }],
            "max_tokens": self.config.max_tokens,
            "temperature": 0
        });

        debug!(model = %self.config.model, prompt_len = prompt.len(), "oracle request");

        let mut builder = self.http.post(&self.config.endpoint).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout(Duration::from_secs(self.config.timeout))
            } else {
                OracleError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");

        // Thinking models may put everything in reasoning_content
        let result = if content.is_empty() {
            body["choices"][0]["message"]["reasoning_content"]
                .as_str()
                .ok_or_else(|| OracleError::InvalidResponse("no message content".to_string()))?
        } else {
            content
        };

        Ok(result.to_string())
    }
}

/// Check if an oracle endpoint is reachable.
///
/// Any HTTP answer (even 4xx/5xx) counts as reachable; only connection
/// failures report `false`.
pub async fn check_health(endpoint: &str, timeout_secs: u64) -> bool {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
    {
        Ok(client) => client,
        Err(_) => return false,
    };
    let scheme = if endpoint.starts_with("https://") { "https" } else { "http" };
    let url = format!("{}://{}", scheme, host_port(endpoint));
    client.head(url).send().await.is_ok()
}

fn host_port(endpoint: &str) -> &str {
    let url = endpoint
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    url.split('/').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_oracle_config_builder() {
        let config = OracleConfig::new("http://localhost:8080/v1/chat/completions")
            .model("qwen2.5")
            .max_tokens(200)
            .timeout(30);

        assert_eq!(config.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(config.model, "qwen2.5");
        assert_eq!(config.max_tokens, 200);
        assert_eq!(config.timeout, 30);
        assert!(!config.requires_credentials());
    }

    #[test]
    fn test_hosted_endpoint_requires_key() {
        let mut config = OracleConfig::new("https://api.openai.com/v1/chat/completions");
        config.api_key = None;
        assert!(matches!(
            OpenAiOracle::new(config),
            Err(OracleError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn test_complete_reads_message_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer test-key");
                then.status(200).json_body(serde_json::json!({
                    "choices": [{ "message": { "content": "{\"actions\": []}" } }]
                }));
            })
            .await;

        let config = OracleConfig::new(server.url("/v1/chat/completions"))
            .model("test-model")
            .api_key("test-key");
        let oracle = OpenAiOracle::new(config).unwrap();

        let text = oracle.complete("hello").await.unwrap();
        assert_eq!(text, "{\"actions\": []}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_surfaces_status_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(500).body("boom");
            })
            .await;

        let oracle =
            OpenAiOracle::new(OracleConfig::new(server.url("/v1/chat/completions"))).unwrap();
        let err = oracle.complete("hello").await.unwrap_err();
        assert!(matches!(err, OracleError::Status { status: 500, .. }));
        assert!(!err.is_fatal());
    }
}
