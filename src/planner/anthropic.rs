//! Anthropic Messages API planner

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::client::{Planner, PlannerError, PlannerOutput, PlannerRequest};
use super::parser::{parse_response, render_messages, stop_reason};

/// Anthropic API base URL
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model to use
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default max tokens
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Configuration for the Anthropic planner
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub api_url: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(300),
            api_url: ANTHROPIC_API_URL.to_string(),
        }
    }
}

impl AnthropicConfig {
    /// Create a new config with a specific model
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Planner backed by the Anthropic Messages API
pub struct AnthropicPlanner {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl AnthropicPlanner {
    /// Create a new planner
    ///
    /// Reads ANTHROPIC_API_KEY from environment
    pub fn new(config: AnthropicConfig) -> Result<Self, PlannerError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| PlannerError::MissingApiKey {
            env_var: API_KEY_ENV.to_string(),
        })?;

        Self::with_api_key(api_key, config)
    }

    /// Create a planner with an explicit API key
    pub fn with_api_key(api_key: String, config: AnthropicConfig) -> Result<Self, PlannerError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            config,
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Cumulative (input, output) token usage
    pub fn total_usage(&self) -> (u64, u64) {
        (
            self.input_tokens.load(Ordering::Relaxed),
            self.output_tokens.load(Ordering::Relaxed),
        )
    }

    /// Build the request body for the Anthropic API
    fn build_request(&self, request: &PlannerRequest<'_>) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": render_messages(request.conversation),
        });

        if !request.system_prompt.is_empty() {
            body["system"] = json!(request.system_prompt);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request.tools.iter().map(|t| t.to_planner_definition()).collect();
            body["tools"] = json!(tools);
        }

        body
    }

    /// Send a request to the Anthropic API
    async fn send_request(&self, body: Value) -> Result<Value, PlannerError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(PlannerError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PlannerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PlannerError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    fn record_usage(&self, body: &Value) {
        if let Some(u) = body.get("usage") {
            let input = u["input_tokens"].as_u64().unwrap_or(0);
            let output = u["output_tokens"].as_u64().unwrap_or(0);
            self.input_tokens.fetch_add(input, Ordering::Relaxed);
            self.output_tokens.fetch_add(output, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl Planner for AnthropicPlanner {
    async fn plan(&self, request: &PlannerRequest<'_>) -> Result<PlannerOutput, PlannerError> {
        let body = self.build_request(request);
        let response = self.send_request(body).await?;
        self.record_usage(&response);
        tracing::debug!(
            model = %self.config.model,
            stop_reason = stop_reason(&response).unwrap_or("unknown"),
            "Planner response received"
        );
        parse_response(&response, request.conversation)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

impl std::fmt::Debug for AnthropicPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicPlanner")
            .field("model", &self.config.model)
            .field("max_tokens", &self.config.max_tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Conversation;
    use crate::tools::ToolDescriptor;
    use crate::tools::schema::{ParamKind, ParamSpec};

    fn planner() -> AnthropicPlanner {
        AnthropicPlanner::with_api_key("test-key".to_string(), AnthropicConfig::default()).unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = AnthropicConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.api_url, ANTHROPIC_API_URL);
    }

    #[test]
    fn test_config_with_model() {
        let config = AnthropicConfig::with_model("claude-3-haiku-20240307");
        assert_eq!(config.model, "claude-3-haiku-20240307");
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_planner_without_api_key() {
        let original = std::env::var(API_KEY_ENV).ok();
        // SAFETY: This test restores the var before returning
        unsafe {
            std::env::remove_var(API_KEY_ENV);
        }

        let result = AnthropicPlanner::new(AnthropicConfig::default());
        assert!(matches!(result, Err(PlannerError::MissingApiKey { .. })));

        if let Some(key) = original {
            // SAFETY: Restoring the environment variable to its original state
            unsafe {
                std::env::set_var(API_KEY_ENV, key);
            }
        }
    }

    #[test]
    fn test_build_request_basic() {
        let planner = planner();
        let conversation = Conversation::new("Hello");
        let request = PlannerRequest {
            system_prompt: "You are helpful",
            conversation: &conversation,
            tools: &[],
        };

        let body = planner.build_request(&request);

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["system"], "You are helpful");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_build_request_with_tools() {
        let planner = planner();
        let conversation = Conversation::new("Read foo.txt");
        let tools = vec![
            ToolDescriptor::new("read_file", "Read a file")
                .param(ParamSpec::required("path", ParamKind::String)),
        ];
        let request = PlannerRequest {
            system_prompt: "",
            conversation: &conversation,
            tools: &tools,
        };

        let body = planner.build_request(&request);

        assert!(body.get("system").is_none());
        assert!(body["tools"].is_array());
        assert_eq!(body["tools"][0]["name"], "read_file");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["tools"][0]["input_schema"]["required"][0], "path");
    }

    #[test]
    fn test_record_usage() {
        let planner = planner();
        planner.record_usage(&json!({"usage": {"input_tokens": 10, "output_tokens": 4}}));
        planner.record_usage(&json!({"usage": {"input_tokens": 5}}));
        assert_eq!(planner.total_usage(), (15, 4));
    }

    #[test]
    fn test_debug_hides_key() {
        let debug = format!("{:?}", planner());
        assert!(debug.contains(DEFAULT_MODEL));
        assert!(!debug.contains("test-key"));
    }
}
