//! OpenAI API Provider
//!
//! Chat-completions backend for OpenAI models and Azure OpenAI deployments.
//! Both speak the same request/response body; they differ in URL layout
//! and authentication header.

use crate::conversation::{Role, Turn};
use crate::llm::retry_utils::{self, RetryConfig};
use crate::llm::{Backend, GenerationSettings, LlmError, LlmResponse, TokenUsage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default base URL for the public OpenAI API
pub const API_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Azure OpenAI REST API version
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// Where requests go and how they authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `{base_url}/chat/completions` with a bearer token
    OpenAI { base_url: String },

    /// `{endpoint}/openai/deployments/{deployment}/chat/completions` with an `api-key` header
    Azure {
        endpoint: String,
        api_version: String,
    },
}

/// OpenAI chat request structure
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// OpenAI chat response structure
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<OpenAIUsage> for TokenUsage {
    fn from(usage: OpenAIUsage) -> Self {
        TokenUsage::new(
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens,
        )
    }
}

/// Implementation of the completion backend for OpenAI-style chat APIs
pub struct OpenAIBackend {
    api_key: String,
    client: reqwest::Client,
    model_name: String,
    endpoint: Endpoint,
    retry: RetryConfig,
}

impl OpenAIBackend {
    /// Create a backend for the public OpenAI API
    pub fn new(api_key: String, model_name: String) -> Result<Self, LlmError> {
        Self::with_endpoint(
            api_key,
            model_name,
            Endpoint::OpenAI {
                base_url: API_BASE_URL.to_string(),
            },
        )
    }

    /// Create a backend for an Azure OpenAI deployment
    pub fn azure(
        api_key: String,
        deployment: String,
        endpoint: String,
        api_version: String,
    ) -> Result<Self, LlmError> {
        Self::with_endpoint(
            api_key,
            deployment,
            Endpoint::Azure {
                endpoint,
                api_version,
            },
        )
    }

    pub fn with_endpoint(
        api_key: String,
        model_name: String,
        endpoint: Endpoint,
    ) -> Result<Self, LlmError> {
        let retry = retry_utils::create_standard_retry_config();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(retry.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            model_name,
            endpoint,
            retry,
        })
    }

    /// Override the retry policy
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn chat_url(&self) -> String {
        match &self.endpoint {
            Endpoint::OpenAI { base_url } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            Endpoint::Azure {
                endpoint,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                self.model_name,
                api_version
            ),
        }
    }

    /// Build the request body from the history and settings
    ///
    /// The settings' system prompt is only used when the history carries
    /// no system turn of its own.
    fn build_request<'a>(
        &'a self,
        turns: &'a [Turn],
        settings: &'a GenerationSettings,
    ) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(turns.len() + 1);

        let has_system_turn = turns.iter().any(|turn| turn.role() == Role::System);
        if !has_system_turn {
            if let Some(system_prompt) = settings.system_prompt.as_deref() {
                messages.push(ChatMessage {
                    role: Role::System.as_str(),
                    content: system_prompt,
                });
            }
        }

        messages.extend(turns.iter().map(|turn| ChatMessage {
            role: turn.role().as_str(),
            content: turn.content(),
        }));

        // Azure addresses the model through the deployment in the URL
        let model = match self.endpoint {
            Endpoint::OpenAI { .. } => Some(self.model_name.as_str()),
            Endpoint::Azure { .. } => None,
        };

        ChatCompletionRequest {
            model,
            messages,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
            frequency_penalty: settings.frequency_penalty,
            presence_penalty: settings.presence_penalty,
        }
    }
}

#[async_trait]
impl Backend for OpenAIBackend {
    async fn complete(
        &self,
        turns: &[Turn],
        settings: &GenerationSettings,
    ) -> Result<LlmResponse, LlmError> {
        let request_json = serde_json::to_value(self.build_request(turns, settings))?;
        let url = self.chat_url();
        debug!("Sending {} turns to {}", turns.len(), url);

        let prepare_request = || {
            let builder = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&request_json);
            match self.endpoint {
                Endpoint::OpenAI { .. } => {
                    builder.header("Authorization", format!("Bearer {}", self.api_key))
                }
                Endpoint::Azure { .. } => builder.header("api-key", &self.api_key),
            }
        };

        let response: ChatCompletionResponse =
            retry_utils::send_api_request_with_retry(prepare_request, &self.retry, self.name())
                .await?;

        let ChatCompletionResponse { choices, usage } = response;
        let choice = choices.into_iter().next().ok_or_else(|| {
            LlmError::ApiError("No choices returned from OpenAI API".to_string())
        })?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: usage.map(TokenUsage::from),
            finish_reason: choice.finish_reason,
        })
    }

    fn name(&self) -> &str {
        match self.endpoint {
            Endpoint::OpenAI { .. } => "openai",
            Endpoint::Azure { .. } => "azure",
        }
    }

    fn model(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            timeout_secs: 5,
            use_exponential: false,
        }
    }

    fn backend_for(server: &mockito::ServerGuard) -> OpenAIBackend {
        OpenAIBackend::with_endpoint(
            "test_key".to_string(),
            "gpt-4o".to_string(),
            Endpoint::OpenAI {
                base_url: server.url(),
            },
        )
        .unwrap()
        .with_retry_config(fast_retry())
    }

    fn full_settings() -> GenerationSettings {
        GenerationSettings {
            system_prompt: Some("You are terse.".to_string()),
            max_tokens: Some(1000),
            temperature: Some(0.5),
            top_p: Some(0.75),
            frequency_penalty: Some(0.0),
            presence_penalty: Some(0.0),
        }
    }

    #[test]
    fn test_request_prepends_settings_system_prompt() {
        let backend = OpenAIBackend::new("k".to_string(), "gpt-4o".to_string()).unwrap();
        let turns = vec![Turn::user("Hello")];
        let settings = full_settings();

        let body = serde_json::to_value(backend.build_request(&turns, &settings)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "You are terse."},
                    {"role": "user", "content": "Hello"}
                ],
                "max_tokens": 1000,
                "temperature": 0.5,
                "top_p": 0.75,
                "frequency_penalty": 0.0,
                "presence_penalty": 0.0
            })
        );
    }

    #[test]
    fn test_request_prefers_history_system_turn() {
        let backend = OpenAIBackend::new("k".to_string(), "gpt-4o".to_string()).unwrap();
        let turns = vec![
            Turn::system("From history"),
            Turn::user("Hello"),
            Turn::assistant("Hi there!", None),
            Turn::user("How are you?"),
        ];

        let body =
            serde_json::to_value(backend.build_request(&turns, &full_settings())).unwrap();
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(body["messages"][0]["content"], "From history");
    }

    #[test]
    fn test_request_omits_unset_settings() {
        let backend = OpenAIBackend::new("k".to_string(), "gpt-4o".to_string()).unwrap();
        let turns = vec![Turn::user("Hello")];

        let body = serde_json::to_value(
            backend.build_request(&turns, &GenerationSettings::default()),
        )
        .unwrap();
        assert_eq!(
            body,
            json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "Hello"}]
            })
        );
    }

    #[test]
    fn test_azure_url_and_body() {
        let backend = OpenAIBackend::azure(
            "k".to_string(),
            "my-deployment".to_string(),
            "https://example.openai.azure.com/".to_string(),
            DEFAULT_AZURE_API_VERSION.to_string(),
        )
        .unwrap();

        assert_eq!(
            backend.chat_url(),
            "https://example.openai.azure.com/openai/deployments/my-deployment/chat/completions?api-version=2024-06-01"
        );
        assert_eq!(backend.name(), "azure");

        let turns = vec![Turn::user("Hello")];
        let body = serde_json::to_value(
            backend.build_request(&turns, &GenerationSettings::default()),
        )
        .unwrap();
        assert!(body.get("model").is_none());
    }

    #[tokio::test]
    async fn test_complete_parses_reply_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test_key")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "ping"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "chatcmpl-1",
                    "object": "chat.completion",
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": "pong"},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 9, "completion_tokens": 1, "total_tokens": 10}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let backend = backend_for(&server);
        let response = backend
            .complete(&[Turn::user("ping")], &GenerationSettings::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "pong");
        assert_eq!(response.usage, Some(TokenUsage::new(9, 1, 10)));
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_complete_tolerates_missing_usage() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(
                json!({
                    "choices": [{"message": {"role": "assistant", "content": "ok"}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let response = backend_for(&server)
            .complete(&[Turn::user("hi")], &GenerationSettings::default())
            .await
            .unwrap();
        assert_eq!(response.content, "ok");
        assert!(response.usage.is_none());
    }

    #[tokio::test]
    async fn test_complete_surfaces_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("{\"error\":\"bad key\"}")
            .expect(1)
            .create_async()
            .await;

        let err = backend_for(&server)
            .complete(&[Turn::user("hi")], &GenerationSettings::default())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, LlmError::ApiError(ref msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_complete_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let err = backend_for(&server)
            .complete(&[Turn::user("hi")], &GenerationSettings::default())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, LlmError::ApiError(ref msg) if msg.contains("Max retries")));
    }

    #[tokio::test]
    async fn test_complete_reports_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_header("retry-after", "0")
            .expect(2)
            .create_async()
            .await;

        let err = backend_for(&server)
            .complete(&[Turn::user("hi")], &GenerationSettings::default())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(
            err,
            LlmError::RateLimitError {
                retry_after: Some(0)
            }
        ));
    }

    #[tokio::test]
    async fn test_complete_rejects_empty_choices() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(json!({"choices": []}).to_string())
            .create_async()
            .await;

        let err = backend_for(&server)
            .complete(&[Turn::user("hi")], &GenerationSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ApiError(_)));
    }
}
