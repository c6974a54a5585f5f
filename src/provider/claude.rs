use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{normalize_response_text, ProviderError, RephraseProvider};

const DEFAULT_CLAUDE_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_CLAUDE_MODEL: &str = "claude-3-haiku-20240307";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl ClaudeConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            endpoint: DEFAULT_CLAUDE_ENDPOINT.to_string(),
            model: DEFAULT_CLAUDE_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClaudeProvider {
    client: Client,
    config: ClaudeConfig,
}

impl ClaudeProvider {
    pub fn new(config: ClaudeConfig) -> Result<Self, ProviderError> {
        info!(
            endpoint = %config.endpoint,
            model = %config.model,
            "Claude provider initialized"
        );
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|error| {
                ProviderError::Provider(format!("Unable to build HTTP client: {error}"))
            })?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl RephraseProvider for ClaudeProvider {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    async fn rephrase(&self, text: &str, prompt: &str) -> Result<String, ProviderError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let payload = ClaudeRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: vec![ClaudeMessage {
                role: "user",
                content: format!("{prompt}\n\n{text}"),
            }],
        };

        debug!(model = %self.config.model, "sending Claude rephrase request");
        let response = self
            .client
            .post(&self.config.endpoint)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let payload: ClaudeResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse(error.to_string()))?;

        let rephrased = payload
            .content
            .first()
            .map(|block| normalize_response_text(&block.text))
            .unwrap_or_default();

        if rephrased.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        Ok(rephrased)
    }
}

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ClaudeContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorEnvelope {
    error: ClaudeErrorBody,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorBody {
    #[serde(default)]
    message: Option<String>,
}

fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() || error.is_connect() {
        ProviderError::Network(error.to_string())
    } else {
        ProviderError::Provider(error.to_string())
    }
}

fn map_http_error(status: StatusCode, body: &str) -> ProviderError {
    let fallback_message = format!("Claude request failed with status {}", status.as_u16());
    let message = parse_error_message(body).unwrap_or(fallback_message);
    debug!(status = status.as_u16(), "mapped Claude HTTP error response");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Authentication(message),
        _ => ProviderError::Provider(message),
    }
}

fn parse_error_message(raw_body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ClaudeErrorEnvelope>(raw_body).ok()?;
    parsed.error.message.and_then(|message| {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use mockito::Server;

    use super::*;

    fn provider_for_test(server: &Server, api_key: &str) -> ClaudeProvider {
        ClaudeProvider::new(ClaudeConfig {
            api_key: api_key.to_string(),
            endpoint: format!("{}/v1/messages", server.url()),
            model: DEFAULT_CLAUDE_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout_secs: 5,
        })
        .expect("provider construction should succeed")
    }

    #[tokio::test]
    async fn returns_trimmed_first_content_block_on_success() {
        let mut server = Server::new_async().await;
        let request_mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "content": [
                        { "type": "text", "text": "  This is an example.\n" }
                    ],
                    "model": "claude-3-haiku-20240307",
                    "role": "assistant"
                }"#,
            )
            .create_async()
            .await;

        let provider = provider_for_test(&server, "test-key");
        let result = provider
            .rephrase("this is a test", "Rephrase this:")
            .await
            .expect("request should succeed");

        request_mock.assert_async().await;
        assert_eq!(result, "This is an example.");
    }

    #[tokio::test]
    async fn combines_prompt_and_text_in_a_single_user_message() {
        let mut server = Server::new_async().await;
        let request_mock = server
            .mock("POST", "/v1/messages")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "claude-3-haiku-20240307",
                "max_tokens": 1024,
                "messages": [
                    { "role": "user", "content": "Rephrase this:\n\nhello world" }
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":[{"type":"text","text":"Hello, world."}]}"#)
            .create_async()
            .await;

        let provider = provider_for_test(&server, "test-key");
        provider
            .rephrase("hello world", "Rephrase this:")
            .await
            .expect("request should succeed");

        request_mock.assert_async().await;
    }

    #[tokio::test]
    async fn returns_authentication_error_for_unauthorized_response() {
        let mut server = Server::new_async().await;
        let request_mock = server
            .mock("POST", "/v1/messages")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"type":"authentication_error","message":"invalid x-api-key"}}"#)
            .create_async()
            .await;

        let provider = provider_for_test(&server, "bad-key");
        let error = provider
            .rephrase("hello", "prompt")
            .await
            .expect_err("request should fail");

        request_mock.assert_async().await;
        assert_eq!(
            error,
            ProviderError::Authentication("invalid x-api-key".to_string())
        );
    }

    #[tokio::test]
    async fn maps_server_errors_to_provider_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(500)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"type":"api_error","message":"Overloaded"}}"#)
            .create_async()
            .await;

        let provider = provider_for_test(&server, "test-key");
        let error = provider
            .rephrase("hello", "prompt")
            .await
            .expect_err("request should fail");

        assert_eq!(error, ProviderError::Provider("Overloaded".to_string()));
    }

    #[tokio::test]
    async fn empty_content_is_an_empty_response_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":[{"type":"text","text":"   "}]}"#)
            .create_async()
            .await;

        let provider = provider_for_test(&server, "test-key");
        let error = provider
            .rephrase("hello", "prompt")
            .await
            .expect_err("request should fail");

        assert_eq!(error, ProviderError::EmptyResponse);
    }

    #[tokio::test]
    async fn blank_api_key_fails_before_any_request() {
        let server = Server::new_async().await;
        let provider = provider_for_test(&server, "  ");

        let error = provider
            .rephrase("hello", "prompt")
            .await
            .expect_err("request should fail");

        assert_eq!(error, ProviderError::MissingApiKey);
    }
}
