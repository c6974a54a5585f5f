use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{normalize_response_text, ProviderError, RephraseProvider};

const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub request_timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        info!(
            endpoint = %config.endpoint,
            model = %config.model,
            "OpenAI provider initialized"
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
impl RephraseProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    async fn rephrase(&self, text: &str, prompt: &str) -> Result<String, ProviderError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        // The style prompt rides in the system message; the text to
        // rephrase is the user message.
        let payload = OpenAiRequest {
            model: &self.config.model,
            messages: vec![
                OpenAiMessage {
                    role: "system",
                    content: prompt.to_string(),
                },
                OpenAiMessage {
                    role: "user",
                    content: text.to_string(),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!(model = %self.config.model, "sending OpenAI rephrase request");
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let payload: OpenAiResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse(error.to_string()))?;

        let rephrased = payload
            .choices
            .first()
            .map(|choice| normalize_response_text(&choice.message.content))
            .unwrap_or_default();

        if rephrased.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        Ok(rephrased)
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
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
    let fallback_message = format!("OpenAI request failed with status {}", status.as_u16());
    let message = parse_error_message(body).unwrap_or(fallback_message);
    debug!(status = status.as_u16(), "mapped OpenAI HTTP error response");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Authentication(message),
        _ => ProviderError::Provider(message),
    }
}

fn parse_error_message(raw_body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<OpenAiErrorEnvelope>(raw_body).ok()?;
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

    fn provider_for_test(server: &Server, api_key: &str) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiConfig {
            api_key: api_key.to_string(),
            endpoint: format!("{}/v1/chat/completions", server.url()),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            request_timeout_secs: 5,
        })
        .expect("provider construction should succeed")
    }

    #[tokio::test]
    async fn returns_trimmed_first_choice_on_success() {
        let mut server = Server::new_async().await;
        let request_mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "choices": [
                        { "message": { "role": "assistant", "content": " This is an example. " } }
                    ]
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
    async fn sends_prompt_as_system_message_and_text_as_user_message() {
        let mut server = Server::new_async().await;
        let request_mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 1000,
                "temperature": 0.7,
                "messages": [
                    { "role": "system", "content": "Rephrase this:" },
                    { "role": "user", "content": "hello world" }
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"Hello, world."}}]}"#)
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
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"message":"Incorrect API key provided"}}"#)
            .create_async()
            .await;

        let provider = provider_for_test(&server, "bad-key");
        let error = provider
            .rephrase("hello", "prompt")
            .await
            .expect_err("request should fail");

        assert_eq!(
            error,
            ProviderError::Authentication("Incorrect API key provided".to_string())
        );
    }

    #[tokio::test]
    async fn missing_choices_is_an_empty_response_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
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
    async fn unparseable_error_body_falls_back_to_status_message() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let provider = provider_for_test(&server, "test-key");
        let error = provider
            .rephrase("hello", "prompt")
            .await
            .expect_err("request should fail");

        assert_eq!(
            error,
            ProviderError::Provider("OpenAI request failed with status 503".to_string())
        );
    }
}
