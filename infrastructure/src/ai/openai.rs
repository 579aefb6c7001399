//! OpenAI-compatible chat completions caller.
//!
//! One [`AiCallRequest`] maps to one `POST {url}/chat/completions` with a
//! system and a user message. Transient failures (timeouts, connection
//! errors, HTTP 429 and 5xx) are retried up to the endpoint's `retries`
//! count with a linear backoff. Cancellation wins over everything, including
//! a pending backoff.

use async_trait::async_trait;
use conclave_application::{AiCallRequest, AiCaller, GatewayError};
use conclave_domain::core::string::truncate;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Base unit of the linear backoff between retries.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Maximum length of an error body quoted in an error message.
const MAX_ERROR_BODY: usize = 300;

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

/// HTTP caller for OpenAI-compatible endpoints.
#[derive(Debug, Clone, Default)]
pub struct OpenAiCompatibleCaller {
    client: reqwest::Client,
}

impl OpenAiCompatibleCaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxy, TLS settings).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn chat_url(base: &str) -> String {
        let base = base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    fn body(request: &AiCallRequest) -> ChatApiRequest<'_> {
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(ApiMessage {
                role: "system",
                content: &request.system_prompt,
            });
        }
        messages.push(ApiMessage {
            role: "user",
            content: &request.user_prompt,
        });

        let options = &request.options;
        ChatApiRequest {
            model: &request.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            presence_penalty: options.presence_penalty,
            frequency_penalty: options.frequency_penalty,
        }
    }

    /// Pull the first choice's text out of a response body.
    fn parse_response(body: &str) -> Result<String, GatewayError> {
        let response: ChatApiResponse = serde_json::from_str(body)
            .map_err(|e| GatewayError::InvalidResponse(format!("Malformed JSON: {}", e)))?;

        if let Some(error) = response.error {
            return Err(GatewayError::RequestFailed(
                error.message.unwrap_or_else(|| "unknown API error".to_string()),
            ));
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| GatewayError::InvalidResponse("No choices in response".to_string()))
    }

    fn is_transient(error: &GatewayError) -> bool {
        matches!(
            error,
            GatewayError::Timeout | GatewayError::ConnectionError(_)
        )
    }

    async fn attempt(&self, request: &AiCallRequest) -> Result<String, GatewayError> {
        let options = &request.options;
        let mut builder = self
            .client
            .post(Self::chat_url(&options.url))
            .timeout(options.timeout)
            .json(&Self::body(request));
        if !options.api_key.is_empty() {
            builder = builder.bearer_auth(&options.api_key);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        Self::parse_response(&text)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else if e.is_connect() || e.is_request() {
        GatewayError::ConnectionError(e.to_string())
    } else if e.is_decode() || e.is_body() {
        GatewayError::InvalidResponse(e.to_string())
    } else {
        GatewayError::Other(e.to_string())
    }
}

/// Map a non-success status to an error quoting a clipped body.
///
/// 429 and 5xx map to `ConnectionError` so the retry loop picks them up.
fn status_error(status: StatusCode, body: &str) -> GatewayError {
    let message = format!("HTTP {}: {}", status, truncate(body, MAX_ERROR_BODY));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        GatewayError::ConnectionError(message)
    } else {
        GatewayError::RequestFailed(message)
    }
}

#[async_trait]
impl AiCaller for OpenAiCompatibleCaller {
    async fn call(
        &self,
        request: AiCallRequest,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        let attempts = request.options.retries + 1;
        let mut attempt = 1;

        loop {
            debug!("Calling model {} (attempt {}/{})", request.model, attempt, attempts);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GatewayError::Aborted),
                r = self.attempt(&request) => r,
            };

            match result {
                Err(e) if attempt < attempts && Self::is_transient(&e) => {
                    warn!("Model {} attempt {} failed: {}, retrying", request.model, attempt, e);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(GatewayError::Aborted),
                        _ = tokio::time::sleep(RETRY_BACKOFF * attempt) => {}
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_domain::{Endpoint, RenderedPrompt};

    fn request(system: &str) -> AiCallRequest {
        let endpoint = Endpoint::new("a", "Alpha", "gpt-4o-mini")
            .with_url("http://127.0.0.1:9/v1")
            .with_api_key("sk-test");
        AiCallRequest::new(
            &endpoint,
            RenderedPrompt {
                system: system.to_string(),
                user: "hello".to_string(),
            },
        )
    }

    #[test]
    fn test_chat_url() {
        assert_eq!(
            OpenAiCompatibleCaller::chat_url("https://api.example.com/v1/"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            OpenAiCompatibleCaller::chat_url("https://api.example.com/v1/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_body_skips_empty_system_message() {
        let req = request("");
        let body = serde_json::to_value(OpenAiCompatibleCaller::body(&req)).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");

        let req = request("You are a narrator.");
        let body = serde_json::to_value(OpenAiCompatibleCaller::body(&req)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_parse_response() {
        let ok = r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"}}]}"#;
        assert_eq!(OpenAiCompatibleCaller::parse_response(ok).unwrap(), "Hi there");

        let api_error = r#"{"error":{"message":"model not found"}}"#;
        assert_eq!(
            OpenAiCompatibleCaller::parse_response(api_error),
            Err(GatewayError::RequestFailed("model not found".to_string()))
        );

        assert!(matches!(
            OpenAiCompatibleCaller::parse_response(r#"{"choices":[]}"#),
            Err(GatewayError::InvalidResponse(_))
        ));
        assert!(matches!(
            OpenAiCompatibleCaller::parse_response("<html>"),
            Err(GatewayError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_status_error_clips_body_and_classifies() {
        let body = "错".repeat(400);
        match status_error(StatusCode::SERVICE_UNAVAILABLE, &body) {
            GatewayError::ConnectionError(message) => {
                assert!(message.starts_with("HTTP 503 Service Unavailable: 错"));
                assert!(message.ends_with("..."));
                assert!(message.len() < body.len());
            }
            other => panic!("expected a transient error, got {:?}", other),
        }
        assert!(OpenAiCompatibleCaller::is_transient(&status_error(
            StatusCode::TOO_MANY_REQUESTS,
            ""
        )));
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST, "bad model"),
            GatewayError::RequestFailed("HTTP 400 Bad Request: bad model".to_string())
        );
    }

    #[tokio::test]
    async fn test_cancelled_call_is_aborted() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = OpenAiCompatibleCaller::new()
            .call(request(""), &cancel)
            .await;
        assert_eq!(result, Err(GatewayError::Aborted));
    }
}
