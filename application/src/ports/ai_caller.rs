//! AI-call port
//!
//! Defines the interface for sending one rendered prompt to one endpoint.
//! Transport details (HTTP, retries, provider quirks) live in the adapter.

use async_trait::async_trait;
use conclave_domain::{Endpoint, RenderedPrompt};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur during an AI call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The call was cancelled through its token. Not a failure.
    #[error("Aborted")]
    Aborted,

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Other error: {0}")]
    Other(String),
}

impl GatewayError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, GatewayError::Aborted)
    }
}

/// Per-call transport settings taken from the endpoint.
#[derive(Clone, PartialEq)]
pub struct CallOptions {
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub retries: u32,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl CallOptions {
    pub fn for_endpoint(endpoint: &Endpoint) -> Self {
        let t = &endpoint.tunables;
        Self {
            url: endpoint.url.clone(),
            api_key: endpoint.api_key.clone(),
            timeout: endpoint.timeout(),
            retries: endpoint.retries,
            max_tokens: t.max_tokens,
            temperature: t.temperature,
            top_p: t.top_p,
            presence_penalty: t.presence_penalty,
            frequency_penalty: t.frequency_penalty,
        }
    }
}

impl std::fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOptions")
            .field("url", &self.url)
            .field("api_key", &"***")
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

/// One call to the external model.
#[derive(Debug, Clone)]
pub struct AiCallRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub options: CallOptions,
}

impl AiCallRequest {
    pub fn new(endpoint: &Endpoint, prompt: RenderedPrompt) -> Self {
        Self {
            model: endpoint.model.clone(),
            system_prompt: prompt.system,
            user_prompt: prompt.user,
            options: CallOptions::for_endpoint(endpoint),
        }
    }
}

/// Gateway to the model backends.
///
/// Implementations must return [`GatewayError::Aborted`] once `cancel` fires,
/// and must not report a cancelled call as any other error.
#[async_trait]
pub trait AiCaller: Send + Sync {
    async fn call(
        &self,
        request: AiCallRequest,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError>;
}
