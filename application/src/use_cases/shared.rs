//! Shared helpers for use cases.
//!
//! Contains cancellation checking and the gated single-call helper used by
//! the cabinet chair, the aggregator and the auxiliary modules.

use crate::concurrency::ConcurrencyLimiter;
use crate::ports::ai_caller::{AiCallRequest, AiCaller, GatewayError};
use conclave_domain::{Endpoint, PromptRenderer, PromptTemplate, RenderInput};
use tokio_util::sync::CancellationToken;

/// Returns `Err(GatewayError::Aborted)` once `token` is cancelled.
pub(crate) fn check_cancelled(token: &CancellationToken) -> Result<(), GatewayError> {
    if token.is_cancelled() {
        return Err(GatewayError::Aborted);
    }
    Ok(())
}

/// `input` plus the endpoint metadata variables, unless the caller set them.
pub(crate) fn with_endpoint_vars(input: &RenderInput, endpoint: &Endpoint) -> RenderInput {
    let mut input = input.clone();
    input
        .extra_vars
        .entry("model_name".to_string())
        .or_insert_with(|| endpoint.model.clone());
    input
        .extra_vars
        .entry("endpoint_name".to_string())
        .or_insert_with(|| endpoint.display_name().to_string());
    input
}

/// Render `template` for `endpoint` and send it, holding a limiter permit
/// for the duration of the call.
pub(crate) async fn call_template(
    caller: &dyn AiCaller,
    limiter: &ConcurrencyLimiter,
    endpoint: &Endpoint,
    template: &PromptTemplate,
    input: &RenderInput,
    cancel: &CancellationToken,
) -> Result<String, GatewayError> {
    let Some(_permit) = limiter.acquire(cancel).await else {
        return Err(GatewayError::Aborted);
    };
    let prompt = PromptRenderer::render(template, &with_endpoint_vars(input, endpoint));
    let text = caller.call(AiCallRequest::new(endpoint, prompt), cancel).await?;
    // a result racing a cancellation is discarded
    check_cancelled(cancel)?;
    Ok(text)
}
