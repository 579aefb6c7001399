//! AI-call adapters
//!
//! With the `http` feature (on by default) this provides
//! [`OpenAiCompatibleCaller`], which talks to any OpenAI-compatible
//! `/chat/completions` endpoint.

#[cfg(feature = "http")]
mod openai;

#[cfg(feature = "http")]
pub use openai::OpenAiCompatibleCaller;
