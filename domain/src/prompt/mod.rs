//! Prompt templates and rendering

pub mod renderer;
pub mod template;

pub use renderer::{PromptRenderer, RenderInput, RenderedPrompt};
pub use template::PromptTemplate;
