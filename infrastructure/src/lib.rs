//! Infrastructure layer for conclave
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: configuration files, worldbook exports,
//! the HTTP model caller and the structured run log.

pub mod ai;
pub mod config;
pub mod logging;
pub mod worldbook;

// Re-export commonly used types
#[cfg(feature = "http")]
pub use ai::OpenAiCompatibleCaller;
pub use config::{
    ConfigLoader, FileConfig, FileConfigStore, FileEngineConfig, FileOutputConfig,
    FileOutputFormat, FileWorldbooksConfig,
};
pub use logging::JsonlRunLogger;
pub use worldbook::JsonWorldbookStore;
