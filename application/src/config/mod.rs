//! Application-level configuration.
//!
//! - [`EngineParams`]: concurrency cap, chunking, memory retry, classifier thresholds

pub mod engine_params;

pub use engine_params::EngineParams;
