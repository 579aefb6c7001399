//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure and presentation adapters
//! must implement.

pub mod ai_caller;
pub mod config_store;
pub mod progress;
pub mod run_logger;
pub mod worldbook_store;
