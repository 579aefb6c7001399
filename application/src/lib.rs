//! Application layer for conclave
//!
//! This crate contains use cases, port definitions, and application configuration.
//! It depends only on the domain layer.

pub mod cancellation;
pub mod concurrency;
pub mod config;
pub mod ports;
pub mod use_cases;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use cancellation::{CancelHandle, CancellationRegistry, TaskCancellation};
pub use concurrency::{ConcurrencyLimiter, LimiterPermit};
pub use config::EngineParams;
pub use ports::{
    ai_caller::{AiCallRequest, AiCaller, CallOptions, GatewayError},
    config_store::{ConfigStore, ConfigStoreError},
    progress::{NoProgress, ProgressSink},
    run_logger::{NoRunLogger, RunEvent, RunLogger},
    worldbook_store::{WorldbookStore, WorldbookStoreError},
};
pub use use_cases::auxiliary::AuxiliaryFanout;
pub use use_cases::build_tasks::{TaskBuilder, TaskPlan, effective_worldbooks};
pub use use_cases::execute_task::TaskExecutor;
pub use use_cases::repair_bindings::RepairBindingsUseCase;
pub use use_cases::run_cabinet::{
    CabinetDeliberation, CabinetError, CabinetInput, CabinetOutcome,
};
pub use use_cases::run_selective::{
    PrimaryMode, RunSelectiveError, RunSelectiveInput, SelectiveEngine, SelectiveOutcome,
    SelectiveOutput,
};
