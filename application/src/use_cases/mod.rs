//! Use cases
//!
//! Application-level operations that orchestrate domain logic.

pub mod auxiliary;
pub mod build_tasks;
pub mod execute_task;
pub mod repair_bindings;
pub mod run_cabinet;
pub mod run_selective;
pub(crate) mod shared;
