//! Domain layer for conclave
//!
//! This crate contains the entities, value objects and pure functions of the
//! selective orchestration engine. It has no dependencies on async runtimes,
//! I/O, or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Selective mode
//!
//! A user turn is fanned out to several independent LLM endpoints. Each
//! endpoint receives the worldbook text bound to it and runs every prompt
//! template bound to it, exactly once:
//!
//! - **Endpoint**: one configured LLM backend
//! - **Binding**: endpoint → worldbooks/entries, template → endpoints
//! - **Task unit**: one (endpoint, template) pair for this turn
//!
//! ## Cabinet
//!
//! An optional deliberation protocol replacing the plain fan-out: scholars
//! draft in parallel, review each other for up to five rounds, and a chair
//! merges the result.

pub mod assembly;
pub mod binding;
pub mod cabinet;
pub mod config;
pub mod core;
pub mod endpoint;
pub mod prompt;
pub mod settings;
pub mod task;
pub mod validation;
pub mod worldbook;

// Re-export commonly used types
pub use assembly::{
    Assembly, AssemblyNote, AuxiliaryKind, AuxiliaryResult, ResultAssembler, combine_labeled,
};
pub use binding::{
    BindingMap, BindingRepairReport, BindingSource, EndpointBinding, SelectedTemplate,
    TemplateSelection, live_binding, repair_bindings, select_primary_templates,
};
pub use cabinet::{CabinetPhase, CabinetSeat, CabinetState, ScholarOutput};
pub use config::OutputFormat;
pub use core::error::DomainError;
pub use endpoint::{Endpoint, EndpointId, Tunables};
pub use prompt::{PromptRenderer, PromptTemplate, RenderInput, RenderedPrompt};
pub use settings::{
    AggregatorSettings, AuxModuleSettings, AuxiliarySettings, CabinetMode, CabinetSettings,
    CharacterSettings, ConfigSnapshot, MemorySettings, MemorySource, OutputTags,
};
pub use task::{ChunkPlan, TaskKey, TaskOutcome, TaskReport, TaskStatus, TaskUnit};
pub use validation::{ConfigIssue, ConfigIssueCode, Severity, has_errors};
pub use worldbook::{
    ClassifierThresholds, PatternTableClassifier, TableClassifier, TableLayout, Worldbook,
    WorldbookBlock, WorldbookEntry,
};
