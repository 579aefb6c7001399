//! Per-character settings and the configuration snapshot.
//!
//! - [`CharacterSettings`]: selective-mode switches, bindings and module toggles
//! - [`ConfigSnapshot`]: endpoints + prompt pool + settings, read-only during a run

pub mod character;
pub mod snapshot;

pub use character::{
    AggregatorSettings, AuxModuleSettings, AuxiliarySettings, CabinetMode, CabinetSettings,
    CharacterSettings, MemorySettings, MemorySource, OutputTags,
};
pub use snapshot::ConfigSnapshot;
