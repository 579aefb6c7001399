//! Worldbook domain
//!
//! Worldbooks are named collections of lore entries. The orchestration engine
//! only consumes their flattened text; parsing of worldbook files belongs to
//! the worldbook store adapter.

pub mod classifier;
pub mod entities;
pub mod flatten;

pub use classifier::{
    ClassifierThresholds, PatternTableClassifier, TableClassifier, TableColumn, TableLayout,
};
pub use entities::{Worldbook, WorldbookEntry};
pub use flatten::{WorldbookBlock, flatten_worldbook, render_blocks};
