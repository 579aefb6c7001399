//! Presentation layer for conclave
//!
//! This crate contains the CLI definition, the console progress sinks
//! and the output formatter.

pub mod cli;
pub mod output;
pub mod progress;

// Re-export commonly used types
pub use cli::commands::{Cli, OutputFormatArg};
pub use output::console::ConsoleFormatter;
pub use progress::reporter::{ConsoleProgress, SimpleProgress};
