//! Output formatting for finished runs

pub mod console;

pub use console::ConsoleFormatter;
