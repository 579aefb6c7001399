//! Progress sinks for the console

pub mod reporter;

pub use reporter::{ConsoleProgress, SimpleProgress};
