//! Task units
//!
//! A [`TaskUnit`] is one executable (endpoint, template) pair for the current
//! turn. Units are created by the task builder, executed once, and dropped
//! at the end of the invocation.

pub mod chunking;
pub mod entities;

pub use chunking::{ChunkPlan, merge_chunk_results, segment_banner, split_content};
pub use entities::{TaskKey, TaskOutcome, TaskReport, TaskStatus, TaskUnit};
