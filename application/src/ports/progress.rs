//! Progress sink port
//!
//! The engine pushes task lifecycle updates and cancel handles to the sink;
//! it never reads anything back. Rendering is entirely up to the
//! implementation (console bars, a UI panel, nothing).

use crate::cancellation::CancelHandle;
use conclave_domain::TaskStatus;

pub trait ProgressSink: Send + Sync {
    /// A new task entry appeared.
    fn add_task(&self, id: &str, label: &str, status: TaskStatus);

    /// Status change of an existing entry. `percent` is 0..=100.
    fn update_task(&self, id: &str, status: TaskStatus, percent: u8);

    /// Handle that aborts the single task `id`.
    fn set_cancel_handle(&self, _id: &str, _handle: CancelHandle) {}

    /// Handle that aborts the whole invocation.
    fn set_cancel_all_handle(&self, _handle: CancelHandle) {}
}

/// No-op progress sink for when progress reporting is not needed
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn add_task(&self, _id: &str, _label: &str, _status: TaskStatus) {}
    fn update_task(&self, _id: &str, _status: TaskStatus, _percent: u8) {}
}
