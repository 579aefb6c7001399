//! Global concurrency gate for AI calls.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Bounded-parallelism gate shared by every call of one invocation.
///
/// Waiters are served in FIFO order (tokio's semaphore is fair). A limit of
/// 0 means unbounded.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Option<Arc<Semaphore>>,
    limit: usize,
}

/// Held while a call is in flight; the slot is released on drop.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: (limit > 0).then(|| Arc::new(Semaphore::new(limit))),
            limit,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn limit(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|_| self.limit)
    }

    /// Calls currently holding a permit (always 0 when unbounded).
    pub fn in_flight(&self) -> usize {
        self.semaphore
            .as_ref()
            .map_or(0, |s| self.limit - s.available_permits())
    }

    /// Wait for a free slot.
    ///
    /// Returns `None` when `cancel` fires first, including when it was
    /// already cancelled; a cancelled caller never holds a permit.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<LimiterPermit> {
        if cancel.is_cancelled() {
            return None;
        }
        let Some(semaphore) = &self.semaphore else {
            return Some(LimiterPermit { _permit: None });
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(semaphore).acquire_owned() => {
                permit.ok().map(|p| LimiterPermit { _permit: Some(p) })
            }
        }
    }
}
