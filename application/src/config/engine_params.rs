//! Engine parameters: invocation-wide execution control.
//!
//! [`EngineParams`] groups the static knobs of the selective engine that are
//! not part of any character's settings: the global concurrency cap, chunking
//! limits, memory retry policy and table classifier thresholds.

use conclave_domain::ClassifierThresholds;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution control parameters for [`SelectiveEngine`](crate::use_cases::run_selective::SelectiveEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineParams {
    /// Maximum number of AI calls in flight. 0 means unbounded.
    pub max_concurrency: usize,
    /// Worldbook content longer than this many chars is chunked. 0 disables chunking.
    pub chunk_size: usize,
    /// Chunks beyond this count are dropped with a warning. 0 means no cap.
    pub max_chunks: usize,
    /// Attempts per memory source before it degrades to no contribution.
    pub memory_retry_attempts: u32,
    /// Linear backoff step between memory attempts (attempt × step).
    pub memory_retry_backoff: Duration,
    pub classifier: ClassifierThresholds,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            chunk_size: 12_000,
            max_chunks: 8,
            memory_retry_attempts: 3,
            memory_retry_backoff: Duration::from_millis(500),
            classifier: ClassifierThresholds::default(),
        }
    }
}

impl EngineParams {
    // ==================== Builder Methods ====================

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_chunking(mut self, chunk_size: usize, max_chunks: usize) -> Self {
        self.chunk_size = chunk_size;
        self.max_chunks = max_chunks;
        self
    }

    pub fn with_memory_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.memory_retry_attempts = attempts;
        self.memory_retry_backoff = backoff;
        self
    }

    pub fn with_classifier(mut self, thresholds: ClassifierThresholds) -> Self {
        self.classifier = thresholds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = EngineParams::default();
        assert_eq!(params.max_concurrency, 4);
        assert_eq!(params.memory_retry_attempts, 3);
        assert_eq!(params.memory_retry_backoff, Duration::from_millis(500));
    }

    #[test]
    fn test_builder() {
        let params = EngineParams::default()
            .with_max_concurrency(0)
            .with_chunking(100, 2)
            .with_memory_retry(1, Duration::ZERO);
        assert_eq!(params.max_concurrency, 0);
        assert_eq!(params.chunk_size, 100);
        assert_eq!(params.max_chunks, 2);
        assert_eq!(params.memory_retry_attempts, 1);
    }
}
