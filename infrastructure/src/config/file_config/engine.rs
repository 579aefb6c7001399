//! Engine configuration from TOML (`[engine]` section)

use conclave_application::EngineParams;
use conclave_domain::{ClassifierThresholds, ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw engine configuration from TOML
///
/// # Example
///
/// ```toml
/// [engine]
/// max_concurrency = 4          # 0 = unbounded
/// chunk_size = 12000           # chars, 0 = never chunk
/// max_chunks = 8
/// memory_retry_attempts = 3
/// memory_retry_backoff_ms = 500
///
/// [engine.classifier]
/// min_index_entries = 3
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileEngineConfig {
    pub max_concurrency: usize,
    pub chunk_size: usize,
    pub max_chunks: usize,
    pub memory_retry_attempts: u32,
    pub memory_retry_backoff_ms: u64,
    pub classifier: ClassifierThresholds,
}

impl Default for FileEngineConfig {
    fn default() -> Self {
        let params = EngineParams::default();
        Self {
            max_concurrency: params.max_concurrency,
            chunk_size: params.chunk_size,
            max_chunks: params.max_chunks,
            memory_retry_attempts: params.memory_retry_attempts,
            memory_retry_backoff_ms: params.memory_retry_backoff.as_millis() as u64,
            classifier: params.classifier,
        }
    }
}

impl FileEngineConfig {
    pub fn to_params(&self) -> EngineParams {
        EngineParams::default()
            .with_max_concurrency(self.max_concurrency)
            .with_chunking(self.chunk_size, self.max_chunks)
            .with_memory_retry(
                self.memory_retry_attempts.max(1),
                Duration::from_millis(self.memory_retry_backoff_ms),
            )
            .with_classifier(self.classifier)
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.memory_retry_attempts == 0 {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::InvalidValue {
                    field: "engine.memory_retry_attempts".to_string(),
                    value: "0".to_string(),
                },
                "engine.memory_retry_attempts: must be at least 1, using 1",
            ));
        }
        if self.classifier.min_index_entries == 0 || self.classifier.min_detail_entries == 0 {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::InvalidValue {
                    field: "engine.classifier".to_string(),
                    value: format!(
                        "min_index_entries={}, min_detail_entries={}",
                        self.classifier.min_index_entries, self.classifier.min_detail_entries
                    ),
                },
                "engine.classifier: a zero threshold classifies every worldbook as a table",
            ));
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_params() {
        let params = FileEngineConfig::default().to_params();
        let defaults = EngineParams::default();
        assert_eq!(params.max_concurrency, defaults.max_concurrency);
        assert_eq!(params.memory_retry_backoff, defaults.memory_retry_backoff);
    }

    #[test]
    fn test_zero_attempts_is_clamped_and_reported() {
        let config = FileEngineConfig {
            memory_retry_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.to_params().memory_retry_attempts, 1);
        assert_eq!(config.validate().len(), 1);
    }
}
