//! Worldbook store port

use async_trait::async_trait;
use conclave_domain::Worldbook;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorldbookStoreError {
    #[error("Failed to read worldbook '{name}': {message}")]
    Io { name: String, message: String },

    #[error("Malformed worldbook '{name}': {message}")]
    Parse { name: String, message: String },
}

/// Loads worldbooks by name.
#[async_trait]
pub trait WorldbookStore: Send + Sync {
    /// `Ok(None)` when no worldbook with that name exists.
    async fn load(&self, name: &str) -> Result<Option<Worldbook>, WorldbookStoreError>;
}
