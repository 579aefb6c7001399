//! Configuration store port
//!
//! The store is the only writer of endpoints, templates and bindings. It is
//! read once at the start of a turn and written only at binding-setup time.

use async_trait::async_trait;
use conclave_domain::ConfigSnapshot;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigStoreError {
    #[error("Config I/O error: {0}")]
    Io(String),

    #[error("Invalid config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> Result<ConfigSnapshot, ConfigStoreError>;

    /// Persist `snapshot`, replacing what was stored.
    async fn save(&self, snapshot: &ConfigSnapshot) -> Result<(), ConfigStoreError>;
}
