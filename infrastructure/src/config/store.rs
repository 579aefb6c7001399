//! TOML-backed configuration store
//!
//! [`FileConfigStore`] implements the [`ConfigStore`] port. Saving rewrites
//! the endpoints, templates and character settings of one file and keeps
//! its other sections.

use super::file_config::FileConfig;
use super::loader::ConfigLoader;
use async_trait::async_trait;
use conclave_application::{ConfigStore, ConfigStoreError};
use conclave_domain::ConfigSnapshot;
use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where [`FileConfigStore`] reads from.
enum ReadFrom {
    /// Only the file that is written.
    File,
    /// Every source, with an optional explicit `--config` file.
    Layered(Option<PathBuf>),
}

/// Configuration store over `conclave.toml`.
pub struct FileConfigStore {
    path: PathBuf,
    read_from: ReadFrom,
}

impl FileConfigStore {
    /// Store that reads and writes exactly `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_from: ReadFrom::File,
        }
    }

    /// Store that reads every config source (see [`ConfigLoader::load`])
    /// and writes to the explicit file, else the project file.
    pub fn layered(explicit: Option<PathBuf>) -> Self {
        Self {
            path: ConfigLoader::writable_path(explicit.as_deref()),
            read_from: ReadFrom::Layered(explicit),
        }
    }

    /// The file that [`ConfigStore::save`] writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<FileConfig, ConfigStoreError> {
        let result = match &self.read_from {
            ReadFrom::Layered(explicit) => ConfigLoader::load(explicit.as_deref()),
            ReadFrom::File => Self::read_file(&self.path),
        };
        result.map_err(|e| ConfigStoreError::Parse(e.to_string()))
    }

    fn read_file(path: &Path) -> Result<FileConfig, Box<figment::Error>> {
        if !path.exists() {
            debug!("Config file {} does not exist, using defaults", path.display());
            return Ok(FileConfig::default());
        }
        Figment::new()
            .merge(Serialized::defaults(FileConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(Box::new)
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<ConfigSnapshot, ConfigStoreError> {
        Ok(self.read()?.snapshot())
    }

    async fn save(&self, snapshot: &ConfigSnapshot) -> Result<(), ConfigStoreError> {
        let mut file = Self::read_file(&self.path)
            .map_err(|e| ConfigStoreError::Parse(e.to_string()))?;
        file.apply_snapshot(snapshot);

        let text = toml::to_string_pretty(&file)
            .map_err(|e| ConfigStoreError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigStoreError::Io(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| ConfigStoreError::Io(format!("{}: {}", self.path.display(), e)))?;

        info!("Saved configuration to {}", self.path.display());
        Ok(())
    }
}
