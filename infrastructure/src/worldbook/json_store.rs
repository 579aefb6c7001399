//! JSON worldbook directory store
//!
//! Each worldbook is stored as `<dir>/<name>.json`:
//!
//! ```json
//! {
//!   "entries": {
//!     "0": {
//!       "content": "The town sits on a river.",
//!       "comment": "Town",
//!       "key": ["town"],
//!       "keysecondary": ["river"],
//!       "disable": false
//!     }
//!   }
//! }
//! ```
//!
//! `secondary_keys` is accepted as an alias of `keysecondary`, and `entries`
//! may also be a list (ids then come from `uid` or the position).

use async_trait::async_trait;
use conclave_application::{WorldbookStore, WorldbookStoreError};
use conclave_domain::{Worldbook, WorldbookEntry};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RawWorldbook {
    #[serde(default)]
    entries: RawEntries,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntries {
    Map(BTreeMap<String, RawEntry>),
    List(Vec<RawEntry>),
}

impl Default for RawEntries {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    uid: Option<serde_json::Value>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    key: Vec<String>,
    #[serde(default, alias = "secondary_keys")]
    keysecondary: Vec<String>,
    #[serde(default)]
    disable: bool,
}

impl RawEntry {
    fn into_entry(self, id: String) -> WorldbookEntry {
        WorldbookEntry {
            id,
            content: self.content,
            comment: self.comment,
            keys: self.key,
            secondary_keys: self.keysecondary,
            disabled: self.disable,
        }
    }

    fn uid(&self) -> Option<String> {
        match self.uid.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Worldbook store reading `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct JsonWorldbookStore {
    dir: PathBuf,
}

impl JsonWorldbookStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parse one export. `name` becomes the worldbook name.
    pub fn parse(name: &str, json: &str) -> Result<Worldbook, WorldbookStoreError> {
        let raw: RawWorldbook =
            serde_json::from_str(json).map_err(|e| WorldbookStoreError::Parse {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let entries = match raw.entries {
            RawEntries::Map(map) => map
                .into_iter()
                .map(|(id, entry)| entry.into_entry(id))
                .collect(),
            RawEntries::List(list) => list
                .into_iter()
                .enumerate()
                .map(|(i, entry)| {
                    let id = entry.uid().unwrap_or_else(|| i.to_string());
                    entry.into_entry(id)
                })
                .collect(),
        };
        Ok(Worldbook::new(name, entries))
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, WorldbookStoreError> {
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\']);
        if invalid {
            return Err(WorldbookStoreError::Io {
                name: name.to_string(),
                message: "not a valid worldbook name".to_string(),
            });
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }
}

#[async_trait]
impl WorldbookStore for JsonWorldbookStore {
    async fn load(&self, name: &str) -> Result<Option<Worldbook>, WorldbookStoreError> {
        let path = self.path_of(name)?;
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Worldbook file {} not found", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(WorldbookStoreError::Io {
                    name: name.to_string(),
                    message: e.to_string(),
                });
            }
        };
        let book = Self::parse(name, &json)?;
        debug!("Loaded worldbook '{}' ({} entries)", name, book.entries.len());
        Ok(Some(book))
    }
}
