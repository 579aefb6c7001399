//! Worldbook entities

use crate::core::string::contains_ignore_case;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One lore entry of a worldbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldbookEntry {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub secondary_keys: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl WorldbookEntry {
    pub fn new(id: impl Into<String>, comment: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            comment: comment.into(),
            keys: Vec::new(),
            secondary_keys: Vec::new(),
            disabled: false,
        }
    }

    pub fn with_keys(mut self, keys: &[&str]) -> Self {
        self.keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_secondary_keys(mut self, keys: &[&str]) -> Self {
        self.secondary_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Title used for table detection: the comment, or the first key.
    pub fn title(&self) -> &str {
        let comment = self.comment.trim();
        if !comment.is_empty() {
            return comment;
        }
        self.keys.first().map(|k| k.trim()).unwrap_or_default()
    }

    /// Whether any exclusion tag appears in a key, secondary key or the comment.
    pub fn matches_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().filter(|t| !t.trim().is_empty()).any(|tag| {
            let tag = tag.trim();
            contains_ignore_case(&self.comment, tag)
                || self.keys.iter().any(|k| contains_ignore_case(k, tag))
                || self.secondary_keys.iter().any(|k| contains_ignore_case(k, tag))
        })
    }
}

/// A named collection of entries, kept in stable id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worldbook {
    pub name: String,
    pub entries: Vec<WorldbookEntry>,
}

impl Worldbook {
    /// Build a worldbook, ordering entries numerically by id where possible.
    pub fn new(name: impl Into<String>, mut entries: Vec<WorldbookEntry>) -> Self {
        entries.sort_by(|a, b| compare_ids(&a.id, &b.id));
        Self {
            name: name.into(),
            entries,
        }
    }

    pub fn enabled_entries(&self) -> impl Iterator<Item = &WorldbookEntry> {
        self.entries.iter().filter(|e| e.is_enabled())
    }

    pub fn entry(&self, id: &str) -> Option<&WorldbookEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
