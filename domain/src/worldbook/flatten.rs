//! Flattening a worldbook into prompt blocks.

use super::classifier::TableClassifier;
use super::entities::{Worldbook, WorldbookEntry};
use std::collections::BTreeSet;

/// One block of worldbook text destined for a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldbookBlock {
    pub worldbook: String,
    pub entry_id: String,
    pub title: String,
    pub content: String,
}

impl WorldbookBlock {
    fn from_entry(book: &str, entry: &WorldbookEntry) -> Self {
        Self {
            worldbook: book.to_string(),
            entry_id: entry.id.clone(),
            title: entry.title().to_string(),
            content: entry.content.trim().to_string(),
        }
    }
}

/// Flatten `book` into blocks.
///
/// * `assigned` restricts the candidates to explicitly assigned entry ids;
///   `None` or an empty set means every enabled entry.
/// * Entries matching an exclusion tag never produce a block.
/// * Table-like books yield one block per column: the column's index entry
///   when it is a candidate, otherwise its longest candidate entry.
/// * Entries with blank content are skipped.
pub fn flatten_worldbook(
    book: &Worldbook,
    assigned: Option<&BTreeSet<String>>,
    excluded_tags: &[String],
    classifier: &dyn TableClassifier,
) -> Vec<WorldbookBlock> {
    let enabled: Vec<&WorldbookEntry> = book.enabled_entries().collect();
    let assigned = assigned.filter(|ids| !ids.is_empty());

    let is_candidate = |entry: &WorldbookEntry| {
        assigned.is_none_or(|ids| ids.contains(&entry.id))
            && !entry.matches_any_tag(excluded_tags)
            && !entry.content.trim().is_empty()
    };

    if let Some(layout) = classifier.classify(&enabled) {
        return layout
            .columns
            .iter()
            .filter_map(|column| {
                let members: Vec<&WorldbookEntry> = column
                    .members
                    .iter()
                    .filter_map(|id| book.entry(id))
                    .filter(|e| e.is_enabled() && is_candidate(e))
                    .collect();

                let index = column
                    .index_entry
                    .as_deref()
                    .and_then(|id| members.iter().find(|e| e.id == id).copied());

                // max_by_key keeps the last maximum; fold to keep the first
                let chosen = index.or_else(|| {
                    members.iter().copied().fold(None, |best: Option<&WorldbookEntry>, e| {
                        match best {
                            Some(b) if b.content.len() >= e.content.len() => Some(b),
                            _ => Some(e),
                        }
                    })
                })?;

                let mut block = WorldbookBlock::from_entry(&book.name, chosen);
                block.title = column.name.clone();
                Some(block)
            })
            .collect();
    }

    enabled
        .into_iter()
        .filter(|e| is_candidate(e))
        .map(|e| WorldbookBlock::from_entry(&book.name, e))
        .collect()
}

/// Concatenate blocks of one worldbook, optionally under a name banner.
pub fn render_blocks(book_name: &str, blocks: &[WorldbookBlock], banner: bool) -> String {
    if blocks.is_empty() {
        return String::new();
    }
    let body = blocks
        .iter()
        .map(|b| b.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    if banner {
        format!("=== {} ===\n{}", book_name, body)
    } else {
        body
    }
}
