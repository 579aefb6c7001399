//! Table-like worldbook detection
//!
//! Some worldbooks encode a table through entry titles instead of free text:
//!
//! ```text
//! Index for Stats          <- column index entry
//! Detail: Stats - HP       <- detail entry of column "Stats"
//! Detail: Stats - MP
//! ```
//!
//! Such books are flattened to one block per column rather than one block per
//! entry. Detection is a heuristic, so it sits behind [`TableClassifier`] and
//! the thresholds are plain data.

use super::entities::WorldbookEntry;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

static DEFAULT_INDEX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*index\s+for\s+(.+?)\s*$").expect("Invalid index title regex")
});

static DEFAULT_DETAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*detail\s*[:：]\s*(.+?)\s+-\s+(.+?)\s*$")
        .expect("Invalid detail title regex")
});

/// Detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// A book with at least this many index entries is table-like.
    pub min_index_entries: usize,
    /// Otherwise it needs at least this many detail entries...
    pub min_detail_entries: usize,
    /// ...and one column named by at least this many of them. An indexed
    /// column reaching this many entries (index plus details) also suffices.
    pub min_repeated_column: usize,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            min_index_entries: 3,
            min_detail_entries: 5,
            min_repeated_column: 3,
        }
    }
}

/// One detected column and the entries that belong to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    /// Id of the column's index entry, if the book has one.
    pub index_entry: Option<String>,
    /// Ids of every entry in the column (index entry included), in book order.
    pub members: Vec<String>,
}

/// Columns of a table-like worldbook, in order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub columns: Vec<TableColumn>,
}

/// Decides whether a set of entries forms a table.
pub trait TableClassifier: Send + Sync {
    /// Returns the layout when the entries are table-like, `None` otherwise.
    fn classify(&self, entries: &[&WorldbookEntry]) -> Option<TableLayout>;
}

enum TitleKind {
    Index(String),
    Detail(String),
}

/// Regex-based classifier working on entry titles.
#[derive(Debug, Clone)]
pub struct PatternTableClassifier {
    thresholds: ClassifierThresholds,
    index_pattern: Regex,
    detail_pattern: Regex,
}

impl Default for PatternTableClassifier {
    fn default() -> Self {
        Self::new(ClassifierThresholds::default())
    }
}

impl PatternTableClassifier {
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self {
            thresholds,
            index_pattern: DEFAULT_INDEX_PATTERN.clone(),
            detail_pattern: DEFAULT_DETAIL_PATTERN.clone(),
        }
    }

    /// Replace the title patterns. The first capture group of both patterns
    /// must be the column name.
    pub fn with_patterns(mut self, index: &str, detail: &str) -> Result<Self, regex::Error> {
        self.index_pattern = Regex::new(index)?;
        self.detail_pattern = Regex::new(detail)?;
        Ok(self)
    }

    pub fn thresholds(&self) -> &ClassifierThresholds {
        &self.thresholds
    }

    fn parse_title(&self, title: &str) -> Option<TitleKind> {
        if let Some(caps) = self.index_pattern.captures(title) {
            return caps.get(1).map(|m| TitleKind::Index(m.as_str().trim().to_string()));
        }
        self.detail_pattern
            .captures(title)
            .and_then(|caps| caps.get(1))
            .map(|m| TitleKind::Detail(m.as_str().trim().to_string()))
    }
}

impl TableClassifier for PatternTableClassifier {
    fn classify(&self, entries: &[&WorldbookEntry]) -> Option<TableLayout> {
        let mut columns: Vec<TableColumn> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        let mut detail_counts: HashMap<String, usize> = HashMap::new();
        let mut index_entries = 0;
        let mut detail_entries = 0;

        for entry in entries {
            let Some(kind) = self.parse_title(entry.title()) else {
                continue;
            };
            let (column, is_index) = match kind {
                TitleKind::Index(c) => (c, true),
                TitleKind::Detail(c) => (c, false),
            };
            if column.is_empty() {
                continue;
            }
            let key = column.to_lowercase();
            let slot = *by_key.entry(key.clone()).or_insert_with(|| {
                columns.push(TableColumn {
                    name: column.clone(),
                    index_entry: None,
                    members: Vec::new(),
                });
                columns.len() - 1
            });

            let col = &mut columns[slot];
            col.members.push(entry.id.clone());
            if is_index {
                index_entries += 1;
                if col.index_entry.is_none() {
                    col.index_entry = Some(entry.id.clone());
                }
            } else {
                detail_entries += 1;
                *detail_counts.entry(key).or_default() += 1;
            }
        }

        let t = &self.thresholds;
        let most_repeated = detail_counts.values().copied().max().unwrap_or(0);
        let indexed_column = columns
            .iter()
            .any(|c| c.index_entry.is_some() && c.members.len() >= t.min_repeated_column);
        let table_like = index_entries >= t.min_index_entries
            || (detail_entries >= t.min_detail_entries && most_repeated >= t.min_repeated_column)
            || indexed_column;

        table_like.then_some(TableLayout { columns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(titles: &[&str]) -> Vec<WorldbookEntry> {
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| WorldbookEntry::new(i.to_string(), *t, format!("content {}", i)))
            .collect()
    }

    fn classify(titles: &[&str]) -> Option<TableLayout> {
        let owned = entries(titles);
        let refs: Vec<&WorldbookEntry> = owned.iter().collect();
        PatternTableClassifier::default().classify(&refs)
    }

    #[test]
    fn three_index_entries_make_a_table() {
        let layout = classify(&["Index for Stats", "Index for Skills", "index for Items"]).unwrap();
        let names: Vec<_> = layout.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Stats", "Skills", "Items"]);
        assert!(layout.columns.iter().all(|c| c.index_entry.is_some()));
    }

    #[test]
    fn two_index_entries_are_not_enough() {
        assert!(classify(&["Index for Stats", "Index for Skills", "Castle"]).is_none());
    }

    #[test]
    fn detail_entries_need_a_repeated_column() {
        // 5 details but no column named three times
        let spread = classify(&[
            "Detail: A - 1",
            "Detail: A - 2",
            "Detail: B - 1",
            "Detail: B - 2",
            "Detail: C - 1",
        ]);
        assert!(spread.is_none());

        let repeated = classify(&[
            "Detail: Stats - HP",
            "Detail: Stats - MP",
            "Detail: Stats - SP",
            "Detail: Gear - Head",
            "Detail: Gear - Hands",
        ])
        .unwrap();
        assert_eq!(repeated.columns.len(), 2);
        assert_eq!(repeated.columns[0].members, vec!["0", "1", "2"]);
        assert!(repeated.columns[0].index_entry.is_none());
    }

    #[test]
    fn indexed_column_with_details_is_a_table() {
        let layout = classify(&["Index for Stats", "Detail: Stats - HP", "Detail: Stats - MP"])
            .unwrap();
        assert_eq!(layout.columns.len(), 1);
        assert_eq!(layout.columns[0].members, vec!["0", "1", "2"]);
        assert_eq!(layout.columns[0].index_entry.as_deref(), Some("0"));

        // details alone stay below the detail threshold
        let details = classify(&["Detail: Stats - HP", "Detail: Stats - MP", "Detail: Stats - SP"]);
        assert!(details.is_none());
        assert!(classify(&["Index for Stats", "Detail: Stats - HP"]).is_none());
    }

    #[test]
    fn columns_group_case_insensitively() {
        let layout = classify(&[
            "Index for Stats",
            "Index for Gear",
            "Index for Lore",
            "Detail: stats - HP",
        ])
        .unwrap();
        assert_eq!(layout.columns[0].members, vec!["0", "3"]);
    }

    #[test]
    fn custom_thresholds() {
        let owned = entries(&["Index for Stats"]);
        let refs: Vec<&WorldbookEntry> = owned.iter().collect();
        let classifier = PatternTableClassifier::new(ClassifierThresholds {
            min_index_entries: 1,
            ..Default::default()
        });
        assert!(classifier.classify(&refs).is_some());
    }

    #[test]
    fn custom_patterns() {
        let owned = entries(&["Stats 索引", "Gear 索引", "Lore 索引"]);
        let refs: Vec<&WorldbookEntry> = owned.iter().collect();
        let classifier = PatternTableClassifier::default()
            .with_patterns(r"^(.+?)\s*索引$", r"^(.+?)\s*详情$")
            .unwrap();
        let layout = classifier.classify(&refs).unwrap();
        assert_eq!(layout.columns[1].name, "Gear");
    }
}
