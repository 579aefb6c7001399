//! Task entities

use crate::endpoint::{Endpoint, EndpointId};
use crate::prompt::PromptTemplate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dedupe key of a task: one execution per endpoint/template pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub endpoint_id: EndpointId,
    pub template_id: String,
}

impl TaskKey {
    pub fn new(endpoint_id: impl Into<EndpointId>, template_id: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            template_id: template_id.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.endpoint_id, self.template_id)
    }
}

/// One executable unit for the current turn.
#[derive(Debug, Clone)]
pub struct TaskUnit {
    pub key: TaskKey,
    /// Label used for progress entries and result headers.
    pub display_name: String,
    /// Flattened worldbook text offered as `{worldbook_content}`.
    pub worldbook_content: String,
    /// Worldbooks whose text was merged into this unit.
    pub worldbooks: Vec<String>,
    pub endpoint: Endpoint,
    pub template: PromptTemplate,
}

impl TaskUnit {
    pub fn new(endpoint: Endpoint, template: PromptTemplate) -> Self {
        let key = TaskKey::new(endpoint.id.clone(), template.id.clone());
        let display_name = if template.name.is_empty() || template.name == template.id {
            endpoint.display_name().to_string()
        } else {
            format!("{} · {}", endpoint.display_name(), template.name)
        };
        Self {
            key,
            display_name,
            worldbook_content: String::new(),
            worldbooks: Vec::new(),
            endpoint,
            template,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.worldbook_content = content.into();
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Progress/cancellation id of this unit.
    pub fn id(&self) -> String {
        self.key.to_string()
    }
}

/// Live status reported to the progress sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Aborted => "aborted",
            TaskStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one task settled. Aborts are not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "text", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed(String),
    Failed(String),
    Aborted,
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Completed(_) => TaskStatus::Completed,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
            TaskOutcome::Aborted => TaskStatus::Aborted,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            TaskOutcome::Completed(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, TaskOutcome::Aborted)
    }
}

/// Settled result of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub key: TaskKey,
    pub display_name: String,
    pub outcome: TaskOutcome,
    /// Chunks actually sent (0 when aborted before the first call).
    pub chunks: usize,
    /// Chunks dropped by the chunk cap.
    pub dropped_chunks: usize,
}

impl TaskReport {
    pub fn new(unit: &TaskUnit, outcome: TaskOutcome) -> Self {
        Self {
            key: unit.key.clone(),
            display_name: unit.display_name.clone(),
            outcome,
            chunks: 0,
            dropped_chunks: 0,
        }
    }

    pub fn with_chunks(mut self, sent: usize, dropped: usize) -> Self {
        self.chunks = sent;
        self.dropped_chunks = dropped;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_includes_named_template() {
        let endpoint = Endpoint::new("a", "Alpha", "m");
        let plain = TaskUnit::new(endpoint.clone(), PromptTemplate::new("p1", ""));
        assert_eq!(plain.display_name, "Alpha");

        let named = TaskUnit::new(endpoint, PromptTemplate::new("p1", "").with_name("Scene"));
        assert_eq!(named.display_name, "Alpha · Scene");
        assert_eq!(named.id(), "a::p1");
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(TaskOutcome::Completed("x".into()).status(), TaskStatus::Completed);
        assert_eq!(TaskOutcome::Failed("boom".into()).status(), TaskStatus::Failed);
        assert_eq!(TaskOutcome::Aborted.status(), TaskStatus::Aborted);
        assert_eq!(TaskOutcome::Aborted.text(), None);
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_outcome_serde() {
        let json = serde_json::to_value(TaskOutcome::Failed("timeout".into())).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["text"], "timeout");
    }
}
