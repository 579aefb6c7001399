//! Configuration issues detected while validating or repairing bindings.
//!
//! Issues are returned as data rather than logged so that the caller decides
//! how to surface them (a warning banner, a log line, or a hard error).

use crate::endpoint::EndpointId;
use std::fmt;

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fatal: the configuration cannot work at all.
    Error,
    /// Non-fatal: the configuration works but may not behave as expected.
    Warning,
}

/// Identifies a specific configuration issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssueCode {
    /// No endpoint is configured.
    NoEndpoints,
    /// Every configured endpoint is disabled.
    AllEndpointsDisabled,
    /// The prompt template pool is empty.
    NoPromptTemplates,
    /// A binding references an endpoint id that no longer exists.
    DanglingBinding { endpoint_id: EndpointId },
    /// A dangling endpoint id was remapped positionally to a live endpoint.
    DanglingRemapped { from: EndpointId, to: EndpointId },
    /// The template's own binding list and the name-keyed map disagree.
    BindingMismatch { template: String },
    /// The selected primary template had no live binding and another
    /// template was chosen instead.
    PrimaryTemplateRepaired { from: String, to: String },
    /// The selected primary template had no live binding and several
    /// templates could replace it.
    AmbiguousTemplateRepair {
        template: String,
        candidates: Vec<String>,
    },
    /// A selected template has no live binding and repair is disabled or
    /// found nothing to use instead.
    UnboundTemplate { template: String },
    /// A setting references a template id that is not in the pool.
    UnknownTemplate { template: String },
    /// A setting references an endpoint id that is not configured.
    UnknownEndpoint { endpoint_id: EndpointId },
    /// A value is outside its accepted range.
    InvalidValue { field: String, value: String },
}

/// A detected issue in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: ConfigIssueCode,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.message)
    }
}

/// Check whether any issues are errors (i.e. fatal).
pub fn has_errors(issues: &[ConfigIssue]) -> bool {
    issues.iter().any(ConfigIssue::is_error)
}
