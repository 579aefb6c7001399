//! Prompt template entity

use crate::endpoint::EndpointId;
use serde::{Deserialize, Serialize};

/// A system/user prompt pair with substitution slots (Entity)
///
/// `bound_endpoint_ids` is the authoritative binding list. The name-keyed map
/// in [`CharacterSettings`](crate::settings::CharacterSettings) is kept for
/// older configurations and reconciled against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Always placed before `system_prompt` in the final system prompt.
    #[serde(default)]
    pub final_system_directive: String,
    #[serde(default)]
    pub main_prompt: String,
    /// Values for `{var1}`, `{var2}`, ... in all three prompt fields.
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub bound_endpoint_ids: Vec<EndpointId>,
}

impl PromptTemplate {
    pub fn new(id: impl Into<String>, main_prompt: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            system_prompt: String::new(),
            final_system_directive: String::new(),
            main_prompt: main_prompt.into(),
            variables: Vec::new(),
            bound_endpoint_ids: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.final_system_directive = directive.into();
        self
    }

    pub fn with_variables(mut self, variables: Vec<String>) -> Self {
        self.variables = variables;
        self
    }

    pub fn bound_to<I, E>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<EndpointId>,
    {
        self.bound_endpoint_ids = endpoints.into_iter().map(Into::into).collect();
        self
    }

    /// Name used as key in the legacy name-keyed binding map.
    pub fn binding_key(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }

    /// Merge prompt used by the cabinet chair when no chair template is set.
    pub fn default_chair() -> Self {
        Self::new(
            "builtin:cabinet-chair",
            r#"The cabinet has finished its deliberation on the following turn:

{user_input}

Drafts from the cabinet members:
{previous_results}

Merge the drafts into one coherent analysis. Keep points the members agree on,
resolve disagreements in favour of the better supported position, and drop
repetition. Answer with the merged analysis only."#,
        )
        .with_name("Cabinet chair")
        .with_system_prompt(
            r#"You are the chair of a cabinet of analysts, acting as {role_name} on {model_name}.
Synthesize the members' drafts into a single, balanced result."#,
        )
    }

    /// Re-pass prompt used by the secondary aggregator when its template
    /// index does not resolve.
    pub fn default_aggregator() -> Self {
        Self::new(
            "builtin:aggregator",
            r#"Several analyses were produced for this turn:

{previous_results}

Write one consolidated analysis that replaces all of them."#,
        )
        .with_name("Aggregator")
    }
}
