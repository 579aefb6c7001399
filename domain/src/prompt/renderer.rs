//! Prompt rendering
//!
//! [`PromptRenderer::render`] expands a [`PromptTemplate`] into the final
//! system/user pair sent to an endpoint. Substitution is single-pass over an
//! explicit variable map: a substituted value is never scanned again, so a
//! worldbook entry containing `{user_input}` is passed through verbatim.
//!
//! Name resolution order (first match wins):
//! 1. numbered template variables `{var1}`, `{var2}`, ...
//! 2. structural placeholders `{context}`, `{worldbook_content}`,
//!    `{user_input}`, `{previous_results}`
//! 3. caller-supplied extra variables (`{role_name}`, `{model_name}`, `{round}`, ...)
//!
//! Unknown placeholders are left untouched.

use super::template::PromptTemplate;
use std::collections::BTreeMap;

/// Variables available to a single render call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderInput {
    pub user_input: String,
    pub worldbook_content: String,
    pub context: String,
    pub previous_results: String,
    pub extra_vars: BTreeMap<String, String>,
    /// Appended to the final system prompt after substitution.
    pub system_append: Option<String>,
}

impl RenderInput {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            ..Default::default()
        }
    }

    pub fn with_worldbook_content(mut self, content: impl Into<String>) -> Self {
        self.worldbook_content = content.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_previous_results(mut self, previous: impl Into<String>) -> Self {
        self.previous_results = previous.into();
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_vars.insert(name.into(), value.into());
        self
    }

    pub fn with_system_append(mut self, suffix: impl Into<String>) -> Self {
        self.system_append = Some(suffix.into());
        self
    }
}

/// Final prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// Pure template expansion.
pub struct PromptRenderer;

impl PromptRenderer {
    pub fn render(template: &PromptTemplate, input: &RenderInput) -> RenderedPrompt {
        let vars = Self::variable_map(template, input);

        let raw_system = if template.final_system_directive.is_empty() {
            template.system_prompt.clone()
        } else if template.system_prompt.is_empty() {
            template.final_system_directive.clone()
        } else {
            format!(
                "{}\n{}",
                template.final_system_directive, template.system_prompt
            )
        };

        let mut system = substitute(&raw_system, &vars);
        if let Some(suffix) = input.system_append.as_deref().filter(|s| !s.is_empty()) {
            if !system.is_empty() {
                system.push('\n');
            }
            system.push_str(suffix);
        }

        RenderedPrompt {
            system,
            user: substitute(&template.main_prompt, &vars),
        }
    }

    fn variable_map<'a>(
        template: &'a PromptTemplate,
        input: &'a RenderInput,
    ) -> BTreeMap<String, &'a str> {
        let mut vars: BTreeMap<String, &str> = BTreeMap::new();

        for (name, value) in &input.extra_vars {
            vars.insert(name.clone(), value);
        }

        let structural = [
            ("context", input.context.as_str()),
            ("worldbook_content", input.worldbook_content.as_str()),
            ("user_input", input.user_input.as_str()),
            ("previous_results", input.previous_results.as_str()),
        ];
        for (name, value) in structural {
            vars.insert(name.to_string(), value);
        }

        for (i, value) in template.variables.iter().enumerate() {
            vars.insert(format!("var{}", i + 1), value);
        }

        vars
    }
}

/// Replace every `{name}` whose name is in `vars`, scanning the input once.
fn substitute(text: &str, vars: &BTreeMap<String, &str>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            let valid = !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if valid {
                vars.get(name).map(|value| (*value, close))
            } else {
                None
            }
        });

        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
