//! Resolving which endpoints a prompt template runs on.
//!
//! A template's own `bound_endpoint_ids` are authoritative; the legacy
//! name-keyed map is only consulted when the template has none. Endpoints
//! reached through neither source never run.

use crate::endpoint::EndpointId;
use crate::prompt::PromptTemplate;
use crate::settings::ConfigSnapshot;
use crate::validation::{ConfigIssue, ConfigIssueCode};
use std::collections::{BTreeMap, BTreeSet};

/// Where a template's binding list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSource {
    Template,
    NameKeyed,
    Unbound,
}

/// Raw binding list of `template`, before filtering out dead endpoints.
pub fn template_binding<'a>(
    template: &'a PromptTemplate,
    prompt_bindings: &'a BTreeMap<String, Vec<EndpointId>>,
) -> (&'a [EndpointId], BindingSource) {
    if !template.bound_endpoint_ids.is_empty() {
        return (template.bound_endpoint_ids.as_slice(), BindingSource::Template);
    }
    let legacy = prompt_bindings
        .get(template.binding_key())
        .or_else(|| prompt_bindings.get(&template.id))
        .filter(|ids| !ids.is_empty());
    match legacy {
        Some(ids) => (ids.as_slice(), BindingSource::NameKeyed),
        None => (&[] as &[EndpointId], BindingSource::Unbound),
    }
}

/// Enabled, existing endpoints bound to `template`.
pub fn live_binding(snapshot: &ConfigSnapshot, template: &PromptTemplate) -> BTreeSet<EndpointId> {
    let (ids, _) = template_binding(template, &snapshot.settings.prompt_bindings);
    ids.iter()
        .filter(|id| snapshot.live_endpoint(id).is_some())
        .cloned()
        .collect()
}

/// A primary template chosen for this turn with its live endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedTemplate {
    /// Position in the primary selection (the aggregator refers to it).
    pub selection_index: usize,
    pub template: PromptTemplate,
    pub endpoints: BTreeSet<EndpointId>,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateSelection {
    pub templates: Vec<SelectedTemplate>,
    pub issues: Vec<ConfigIssue>,
}

/// Resolve the primary templates and their live bindings.
///
/// An empty selection falls back to the first template of the pool. A
/// selected template without a live binding is replaced by the one other
/// bound template in the pool when repair is allowed; with several candidates
/// nothing is guessed and the template stays unbound.
pub fn select_primary_templates(snapshot: &ConfigSnapshot) -> TemplateSelection {
    let settings = &snapshot.settings;
    let mut selection = TemplateSelection::default();

    let selected_ids: Vec<&str> = if settings.primary_templates.is_empty() {
        snapshot.templates.first().map(|t| t.id.as_str()).into_iter().collect()
    } else {
        settings.primary_templates.iter().map(String::as_str).collect()
    };

    for (selection_index, id) in selected_ids.iter().enumerate() {
        let Some(template) = snapshot.template(id) else {
            selection.issues.push(ConfigIssue::warning(
                ConfigIssueCode::UnknownTemplate {
                    template: id.to_string(),
                },
                format!("selected template '{}' is not in the prompt pool", id),
            ));
            continue;
        };

        let endpoints = live_binding(snapshot, template);
        if !endpoints.is_empty() {
            selection.templates.push(SelectedTemplate {
                selection_index,
                template: template.clone(),
                endpoints,
            });
            continue;
        }

        let candidates: Vec<&PromptTemplate> = snapshot
            .templates
            .iter()
            .filter(|t| !selected_ids.contains(&t.id.as_str()))
            .filter(|t| !live_binding(snapshot, t).is_empty())
            .collect();

        match candidates.as_slice() {
            [only] if settings.auto_repair_bindings => {
                selection.issues.push(ConfigIssue::warning(
                    ConfigIssueCode::PrimaryTemplateRepaired {
                        from: template.id.clone(),
                        to: only.id.clone(),
                    },
                    format!(
                        "template '{}' has no bound endpoint; using bound template '{}' instead",
                        template.id, only.id
                    ),
                ));
                selection.templates.push(SelectedTemplate {
                    selection_index,
                    template: (*only).clone(),
                    endpoints: live_binding(snapshot, only),
                });
            }
            [_, _, ..] if settings.auto_repair_bindings => {
                selection.issues.push(ConfigIssue::warning(
                    ConfigIssueCode::AmbiguousTemplateRepair {
                        template: template.id.clone(),
                        candidates: candidates.iter().map(|t| t.id.clone()).collect(),
                    },
                    format!(
                        "template '{}' has no bound endpoint and {} other templates are bound; \
                         bind it explicitly",
                        template.id,
                        candidates.len()
                    ),
                ));
                selection.templates.push(SelectedTemplate {
                    selection_index,
                    template: template.clone(),
                    endpoints: BTreeSet::new(),
                });
            }
            _ => {
                selection.issues.push(ConfigIssue::warning(
                    ConfigIssueCode::UnboundTemplate {
                        template: template.id.clone(),
                    },
                    format!("template '{}' has no bound endpoint", template.id),
                ));
                selection.templates.push(SelectedTemplate {
                    selection_index,
                    template: template.clone(),
                    endpoints: BTreeSet::new(),
                });
            }
        }
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::settings::CharacterSettings;

    fn endpoints() -> Vec<Endpoint> {
        vec![
            Endpoint::new("a", "A", "m"),
            Endpoint::new("b", "B", "m"),
            Endpoint::new("off", "Off", "m").disabled(),
        ]
    }

    #[test]
    fn template_list_wins_over_name_map() {
        let template = PromptTemplate::new("p", "").bound_to(["a"]);
        let mut map = BTreeMap::new();
        map.insert("p".to_string(), vec![EndpointId::from("b")]);
        let (ids, source) = template_binding(&template, &map);
        assert_eq!(ids, &[EndpointId::from("a")]);
        assert_eq!(source, BindingSource::Template);
    }

    #[test]
    fn name_map_is_fallback() {
        let template = PromptTemplate::new("p", "").with_name("Scene");
        let mut map = BTreeMap::new();
        map.insert("Scene".to_string(), vec![EndpointId::from("b")]);
        let (ids, source) = template_binding(&template, &map);
        assert_eq!(ids, &[EndpointId::from("b")]);
        assert_eq!(source, BindingSource::NameKeyed);

        let empty = BTreeMap::new();
        let (ids, source) = template_binding(&template, &empty);
        assert!(ids.is_empty());
        assert_eq!(source, BindingSource::Unbound);
    }

    #[test]
    fn live_binding_drops_disabled_and_missing() {
        let snapshot = ConfigSnapshot::new(
            endpoints(),
            vec![PromptTemplate::new("p", "").bound_to(["a", "off", "gone"])],
            CharacterSettings::default(),
        );
        let live = live_binding(&snapshot, &snapshot.templates[0]);
        assert_eq!(live.into_iter().collect::<Vec<_>>(), vec![EndpointId::from("a")]);
    }

    #[test]
    fn empty_selection_uses_first_template() {
        let snapshot = ConfigSnapshot::new(
            endpoints(),
            vec![
                PromptTemplate::new("first", "").bound_to(["a"]),
                PromptTemplate::new("second", "").bound_to(["b"]),
            ],
            CharacterSettings::default(),
        );
        let selection = select_primary_templates(&snapshot);
        assert_eq!(selection.templates.len(), 1);
        assert_eq!(selection.templates[0].template.id, "first");
        assert!(selection.issues.is_empty());
    }

    #[test]
    fn unbound_primary_is_repaired_with_single_candidate() {
        let snapshot = ConfigSnapshot::new(
            endpoints(),
            vec![
                PromptTemplate::new("stale", ""),
                PromptTemplate::new("bound", "").bound_to(["b"]),
            ],
            CharacterSettings::default().with_primary_templates(["stale"]),
        );
        let selection = select_primary_templates(&snapshot);
        assert_eq!(selection.templates[0].template.id, "bound");
        assert!(selection.templates[0].endpoints.contains(&EndpointId::from("b")));
        assert!(matches!(
            selection.issues[0].code,
            ConfigIssueCode::PrimaryTemplateRepaired { .. }
        ));
    }

    #[test]
    fn ambiguous_repair_runs_nothing() {
        let snapshot = ConfigSnapshot::new(
            endpoints(),
            vec![
                PromptTemplate::new("stale", ""),
                PromptTemplate::new("x", "").bound_to(["a"]),
                PromptTemplate::new("y", "").bound_to(["b"]),
            ],
            CharacterSettings::default().with_primary_templates(["stale"]),
        );
        let selection = select_primary_templates(&snapshot);
        assert_eq!(selection.templates[0].template.id, "stale");
        assert!(selection.templates[0].endpoints.is_empty());
        assert!(matches!(
            &selection.issues[0].code,
            ConfigIssueCode::AmbiguousTemplateRepair { candidates, .. } if candidates.len() == 2
        ));
    }

    #[test]
    fn repair_can_be_disabled() {
        let snapshot = ConfigSnapshot::new(
            endpoints(),
            vec![
                PromptTemplate::new("stale", ""),
                PromptTemplate::new("bound", "").bound_to(["b"]),
            ],
            CharacterSettings::default()
                .with_primary_templates(["stale"])
                .without_auto_repair(),
        );
        let selection = select_primary_templates(&snapshot);
        assert_eq!(selection.templates[0].template.id, "stale");
        assert!(selection.templates[0].endpoints.is_empty());
        assert!(matches!(
            selection.issues[0].code,
            ConfigIssueCode::UnboundTemplate { .. }
        ));
    }

    #[test]
    fn unknown_selected_template_is_reported() {
        let snapshot = ConfigSnapshot::new(
            endpoints(),
            vec![PromptTemplate::new("p", "").bound_to(["a"])],
            CharacterSettings::default().with_primary_templates(["missing", "p"]),
        );
        let selection = select_primary_templates(&snapshot);
        assert_eq!(selection.templates.len(), 1);
        assert_eq!(selection.templates[0].selection_index, 1);
        assert_eq!(selection.issues.len(), 1);
    }
}
