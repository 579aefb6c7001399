//! Binding reconciliation and dangling-endpoint repair.
//!
//! Both operations mutate a [`ConfigSnapshot`] only when
//! `settings.auto_repair_bindings` is on; otherwise they just report what
//! they would have changed.

use crate::endpoint::EndpointId;
use crate::settings::ConfigSnapshot;
use crate::validation::{ConfigIssue, ConfigIssueCode};
use std::collections::BTreeSet;

/// Outcome of [`repair_bindings`].
#[derive(Debug, Clone, Default)]
pub struct BindingRepairReport {
    pub issues: Vec<ConfigIssue>,
    /// Positional remaps that were applied (dangling id → live id).
    pub remapped: Vec<(EndpointId, EndpointId)>,
    /// Whether the snapshot was modified and should be saved.
    pub changed: bool,
}

/// Reconcile template bindings, then repair dangling endpoint ids.
pub fn repair_bindings(snapshot: &mut ConfigSnapshot) -> BindingRepairReport {
    let mut report = BindingRepairReport::default();
    reconcile_template_bindings(snapshot, &mut report);
    repair_dangling_endpoints(snapshot, &mut report);
    report
}

/// Make template-owned binding lists and the name-keyed map agree.
///
/// The template list is authoritative; a template without one adopts the
/// map entry.
fn reconcile_template_bindings(snapshot: &mut ConfigSnapshot, report: &mut BindingRepairReport) {
    let repair = snapshot.settings.auto_repair_bindings;

    for template in &mut snapshot.templates {
        let key = template.binding_key().to_string();
        let legacy = snapshot.settings.prompt_bindings.get(&key).cloned();

        match legacy {
            Some(map_ids) if template.bound_endpoint_ids.is_empty() => {
                if map_ids.is_empty() {
                    continue;
                }
                if repair {
                    template.bound_endpoint_ids = map_ids;
                    report.changed = true;
                }
            }
            Some(map_ids) => {
                let own: BTreeSet<&EndpointId> = template.bound_endpoint_ids.iter().collect();
                let legacy: BTreeSet<&EndpointId> = map_ids.iter().collect();
                if own == legacy {
                    continue;
                }
                report.issues.push(ConfigIssue::warning(
                    ConfigIssueCode::BindingMismatch {
                        template: template.id.clone(),
                    },
                    format!(
                        "template '{}' is bound to [{}] but the binding map says [{}]",
                        template.id,
                        join_ids(&template.bound_endpoint_ids),
                        join_ids(&map_ids)
                    ),
                ));
                if repair {
                    snapshot
                        .settings
                        .prompt_bindings
                        .insert(key, template.bound_endpoint_ids.clone());
                    report.changed = true;
                }
            }
            None if !template.bound_endpoint_ids.is_empty() && repair => {
                snapshot
                    .settings
                    .prompt_bindings
                    .insert(key, template.bound_endpoint_ids.clone());
                report.changed = true;
            }
            None => {}
        }
    }
}

/// Every endpoint id referenced by settings or templates, first-seen order.
pub fn referenced_endpoint_ids(snapshot: &ConfigSnapshot) -> Vec<EndpointId> {
    let settings = &snapshot.settings;
    let mut seen = BTreeSet::new();
    let mut ordered = Vec::new();
    let mut push = |id: &EndpointId| {
        if seen.insert(id.clone()) {
            ordered.push(id.clone());
        }
    };

    settings.endpoint_bindings.endpoint_ids().for_each(&mut push);
    snapshot
        .templates
        .iter()
        .flat_map(|t| t.bound_endpoint_ids.iter())
        .for_each(&mut push);
    settings.prompt_bindings.values().flatten().for_each(&mut push);
    settings.cabinet.chair.iter().for_each(&mut push);
    settings
        .aggregator
        .iter()
        .map(|a| &a.endpoint_id)
        .for_each(&mut push);
    let aux = &settings.auxiliary;
    [&aux.plot_directive, &aux.optimization]
        .into_iter()
        .flatten()
        .map(|m| &m.endpoint_id)
        .for_each(&mut push);
    aux.memory
        .sources
        .iter()
        .map(|s| &s.endpoint_id)
        .for_each(&mut push);

    ordered
}

/// Referenced endpoint ids that no longer exist.
pub fn dangling_endpoint_ids(snapshot: &ConfigSnapshot) -> Vec<EndpointId> {
    referenced_endpoint_ids(snapshot)
        .into_iter()
        .filter(|id| snapshot.endpoint(id).is_none())
        .collect()
}

fn repair_dangling_endpoints(snapshot: &mut ConfigSnapshot, report: &mut BindingRepairReport) {
    let referenced = referenced_endpoint_ids(snapshot);
    let dangling: Vec<EndpointId> = referenced
        .iter()
        .filter(|id| snapshot.endpoint(id).is_none())
        .cloned()
        .collect();
    if dangling.is_empty() {
        return;
    }

    let orphans: Vec<EndpointId> = snapshot
        .endpoints
        .iter()
        .filter(|e| !referenced.contains(&e.id))
        .map(|e| e.id.clone())
        .collect();

    if snapshot.settings.auto_repair_bindings && orphans.len() == dangling.len() {
        for (from, to) in dangling.iter().zip(orphans.iter()) {
            rename_endpoint(snapshot, from, to);
            report.issues.push(ConfigIssue::warning(
                ConfigIssueCode::DanglingRemapped {
                    from: from.clone(),
                    to: to.clone(),
                },
                format!("binding for removed endpoint '{}' moved to '{}'", from, to),
            ));
            report.remapped.push((from.clone(), to.clone()));
        }
        report.changed = true;
        return;
    }

    for id in dangling {
        report.issues.push(ConfigIssue::warning(
            ConfigIssueCode::DanglingBinding {
                endpoint_id: id.clone(),
            },
            format!("a binding references endpoint '{}' which no longer exists", id),
        ));
    }
}

fn rename_endpoint(snapshot: &mut ConfigSnapshot, from: &EndpointId, to: &EndpointId) {
    let rename = |id: &mut EndpointId| {
        if id == from {
            *id = to.clone();
        }
    };

    let settings = &mut snapshot.settings;
    settings.endpoint_bindings.rekey(from, to);
    for template in &mut snapshot.templates {
        template.bound_endpoint_ids.iter_mut().for_each(rename);
    }
    for ids in settings.prompt_bindings.values_mut() {
        ids.iter_mut().for_each(rename);
    }
    settings.cabinet.chair.iter_mut().for_each(rename);
    settings
        .aggregator
        .iter_mut()
        .for_each(|a| rename(&mut a.endpoint_id));
    let aux = &mut settings.auxiliary;
    for module in [&mut aux.plot_directive, &mut aux.optimization]
        .into_iter()
        .flatten()
    {
        rename(&mut module.endpoint_id);
    }
    for source in &mut aux.memory.sources {
        rename(&mut source.endpoint_id);
    }
}

fn join_ids(ids: &[EndpointId]) -> String {
    ids.iter().map(EndpointId::as_str).collect::<Vec<_>>().join(", ")
}
