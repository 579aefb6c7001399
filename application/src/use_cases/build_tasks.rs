//! Build Tasks use case
//!
//! Derives the executable (endpoint, template) units of one turn from the
//! endpoint bindings, the worldbooks and the resolved primary templates.

use crate::ports::worldbook_store::WorldbookStore;
use conclave_domain::worldbook::{flatten_worldbook, render_blocks};
use conclave_domain::{
    CharacterSettings, ConfigSnapshot, Endpoint, EndpointId, TableClassifier, TaskKey, TaskUnit,
    TemplateSelection, Worldbook,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Units of one turn plus what was left out along the way.
#[derive(Debug, Default)]
pub struct TaskPlan {
    pub units: Vec<TaskUnit>,
    /// Worldbooks that were missing or failed to load.
    pub skipped_worldbooks: Vec<String>,
    /// Enabled endpoints no selected template is bound to.
    pub unbound_endpoints: Vec<EndpointId>,
}

impl TaskPlan {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Effective worldbook names of `endpoint_id`, explicit binding first.
///
/// UI-selected books join when enabled and either nothing is bound
/// explicitly or merging is on.
pub fn effective_worldbooks(settings: &CharacterSettings, endpoint_id: &EndpointId) -> Vec<String> {
    let mut books: Vec<String> = Vec::new();
    let mut push = |name: &String| {
        if !name.trim().is_empty() && !books.contains(name) {
            books.push(name.clone());
        }
    };

    if let Some(binding) = settings.endpoint_bindings.get(endpoint_id) {
        binding.worldbooks.iter().for_each(&mut push);
    }
    let explicit_empty = settings
        .endpoint_bindings
        .get(endpoint_id)
        .is_none_or(|b| b.worldbooks.is_empty());
    if settings.use_ui_selected_worldbooks && (explicit_empty || settings.merge_worldbooks) {
        settings.ui_selected_worldbooks.iter().for_each(&mut push);
    }
    books
}

/// Use case for deriving task units
pub struct TaskBuilder {
    store: Arc<dyn WorldbookStore>,
    classifier: Arc<dyn TableClassifier>,
}

impl TaskBuilder {
    pub fn new(store: Arc<dyn WorldbookStore>, classifier: Arc<dyn TableClassifier>) -> Self {
        Self { store, classifier }
    }

    /// Build the units of one turn.
    ///
    /// Each endpoint yields at most one unit per template, however many
    /// worldbooks reach it; endpoints no selected template is bound to
    /// yield nothing.
    pub async fn build(&self, snapshot: &ConfigSnapshot, selection: &TemplateSelection) -> TaskPlan {
        let settings = &snapshot.settings;
        let mut plan = TaskPlan::default();

        if !settings.selective_enabled {
            debug!("Selective mode disabled, no tasks");
            return plan;
        }

        let bound: Vec<&Endpoint> = snapshot
            .enabled_endpoints()
            .filter(|e| selection.templates.iter().any(|t| t.endpoints.contains(&e.id)))
            .collect();
        plan.unbound_endpoints = snapshot
            .enabled_endpoints()
            .filter(|e| !bound.iter().any(|b| b.id == e.id))
            .map(|e| e.id.clone())
            .collect();
        for id in &plan.unbound_endpoints {
            debug!("Endpoint {} has no bound template, it will not run", id);
        }

        let wanted: Vec<(EndpointId, Vec<String>)> = bound
            .iter()
            .map(|e| (e.id.clone(), effective_worldbooks(settings, &e.id)))
            .collect();
        let books = self.load_all(&wanted, &mut plan.skipped_worldbooks).await;

        let mut contents: HashMap<EndpointId, (String, Vec<String>)> = HashMap::new();
        for (endpoint_id, names) in &wanted {
            let loaded: Vec<&Worldbook> = names.iter().filter_map(|n| books.get(n)).collect();
            if !names.is_empty() && loaded.is_empty() {
                warn!(
                    "No worldbook of endpoint {} could be loaded, omitting its tasks",
                    endpoint_id
                );
                continue;
            }
            let content = self.endpoint_content(settings, endpoint_id, &loaded);
            let names = loaded.iter().map(|b| b.name.clone()).collect();
            contents.insert(endpoint_id.clone(), (content, names));
        }

        let mut seen: HashSet<TaskKey> = HashSet::new();
        for selected in &selection.templates {
            for endpoint in &bound {
                if !selected.endpoints.contains(&endpoint.id) {
                    continue;
                }
                let Some((content, names)) = contents.get(&endpoint.id) else {
                    continue;
                };
                let mut unit = TaskUnit::new((*endpoint).clone(), selected.template.clone())
                    .with_content(content.clone());
                if !seen.insert(unit.key.clone()) {
                    debug!("Task {} already planned, skipping duplicate", unit.key);
                    continue;
                }
                unit.worldbooks = names.clone();
                plan.units.push(unit);
            }
        }

        info!(
            "Built {} task(s) for {} bound endpoint(s)",
            plan.units.len(),
            bound.len()
        );
        plan
    }

    /// Concatenate the flattened text of every loaded worldbook of one endpoint.
    fn endpoint_content(
        &self,
        settings: &CharacterSettings,
        endpoint_id: &EndpointId,
        books: &[&Worldbook],
    ) -> String {
        let binding = settings.endpoint_bindings.get(endpoint_id);
        books
            .iter()
            .map(|book| {
                let assigned = binding.and_then(|b| b.assigned(&book.name));
                let blocks = flatten_worldbook(
                    book,
                    assigned,
                    &settings.excluded_tags,
                    self.classifier.as_ref(),
                );
                render_blocks(&book.name, &blocks, settings.merge_worldbooks)
            })
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Load every distinct worldbook once, concurrently.
    async fn load_all(
        &self,
        wanted: &[(EndpointId, Vec<String>)],
        skipped: &mut Vec<String>,
    ) -> HashMap<String, Worldbook> {
        let mut names: Vec<&String> = Vec::new();
        for name in wanted.iter().flat_map(|(_, n)| n) {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let results =
            futures::future::join_all(names.iter().map(|name| self.store.load(name))).await;

        let mut books = HashMap::new();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(Some(book)) => {
                    books.insert(name.clone(), book);
                }
                Ok(None) => {
                    warn!("Worldbook '{}' not found, skipping", name);
                    skipped.push(name.clone());
                }
                Err(e) => {
                    warn!("{}, skipping", e);
                    skipped.push(name.clone());
                }
            }
        }
        books
    }
}
