//! Binding entities

use crate::endpoint::EndpointId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Worldbooks (and optionally specific entries) bound to one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointBinding {
    pub worldbooks: Vec<String>,
    /// Assigned entry ids per worldbook. A worldbook without assigned
    /// entries contributes its default selection.
    pub entries: BTreeMap<String, BTreeSet<String>>,
}

impl EndpointBinding {
    pub fn new<I, S>(worldbooks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            worldbooks: worldbooks.into_iter().map(Into::into).collect(),
            entries: BTreeMap::new(),
        }
    }

    pub fn with_entries<I, S>(mut self, worldbook: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .insert(worldbook.into(), ids.into_iter().map(Into::into).collect());
        self
    }

    /// Entry ids explicitly assigned for `worldbook`, if any.
    pub fn assigned(&self, worldbook: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(worldbook).filter(|ids| !ids.is_empty())
    }
}

/// Endpoint id → worldbook binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingMap(BTreeMap<EndpointId, EndpointBinding>);

impl BindingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, endpoint: impl Into<EndpointId>, binding: EndpointBinding) -> Self {
        self.0.insert(endpoint.into(), binding);
        self
    }

    pub fn insert(&mut self, endpoint: EndpointId, binding: EndpointBinding) {
        self.0.insert(endpoint, binding);
    }

    pub fn get(&self, endpoint: &EndpointId) -> Option<&EndpointBinding> {
        self.0.get(endpoint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EndpointId, &EndpointBinding)> {
        self.0.iter()
    }

    pub fn endpoint_ids(&self) -> impl Iterator<Item = &EndpointId> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Move the binding of `from` to `to`. Returns false when `from` has no
    /// binding or `to` already has one.
    pub fn rekey(&mut self, from: &EndpointId, to: &EndpointId) -> bool {
        if self.0.contains_key(to) {
            return false;
        }
        match self.0.remove(from) {
            Some(binding) => {
                self.0.insert(to.clone(), binding);
                true
            }
            None => false,
        }
    }
}
