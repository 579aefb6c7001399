//! Repair Bindings use case
//!
//! Explicit, logged binding repair: reconcile template bindings with the
//! name-keyed map and remap dangling endpoint ids, then persist. With
//! `auto_repair_bindings` off nothing is written and the issues are only
//! reported.

use crate::ports::config_store::{ConfigStore, ConfigStoreError};
use conclave_domain::{BindingRepairReport, repair_bindings};
use std::sync::Arc;
use tracing::{info, warn};

/// Use case for repairing stale bindings in the stored configuration
pub struct RepairBindingsUseCase {
    store: Arc<dyn ConfigStore>,
}

impl RepairBindingsUseCase {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    pub async fn execute(&self) -> Result<BindingRepairReport, ConfigStoreError> {
        let mut snapshot = self.store.load().await?;
        let report = repair_bindings(&mut snapshot);

        for issue in &report.issues {
            warn!("Binding repair: {}", issue.message);
        }
        for (from, to) in &report.remapped {
            info!("Remapped endpoint binding {} -> {}", from, to);
        }

        if report.changed {
            self.store.save(&snapshot).await?;
            info!("Saved repaired bindings");
        } else if !snapshot.settings.auto_repair_bindings && !report.issues.is_empty() {
            info!("Binding repair is disabled, issues reported only");
        }
        Ok(report)
    }
}
