//! Endpoint bindings
//!
//! Two kinds of binding exist: worldbooks bound to an endpoint
//! ([`BindingMap`]) and endpoints bound to a prompt template (the template's
//! own list, or the legacy name-keyed map in the character settings).

pub mod entities;
pub mod repair;
pub mod resolution;

pub use entities::{BindingMap, EndpointBinding};
pub use repair::{BindingRepairReport, dangling_endpoint_ids, referenced_endpoint_ids, repair_bindings};
pub use resolution::{
    BindingSource, SelectedTemplate, TemplateSelection, live_binding, select_primary_templates,
    template_binding,
};
