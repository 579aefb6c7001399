//! Immutable configuration snapshot for one invocation.

use super::character::CharacterSettings;
use crate::core::error::DomainError;
use crate::endpoint::{Endpoint, EndpointId};
use crate::prompt::PromptTemplate;
use crate::validation::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};

/// Endpoints, prompt pool and character settings as read at the start of a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSnapshot {
    pub endpoints: Vec<Endpoint>,
    pub templates: Vec<PromptTemplate>,
    pub settings: CharacterSettings,
}

impl ConfigSnapshot {
    pub fn new(
        endpoints: Vec<Endpoint>,
        templates: Vec<PromptTemplate>,
        settings: CharacterSettings,
    ) -> Self {
        Self {
            endpoints,
            templates,
            settings,
        }
    }

    pub fn endpoint(&self, id: &EndpointId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| &e.id == id)
    }

    /// Enabled endpoint by id.
    pub fn live_endpoint(&self, id: &EndpointId) -> Option<&Endpoint> {
        self.endpoint(id).filter(|e| e.enabled)
    }

    pub fn enabled_endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter().filter(|e| e.enabled)
    }

    pub fn template(&self, id: &str) -> Option<&PromptTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Whether the selective pipeline has anything it could run.
    ///
    /// These are the configuration errors the user has to fix; they are
    /// only fatal when no auxiliary module can run standalone.
    pub fn check_runnable(&self) -> Result<(), DomainError> {
        if self.endpoints.is_empty() {
            return Err(DomainError::NoEndpoints);
        }
        if self.enabled_endpoints().next().is_none() {
            return Err(DomainError::AllEndpointsDisabled);
        }
        if self.templates.is_empty() {
            return Err(DomainError::NoPromptTemplates);
        }
        Ok(())
    }

    /// Report references to templates and endpoints that do not exist.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if let Err(e) = self.check_runnable() {
            let code = match e {
                DomainError::NoEndpoints => ConfigIssueCode::NoEndpoints,
                DomainError::AllEndpointsDisabled => ConfigIssueCode::AllEndpointsDisabled,
                _ => ConfigIssueCode::NoPromptTemplates,
            };
            issues.push(ConfigIssue::error(code, e.to_string()));
        }

        let settings = &self.settings;
        let mut template_refs: Vec<&str> =
            settings.primary_templates.iter().map(String::as_str).collect();
        template_refs.extend(settings.cabinet.template.as_deref());
        template_refs.extend(settings.cabinet.chair_template.as_deref());

        let mut endpoint_refs: Vec<&EndpointId> = Vec::new();
        endpoint_refs.extend(settings.cabinet.chair.as_ref());
        endpoint_refs.extend(settings.aggregator.as_ref().map(|a| &a.endpoint_id));

        let aux = &settings.auxiliary;
        for module in [&aux.plot_directive, &aux.optimization].into_iter().flatten() {
            template_refs.push(&module.template_id);
            endpoint_refs.push(&module.endpoint_id);
        }
        for source in &aux.memory.sources {
            template_refs.push(&source.template_id);
            endpoint_refs.push(&source.endpoint_id);
        }

        for template in template_refs {
            if self.template(template).is_none() {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::UnknownTemplate {
                        template: template.to_string(),
                    },
                    format!("template '{}' is not in the prompt pool", template),
                ));
            }
        }
        for endpoint_id in endpoint_refs {
            if self.endpoint(endpoint_id).is_none() {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::UnknownEndpoint {
                        endpoint_id: endpoint_id.clone(),
                    },
                    format!("endpoint '{}' is not configured", endpoint_id),
                ));
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{AuxModuleSettings, AuxiliarySettings, CabinetSettings};

    #[test]
    fn test_check_runnable() {
        let empty = ConfigSnapshot::default();
        assert_eq!(empty.check_runnable(), Err(DomainError::NoEndpoints));

        let disabled = ConfigSnapshot::new(
            vec![Endpoint::new("a", "A", "m").disabled()],
            vec![PromptTemplate::new("p", "")],
            CharacterSettings::default(),
        );
        assert_eq!(disabled.check_runnable(), Err(DomainError::AllEndpointsDisabled));

        let no_prompts = ConfigSnapshot::new(
            vec![Endpoint::new("a", "A", "m")],
            vec![],
            CharacterSettings::default(),
        );
        assert_eq!(no_prompts.check_runnable(), Err(DomainError::NoPromptTemplates));
    }

    #[test]
    fn test_validate_reports_unknown_references() {
        let settings = CharacterSettings::default()
            .with_primary_templates(["p", "ghost"])
            .with_cabinet(CabinetSettings::basic("nobody"))
            .with_auxiliary(AuxiliarySettings {
                plot_directive: Some(AuxModuleSettings::new("a", "p")),
                ..Default::default()
            });
        let snapshot = ConfigSnapshot::new(
            vec![Endpoint::new("a", "A", "m")],
            vec![PromptTemplate::new("p", "")],
            settings,
        );
        let issues = snapshot.validate();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| matches!(
            &i.code,
            ConfigIssueCode::UnknownTemplate { template } if template == "ghost"
        )));
        assert!(issues.iter().any(|i| matches!(
            &i.code,
            ConfigIssueCode::UnknownEndpoint { endpoint_id } if endpoint_id.as_str() == "nobody"
        )));
    }
}
