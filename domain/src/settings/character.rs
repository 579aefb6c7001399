//! Character settings for selective mode.

use crate::binding::BindingMap;
use crate::endpoint::EndpointId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound for advanced cabinet review rounds.
pub const MAX_REVIEW_ROUNDS: u8 = 5;

/// Selective-mode configuration of the current character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterSettings {
    pub selective_enabled: bool,
    pub endpoint_bindings: BindingMap,
    /// Legacy template-name → endpoint ids map. Template-owned bindings win.
    pub prompt_bindings: BTreeMap<String, Vec<EndpointId>>,
    pub excluded_tags: Vec<String>,
    /// Banner each worldbook's text and union UI-selected books with explicit bindings.
    pub merge_worldbooks: bool,
    pub use_ui_selected_worldbooks: bool,
    pub ui_selected_worldbooks: Vec<String>,
    /// Ids of the primary templates, in selection order.
    pub primary_templates: Vec<String>,
    pub aggregator: Option<AggregatorSettings>,
    pub cabinet: CabinetSettings,
    pub auxiliary: AuxiliarySettings,
    /// Allow logged binding repairs (template self-healing, positional remap).
    pub auto_repair_bindings: bool,
    pub output_tags: OutputTags,
}

impl Default for CharacterSettings {
    fn default() -> Self {
        Self {
            selective_enabled: true,
            endpoint_bindings: BindingMap::default(),
            prompt_bindings: BTreeMap::new(),
            excluded_tags: Vec::new(),
            merge_worldbooks: false,
            use_ui_selected_worldbooks: false,
            ui_selected_worldbooks: Vec::new(),
            primary_templates: Vec::new(),
            aggregator: None,
            cabinet: CabinetSettings::default(),
            auxiliary: AuxiliarySettings::default(),
            auto_repair_bindings: true,
            output_tags: OutputTags::default(),
        }
    }
}

impl CharacterSettings {
    pub fn with_bindings(mut self, bindings: BindingMap) -> Self {
        self.endpoint_bindings = bindings;
        self
    }

    pub fn with_primary_templates<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_templates = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_excluded_tags(mut self, tags: &[&str]) -> Self {
        self.excluded_tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_cabinet(mut self, cabinet: CabinetSettings) -> Self {
        self.cabinet = cabinet;
        self
    }

    pub fn with_aggregator(mut self, aggregator: AggregatorSettings) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn with_auxiliary(mut self, auxiliary: AuxiliarySettings) -> Self {
        self.auxiliary = auxiliary;
        self
    }

    pub fn without_auto_repair(mut self) -> Self {
        self.auto_repair_bindings = false;
        self
    }
}

/// One-shot "second opinion that wins" re-pass over the primary result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorSettings {
    pub endpoint_id: EndpointId,
    /// Index into [`CharacterSettings::primary_templates`].
    #[serde(default)]
    pub template_index: usize,
    /// Run even when the same endpoint/template pair already ran in the primary pass.
    #[serde(default)]
    pub allow_duplicate: bool,
}

impl AggregatorSettings {
    pub fn new(endpoint_id: impl Into<EndpointId>, template_index: usize) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            template_index,
            allow_duplicate: false,
        }
    }

    pub fn allowing_duplicate(mut self) -> Self {
        self.allow_duplicate = true;
        self
    }
}

/// Cabinet deliberation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CabinetMode {
    /// Plain fan-out, no deliberation.
    #[default]
    Off,
    /// Drafts then chair merge.
    Basic,
    /// Drafts, review rounds, then chair merge.
    Advanced,
}

impl CabinetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabinetMode::Off => "off",
            CabinetMode::Basic => "basic",
            CabinetMode::Advanced => "advanced",
        }
    }
}

impl std::str::FromStr for CabinetMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" | "" => Ok(CabinetMode::Off),
            "basic" | "simple" => Ok(CabinetMode::Basic),
            "advanced" => Ok(CabinetMode::Advanced),
            other => Err(format!("unknown cabinet mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CabinetSettings {
    pub mode: CabinetMode,
    pub chair: Option<EndpointId>,
    /// Requested review rounds; only used in advanced mode, clamped to 1..=5.
    pub review_rounds: u8,
    /// Template for scholars; defaults to the first primary template.
    pub template: Option<String>,
    /// Template for the chair; defaults to the built-in merge prompt.
    pub chair_template: Option<String>,
}

impl CabinetSettings {
    pub fn basic(chair: impl Into<EndpointId>) -> Self {
        Self {
            mode: CabinetMode::Basic,
            chair: Some(chair.into()),
            ..Default::default()
        }
    }

    pub fn advanced(chair: impl Into<EndpointId>, review_rounds: u8) -> Self {
        Self {
            mode: CabinetMode::Advanced,
            chair: Some(chair.into()),
            review_rounds,
            ..Default::default()
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_chair_template(mut self, template: impl Into<String>) -> Self {
        self.chair_template = Some(template.into());
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != CabinetMode::Off
    }

    /// Number of review rounds the deliberation will actually run.
    pub fn effective_review_rounds(&self) -> u8 {
        match self.mode {
            CabinetMode::Advanced => self.review_rounds.clamp(1, MAX_REVIEW_ROUNDS),
            CabinetMode::Basic | CabinetMode::Off => 0,
        }
    }
}

/// Toggle + collaborator selection for a single-call auxiliary module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxModuleSettings {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub endpoint_id: EndpointId,
    pub template_id: String,
}

fn enabled_by_default() -> bool {
    true
}

impl AuxModuleSettings {
    pub fn new(endpoint_id: impl Into<EndpointId>, template_id: impl Into<String>) -> Self {
        Self {
            enabled: true,
            endpoint_id: endpoint_id.into(),
            template_id: template_id.into(),
        }
    }
}

/// One memory retrieval task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySource {
    pub name: String,
    pub endpoint_id: EndpointId,
    pub template_id: String,
    /// Worldbook whose enabled entries are offered as `{worldbook_content}`.
    #[serde(default)]
    pub worldbook: Option<String>,
}

impl MemorySource {
    pub fn new(
        name: impl Into<String>,
        endpoint_id: impl Into<EndpointId>,
        template_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint_id: endpoint_id.into(),
            template_id: template_id.into(),
            worldbook: None,
        }
    }

    pub fn with_worldbook(mut self, worldbook: impl Into<String>) -> Self {
        self.worldbook = Some(worldbook.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub enabled: bool,
    pub sources: Vec<MemorySource>,
}

impl MemorySettings {
    pub fn new(sources: Vec<MemorySource>) -> Self {
        Self {
            enabled: true,
            sources,
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.sources.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuxiliarySettings {
    pub plot_directive: Option<AuxModuleSettings>,
    pub optimization: Option<AuxModuleSettings>,
    pub memory: MemorySettings,
}

impl AuxiliarySettings {
    pub fn any_enabled(&self) -> bool {
        self.plot_directive.as_ref().is_some_and(|m| m.enabled)
            || self.optimization.as_ref().is_some_and(|m| m.enabled)
            || self.memory.is_active()
    }
}

/// Tag names wrapping each block of the final output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputTags {
    pub primary: String,
    pub optimization: String,
    pub plot_directive: String,
    pub memory: String,
}

impl Default for OutputTags {
    fn default() -> Self {
        Self {
            primary: "selective_analysis".to_string(),
            optimization: "optimized_content".to_string(),
            plot_directive: "plot_directive".to_string(),
            memory: "memory".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_review_rounds() {
        assert_eq!(CabinetSettings::basic("chair").effective_review_rounds(), 0);
        assert_eq!(CabinetSettings::advanced("chair", 0).effective_review_rounds(), 1);
        assert_eq!(CabinetSettings::advanced("chair", 2).effective_review_rounds(), 2);
        assert_eq!(CabinetSettings::advanced("chair", 9).effective_review_rounds(), 5);
        assert_eq!(CabinetSettings::default().effective_review_rounds(), 0);
        assert!(!CabinetSettings::default().is_enabled());
    }

    #[test]
    fn test_cabinet_mode_parse() {
        assert_eq!("Advanced".parse::<CabinetMode>(), Ok(CabinetMode::Advanced));
        assert_eq!("simple".parse::<CabinetMode>(), Ok(CabinetMode::Basic));
        assert!("parliament".parse::<CabinetMode>().is_err());
    }

    #[test]
    fn test_auxiliary_any_enabled() {
        let mut aux = AuxiliarySettings::default();
        assert!(!aux.any_enabled());

        aux.memory = MemorySettings {
            enabled: true,
            sources: vec![],
        };
        assert!(!aux.any_enabled());

        let mut plot = AuxModuleSettings::new("a", "plot");
        plot.enabled = false;
        aux.plot_directive = Some(plot);
        assert!(!aux.any_enabled());

        aux.optimization = Some(AuxModuleSettings::new("a", "opt"));
        assert!(aux.any_enabled());
    }

    #[test]
    fn test_defaults() {
        let settings = CharacterSettings::default();
        assert!(settings.selective_enabled);
        assert!(settings.auto_repair_bindings);
        assert_eq!(settings.output_tags.primary, "selective_analysis");
    }
}
