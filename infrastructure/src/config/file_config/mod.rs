//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! Endpoints, prompt templates and character settings are deserialized
//! straight into domain types.

mod engine;
mod output;

pub use engine::FileEngineConfig;
pub use output::{FileOutputConfig, FileOutputFormat};

use conclave_domain::{CharacterSettings, ConfigIssue, ConfigSnapshot, Endpoint, PromptTemplate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Worldbook source configuration (`[worldbooks]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileWorldbooksConfig {
    /// Directory holding `<name>.json` worldbook exports
    pub dir: PathBuf,
}

impl Default for FileWorldbooksConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("worldbooks"),
        }
    }
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Engine limits
    pub engine: FileEngineConfig,
    /// Output settings
    pub output: FileOutputConfig,
    /// Worldbook source
    pub worldbooks: FileWorldbooksConfig,
    /// Configured LLM endpoints (`[[endpoints]]`)
    pub endpoints: Vec<Endpoint>,
    /// Prompt template pool (`[[templates]]`)
    pub templates: Vec<PromptTemplate>,
    /// Selective-mode settings of the character
    pub character: CharacterSettings,
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    ///
    /// Engine values are checked first, then endpoint/template references.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = self.engine.validate();
        issues.extend(self.snapshot().validate());
        issues
    }

    /// The parts of the file the engine runs on.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(
            self.endpoints.clone(),
            self.templates.clone(),
            self.character.clone(),
        )
    }

    /// Replace endpoints, templates and character settings, keeping the rest.
    pub fn apply_snapshot(&mut self, snapshot: &ConfigSnapshot) {
        self.endpoints = snapshot.endpoints.clone();
        self.templates = snapshot.templates.clone();
        self.character = snapshot.settings.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_domain::{CabinetMode, ConfigIssueCode, EndpointId, OutputFormat, has_errors};

    const SAMPLE: &str = r#"
[engine]
max_concurrency = 2

[output]
format = "json"
color = false

[worldbooks]
dir = "books"

[[endpoints]]
id = "a"
name = "Alpha"
model = "gpt-4o-mini"
url = "https://api.example.com/v1"

[[endpoints]]
id = "b"
name = "Beta"
model = "llama3"
enabled = false

[[templates]]
id = "scene"
main_prompt = "{worldbook_content}\n\n{user_input}"
bound_endpoint_ids = ["a"]

[character]
primary_templates = ["scene"]
excluded_tags = ["nsfw"]

[character.endpoint_bindings.a]
worldbooks = ["Lore"]

[character.cabinet]
mode = "advanced"
chair = "a"
review_rounds = 2
"#;

    #[test]
    fn test_deserialize_full_config() {
        let config: FileConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.engine.max_concurrency, 2);
        assert_eq!(config.engine.chunk_size, FileEngineConfig::default().chunk_size);
        assert_eq!(config.output.format, Some(OutputFormat::Json));
        assert!(!config.output.color);
        assert_eq!(config.worldbooks.dir, PathBuf::from("books"));
        assert_eq!(config.endpoints.len(), 2);
        assert!(!config.endpoints[1].enabled);
        assert_eq!(config.templates[0].bound_endpoint_ids, vec![EndpointId::from("a")]);
        assert_eq!(config.character.cabinet.mode, CabinetMode::Advanced);
        assert_eq!(config.character.excluded_tags, vec!["nsfw"]);
        assert!(
            config
                .character
                .endpoint_bindings
                .get(&EndpointId::from("a"))
                .is_some()
        );
    }

    #[test]
    fn test_default_config() {
        let config = FileConfig::default();
        assert!(config.endpoints.is_empty());
        assert!(config.output.color);
        assert!(config.character.selective_enabled);
    }

    #[test]
    fn test_validate_reports_missing_endpoints() {
        let issues = FileConfig::default().validate();
        assert!(has_errors(&issues));
        assert!(
            issues
                .iter()
                .any(|i| i.code == ConfigIssueCode::NoEndpoints)
        );
    }

    #[test]
    fn test_validate_sample_is_clean() {
        let config: FileConfig = toml::from_str(SAMPLE).unwrap();
        assert!(!has_errors(&config.validate()));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config: FileConfig = toml::from_str(SAMPLE).unwrap();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: FileConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
