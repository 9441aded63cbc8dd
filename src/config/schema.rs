use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::distribution::{presets, ComponentId, Mode, Sentinel, Template, TemplateError};

/// Top-level configuration.
///
/// Example YAML:
/// ```yaml
/// mode: random
/// sentinel: U
/// seed: 42
/// columns:
///   - source: st1-marks
///     prefix: st1
///     template: st-13
///     max_total: 40
///   - source: lab
///     prefix: lab
///     template: lab-4
///     step: 0.25
///   - source: iv
///     prefix: iv
///     divisions_from: co
/// templates:
///   lab-4:
///     components:
///       - { id: 1, max: 5 }
///       - { id: 2, max: 5 }
///       - { id: 3, max: 5 }
///       - { id: 4, max: 5 }
///     na_groups: [[3, 4]]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Split mode used unless overridden on the command line (default: random)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,

    /// Literal for "not attempted" cells (default: U)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentinel: Option<Sentinel>,

    /// Seed for reproducible runs. Unset means a fresh seed every run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Column used to write one processed file per distinct value
    /// (for example `course-code`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_by: Option<String>,

    /// Input columns to split, in output order
    pub columns: Vec<ColumnMapping>,

    /// User templates. These shadow built-ins of the same name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub templates: BTreeMap<String, TemplateConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Some(Mode::Random),
            sentinel: Some(Sentinel::U),
            seed: None,
            split_by: None,
            columns: vec![
                ColumnMapping {
                    source: "st1-marks".to_string(),
                    prefix: "st1".to_string(),
                    template: presets::ST_13.to_string(),
                    divisions_from: None,
                    max_total: Some(40.0),
                    step: None,
                },
                ColumnMapping {
                    source: "st2-marks".to_string(),
                    prefix: "st2".to_string(),
                    template: presets::ST_13.to_string(),
                    divisions_from: None,
                    max_total: Some(40.0),
                    step: None,
                },
                ColumnMapping {
                    source: "ete-marks".to_string(),
                    prefix: "ete".to_string(),
                    template: presets::ETE_16.to_string(),
                    divisions_from: None,
                    max_total: Some(60.0),
                    step: None,
                },
            ],
            templates: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Resolve a template name: user templates first, then built-ins.
    pub fn template(&self, name: &str) -> Option<Result<Template, TemplateError>> {
        match self.templates.get(name) {
            Some(t) => Some(t.build()),
            None => presets::builtin(name).map(Ok),
        }
    }
}

/// Binds one input column to a template.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ColumnMapping {
    /// Header of the input column holding the total
    pub source: String,

    /// Output columns are named `{prefix}-{component id}`
    pub prefix: String,

    /// Template name (user-defined or built-in). Unused with
    /// `divisions_from`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template: String,

    /// Split each row evenly into as many divisions as this column of the
    /// same row says, instead of using a template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divisions_from: Option<String>,

    /// Totals above this are rejected (e.g. 40 for sessional tests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total: Option<f64>,

    /// Rounding step. Unset means whole marks for whole totals, quarter
    /// marks otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
    /// Components in fill order
    pub components: Vec<ComponentSpec>,

    /// Choice groups; one member of each is marked not attempted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub na_groups: Vec<Vec<ComponentId>>,
}

impl TemplateConfig {
    pub fn build(&self) -> Result<Template, TemplateError> {
        Template::new(
            self.components.iter().map(|c| (c.id.clone(), c.max)),
            self.na_groups.iter().cloned(),
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    pub id: ComponentId,
    pub max: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mode, Some(Mode::Random));
        assert_eq!(config.sentinel, Some(Sentinel::U));
        assert_eq!(config.columns.len(), 3);
        assert_eq!(config.columns[2].template, "ete-16");
        assert!(config.templates.is_empty());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = Config::default();
        let yaml = serde_saphyr::to_string(&config).unwrap();
        let parsed: Config = serde_saphyr::from_str(&yaml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_minimal_config_parse() {
        let yaml = r#"
columns:
  - source: marks
    prefix: m
    template: st-13
"#;
        let config: Config = serde_saphyr::from_str(yaml).unwrap();
        assert!(config.mode.is_none());
        assert!(config.seed.is_none());
        assert_eq!(config.columns[0].source, "marks");
        assert!(config.columns[0].max_total.is_none());
    }

    #[test]
    fn test_full_config_parse() {
        let yaml = r#"
mode: equal
sentinel: "N/A"
seed: 7
split_by: course-code
columns:
  - source: lab
    prefix: lab
    template: lab-4
    max_total: 20
    step: 0.25
templates:
  lab-4:
    components:
      - { id: 1, max: 5 }
      - { id: 2, max: 5 }
      - { id: q3, max: 5 }
      - { id: q4, max: 5 }
    na_groups: [[q3, q4]]
"#;
        let config: Config = serde_saphyr::from_str(yaml).unwrap();
        assert_eq!(config.mode, Some(Mode::Equal));
        assert_eq!(config.sentinel, Some(Sentinel::NotApplicable));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.split_by.as_deref(), Some("course-code"));
        assert_eq!(config.columns[0].step, Some(0.25));

        let template = config.template("lab-4").unwrap().unwrap();
        assert_eq!(template.len(), 4);
        assert_eq!(template.na_groups().len(), 1);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
columns: []
colour: blue
"#;
        assert!(serde_saphyr::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_template_resolution_prefers_user_templates() {
        let mut config = Config::default();
        assert_eq!(config.template("st-13").unwrap().unwrap().len(), 13);

        config.templates.insert(
            "st-13".to_string(),
            TemplateConfig {
                components: vec![ComponentSpec {
                    id: "only".into(),
                    max: 40.0,
                }],
                na_groups: vec![],
            },
        );
        assert_eq!(config.template("st-13").unwrap().unwrap().len(), 1);
        assert!(config.template("missing").is_none());
    }

    #[test]
    fn test_parse_divisions_from() {
        let yaml = r#"
columns:
  - source: iv
    prefix: iv
    divisions_from: co
"#;
        let config: Config = serde_saphyr::from_str(yaml).unwrap();
        assert_eq!(config.columns[0].divisions_from.as_deref(), Some("co"));
        assert!(config.columns[0].template.is_empty());
    }
}
