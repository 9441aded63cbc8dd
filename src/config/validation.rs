use std::collections::HashSet;

use super::schema::Config;
use crate::distribution::Step;

/// Validate configuration at startup.
/// Returns all validation errors at once (not just the first).
pub fn validate_config(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    for (name, template) in &config.templates {
        if let Err(e) = template.build() {
            errors.push(format!("templates.{}: {}", name, e));
        }
    }

    if config.columns.is_empty() {
        errors.push("columns: at least one column mapping is required".to_string());
    }

    if let Some(ref split_by) = config.split_by {
        if split_by.trim().is_empty() {
            errors.push("split_by: must not be empty".to_string());
        }
    }

    let mut prefixes = HashSet::new();
    for (i, column) in config.columns.iter().enumerate() {
        if column.source.trim().is_empty() {
            errors.push(format!("columns[{}].source: must not be empty", i));
        }
        if column.prefix.trim().is_empty() {
            errors.push(format!("columns[{}].prefix: must not be empty", i));
        } else if !prefixes.insert(column.prefix.as_str()) {
            errors.push(format!(
                "columns[{}].prefix: '{}' is already used by another column",
                i, column.prefix
            ));
        }

        if let Some(step) = column.step {
            if Step::new(step).is_none() {
                errors.push(format!("columns[{}].step: must be a positive number", i));
            }
        }

        if let Some(max_total) = column.max_total {
            if !max_total.is_finite() || max_total < 0.0 {
                errors.push(format!("columns[{}].max_total: must be non-negative", i));
            }
        }

        if let Some(ref count_column) = column.divisions_from {
            if count_column.trim().is_empty() {
                errors.push(format!("columns[{}].divisions_from: must not be empty", i));
            }
            if !column.template.is_empty() {
                errors.push(format!(
                    "columns[{}]: set either template or divisions_from, not both",
                    i
                ));
            }
            continue;
        }

        match config.template(&column.template) {
            None => errors.push(format!(
                "columns[{}].template: unknown template '{}'",
                i, column.template
            )),
            // Broken user templates are already reported above
            Some(Err(_)) => {}
            Some(Ok(template)) => {
                if let Some(max_total) = column.max_total {
                    let reachable = template.max_reachable();
                    if max_total > reachable {
                        errors.push(format!(
                            "columns[{}].max_total: {} can never fit template '{}' (at most {})",
                            i, max_total, column.template, reachable
                        ));
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnMapping, ComponentSpec, TemplateConfig};

    fn column(source: &str, prefix: &str, template: &str) -> ColumnMapping {
        ColumnMapping {
            source: source.to_string(),
            prefix: prefix.to_string(),
            template: template.to_string(),
            divisions_from: None,
            max_total: None,
            step: None,
        }
    }

    fn config_with(columns: Vec<ColumnMapping>) -> Config {
        Config {
            mode: None,
            sentinel: None,
            seed: None,
            split_by: None,
            columns,
            templates: Default::default(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_no_columns() {
        let errors = validate_config(&config_with(vec![])).unwrap_err();
        assert!(errors[0].contains("columns"));
    }

    #[test]
    fn test_unknown_template() {
        let errors = validate_config(&config_with(vec![column("m", "m", "st-99")])).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("columns[0].template"));
    }

    #[test]
    fn test_duplicate_prefix() {
        let errors = validate_config(&config_with(vec![
            column("a", "x", "st-13"),
            column("b", "x", "st-13"),
        ]))
        .unwrap_err();
        assert!(errors[0].contains("columns[1].prefix"));
    }

    #[test]
    fn test_bad_step() {
        let mut c = column("m", "m", "st-13");
        c.step = Some(0.0);
        let errors = validate_config(&config_with(vec![c])).unwrap_err();
        assert!(errors[0].contains("columns[0].step"));
    }

    #[test]
    fn test_max_total_beyond_template() {
        let mut c = column("m", "m", "st-13");
        c.max_total = Some(60.0);
        let errors = validate_config(&config_with(vec![c])).unwrap_err();
        assert!(errors[0].contains("columns[0].max_total"));
    }

    #[test]
    fn test_broken_user_template() {
        let mut config = config_with(vec![column("m", "m", "mine")]);
        config.templates.insert(
            "mine".to_string(),
            TemplateConfig {
                components: vec![ComponentSpec {
                    id: "1".into(),
                    max: 5.0,
                }],
                na_groups: vec![vec!["9".into()]],
            },
        );
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("templates.mine"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut bad = column("", "", "nope");
        bad.max_total = Some(-1.0);
        let errors = validate_config(&config_with(vec![bad])).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_divisions_from() {
        let mut c = column("iv", "iv", "");
        c.divisions_from = Some("co".to_string());
        assert!(validate_config(&config_with(vec![c.clone()])).is_ok());

        c.template = "st-13".to_string();
        let errors = validate_config(&config_with(vec![c.clone()])).unwrap_err();
        assert!(errors[0].contains("not both"));

        c.template.clear();
        c.divisions_from = Some(" ".to_string());
        let errors = validate_config(&config_with(vec![c])).unwrap_err();
        assert!(errors[0].contains("columns[0].divisions_from"));
    }
}
