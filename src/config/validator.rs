use anyhow::Result;
use colored::Colorize;
use std::collections::HashSet;
use std::path::Path;

/// Fields allowed in a `[[groups]]` table
const GROUP_FIELDS: &[&str] = &[
    "name",
    "level",
    "match_mode",
    "message_mode",
    "percent_owned",
    "message",
    "leaf_count",
    "unit_count",
    "rules",
];

/// Fields allowed in a `[[groups.rules]]` table
const RULE_FIELDS: &[&str] = &["name", "matches", "comparison", "threshold"];

/// Fields allowed in a gate table
const GATE_FIELDS: &[&str] = &["comparison", "threshold"];

/// Detects configuration fields that have no effect
pub struct ConfigValidator {
    /// Scalar fields recognized outside of `[[groups]]`
    known_fields: HashSet<String>,
    /// Fields that used to exist and are now ignored
    deprecated_fields: HashSet<String>,
}

impl ConfigValidator {
    /// Create a new validator with known configuration fields
    #[must_use]
    pub fn new() -> Self {
        let mut known_fields = HashSet::new();
        let mut deprecated_fields = HashSet::new();

        known_fields.insert("core.enabled".to_string());
        known_fields.insert("core.notification_period_secs".to_string());
        known_fields.insert("core.initial_delay_secs".to_string());
        known_fields.insert("performance.parallel_threads".to_string());

        // Older name of the notification period
        deprecated_fields.insert("core.timer_seconds".to_string());

        Self {
            known_fields,
            deprecated_fields,
        }
    }

    /// Collect warnings for a configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub fn check_config_file(&self, config_path: &Path) -> Result<Vec<String>> {
        if !config_path.exists() {
            return Ok(Vec::new());
        }

        let content = super::parser::read_text_file(config_path)?;
        let parsed: toml::Value = toml::from_str(&content)?;
        Ok(self.check_value(&parsed))
    }

    /// Collect warnings for an already parsed document
    #[must_use]
    pub fn check_value(&self, parsed: &toml::Value) -> Vec<String> {
        let mut unknown_fields = Vec::new();
        let mut deprecated_used = Vec::new();

        self.check_table(parsed, "", &mut unknown_fields, &mut deprecated_used);

        let mut warnings = Vec::new();
        for field in &unknown_fields {
            warnings.push(format!("Unknown configuration field: {field}"));
        }
        for field in &deprecated_used {
            let suggestion = match field.as_str() {
                "core.timer_seconds" => "Use core.notification_period_secs instead.",
                _ => "This field is deprecated and has no effect.",
            };
            warnings.push(format!("Deprecated field '{field}': {suggestion}"));
        }
        warnings
    }

    /// Print warnings for a configuration file to stderr
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub fn validate_config_file(&self, config_path: &Path) -> Result<()> {
        let warnings = self.check_config_file(config_path)?;
        if !warnings.is_empty() {
            eprintln!("{}", "Configuration warnings:".yellow().bold());
            for warning in warnings {
                eprintln!("  {}", warning.yellow());
            }
            eprintln!();
        }
        Ok(())
    }

    /// Recursively checks a TOML table for unknown and deprecated fields
    fn check_table(
        &self,
        table: &toml::Value,
        prefix: &str,
        unknown: &mut Vec<String>,
        deprecated: &mut Vec<String>,
    ) {
        let toml::Value::Table(map) = table else {
            return;
        };

        for (key, value) in map {
            let full_key = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };

            if full_key == "groups" {
                Self::check_groups(value, unknown);
                continue;
            }

            if self.deprecated_fields.contains(&full_key) {
                deprecated.push(full_key);
                continue;
            }

            if let toml::Value::Table(_) = value {
                self.check_table(value, &full_key, unknown, deprecated);
            } else if !self.known_fields.contains(&full_key) {
                unknown.push(full_key);
            }
        }
    }

    /// Checks every `[[groups]]` entry and its nested rules
    fn check_groups(value: &toml::Value, unknown: &mut Vec<String>) {
        let toml::Value::Array(groups) = value else {
            unknown.push("groups".to_string());
            return;
        };

        for (index, group) in groups.iter().enumerate() {
            let prefix = format!("groups[{index}]");
            Self::check_fields(group, &prefix, GROUP_FIELDS, unknown);

            let toml::Value::Table(map) = group else { continue };
            for gate in ["leaf_count", "unit_count"] {
                if let Some(value) = map.get(gate) {
                    Self::check_fields(value, &format!("{prefix}.{gate}"), GATE_FIELDS, unknown);
                }
            }
            if let Some(toml::Value::Array(rules)) = map.get("rules") {
                for (rule_index, rule) in rules.iter().enumerate() {
                    let rule_prefix = format!("{prefix}.rules[{rule_index}]");
                    Self::check_fields(rule, &rule_prefix, RULE_FIELDS, unknown);
                }
            }
        }
    }

    fn check_fields(value: &toml::Value, prefix: &str, allowed: &[&str], unknown: &mut Vec<String>) {
        if let toml::Value::Table(map) = value {
            for key in map.keys() {
                if !allowed.contains(&key.as_str()) {
                    unknown.push(format!("{prefix}.{key}"));
                }
            }
        }
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warnings_for(content: &str) -> Vec<String> {
        let parsed: toml::Value = toml::from_str(content).unwrap();
        ConfigValidator::new().check_value(&parsed)
    }

    #[test]
    fn test_clean_config_has_no_warnings() {
        let content = toml::to_string_pretty(&crate::config::Config::sample()).unwrap();
        assert!(warnings_for(&content).is_empty());
    }

    #[test]
    fn test_unknown_fields_are_reported() {
        let warnings = warnings_for(
            r#"
[core]
enabled = true
colour = "blue"

[[groups]]
name = "A"
severity = 3
leaf_count = { comparison = "less", threshold = 2, unit = "x" }

[[groups.rules]]
matches = "*"
weight = 2
"#,
        );
        assert_eq!(warnings.len(), 4);
        assert!(warnings.iter().any(|w| w.contains("core.colour")));
        assert!(warnings.iter().any(|w| w.contains("groups[0].severity")));
        assert!(warnings.iter().any(|w| w.contains("groups[0].leaf_count.unit")));
        assert!(warnings.iter().any(|w| w.contains("groups[0].rules[0].weight")));
    }

    #[test]
    fn test_deprecated_field() {
        let warnings = warnings_for("[core]\ntimer_seconds = 600\n");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("notification_period_secs"));
    }
}
