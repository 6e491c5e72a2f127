pub mod parser;
pub mod validator;

use crate::model::Level;
use crate::rules::{Comparison, MatchMode, MessageMode};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,

    /// Tracking groups, each with its own rules
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Start tracking as soon as the service comes up
    #[serde(default)]
    pub enabled: bool,
    /// Seconds between notification passes; 0 disables the timer
    #[serde(default = "default_notification_period")]
    pub notification_period_secs: u64,
    /// Seconds before the first notification pass after start
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
}

/// A comparison applied to a node property before rules are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub comparison: Comparison,
    pub threshold: usize,
}

impl Gate {
    /// Check a value against the gate
    #[must_use]
    pub const fn admits(&self, value: usize) -> bool {
        self.comparison.evaluate(value, self.threshold)
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            comparison: Comparison::Greater,
            threshold: 0,
        }
    }
}

/// One `[[groups.rules]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Optional name; unnamed rules are keyed by position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Unit predicate, e.g. `Refinery/LargeRefinery|Assembler`
    pub matches: String,
    #[serde(default = "default_rule_comparison")]
    pub comparison: Comparison,
    #[serde(default)]
    pub threshold: usize,
}

/// One `[[groups]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default = "default_group_level")]
    pub level: Level,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub message_mode: MessageMode,
    /// Share of owned units (in percent) an owner needs in percentage mode
    #[serde(default = "default_percent_owned")]
    pub percent_owned: f64,
    #[serde(default = "default_message")]
    pub message: String,
    /// Gate on the number of bodies under a node; ignored at body level
    #[serde(default)]
    pub leaf_count: Gate,
    /// Gate on the number of units under a node
    #[serde(default)]
    pub unit_count: Gate,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            notification_period_secs: default_notification_period(),
            initial_delay_secs: default_initial_delay(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
        }
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            name: "Tracking Group".to_string(),
            level: default_group_level(),
            match_mode: MatchMode::default(),
            message_mode: MessageMode::default(),
            percent_owned: default_percent_owned(),
            message: default_message(),
            leaf_count: Gate::default(),
            unit_count: Gate::default(),
            rules: Vec::new(),
        }
    }
}

impl Config {
    /// Configuration written on first run, with one example group
    #[must_use]
    pub fn sample() -> Self {
        Self {
            groups: vec![GroupConfig {
                name: "Testing Group".to_string(),
                rules: vec![RuleConfig {
                    name: Some("refineries".to_string()),
                    matches: "Refinery/LargeRefinery".to_string(),
                    comparison: Comparison::Greater,
                    threshold: 2,
                }],
                ..GroupConfig::default()
            }],
            ..Self::default()
        }
    }

    /// Look up a group by name
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&GroupConfig> {
        self.groups.iter().find(|group| group.name == name)
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with [`Config::sample`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot create parent directories
    /// - Cannot read or parse the configuration file
    /// - A value is out of range
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::sample();
            config.save(path)?;
            return Ok(config);
        }

        parser::parse_config_file(path)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot create parent directories
    /// - Cannot write to the file
    /// - TOML serialization fails
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        file.write_all(toml_str.as_bytes())?;
        Ok(())
    }

    /// Get a configuration value by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return None;
        }

        match (parts[0], parts[1]) {
            ("core", "enabled") => Some(self.core.enabled.to_string()),
            ("core", "notification_period_secs") => {
                Some(self.core.notification_period_secs.to_string())
            }
            ("core", "initial_delay_secs") => Some(self.core.initial_delay_secs.to_string()),
            ("performance", "parallel_threads") => {
                Some(self.performance.parallel_threads.to_string())
            }
            _ => None,
        }
    }

    /// Every scalar key with its current value
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        [
            "core.enabled",
            "core.notification_period_secs",
            "core.initial_delay_secs",
            "performance.parallel_threads",
        ]
        .into_iter()
        .filter_map(|key| self.get(key).map(|value| (key, value)))
        .collect()
    }

    /// Set a configuration value by key
    ///
    /// Durations accept plain seconds or humantime values such as `10m`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The key format is invalid (must be section.key)
    /// - The key is unknown
    /// - The value is invalid for the key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return Err(anyhow::anyhow!("Invalid configuration key: {key}"));
        }

        match (parts[0], parts[1]) {
            ("core", "enabled") => {
                self.core.enabled = value
                    .parse()
                    .with_context(|| format!("Invalid boolean: {value}"))?;
            }
            ("core", "notification_period_secs") => {
                self.core.notification_period_secs = crate::utils::parse_duration(value)?.as_secs();
            }
            ("core", "initial_delay_secs") => {
                self.core.initial_delay_secs = crate::utils::parse_duration(value)?.as_secs();
            }
            ("performance", "parallel_threads") => {
                let threads: usize = value
                    .parse()
                    .with_context(|| format!("Invalid number: {value}"))?;
                if threads == 0 {
                    return Err(anyhow::anyhow!("Parallel threads must be at least 1"));
                }
                self.performance.parallel_threads = threads;
            }
            _ => return Err(anyhow::anyhow!("Unknown configuration key: {key}")),
        }
        Ok(())
    }

    /// Reset a configuration value to its default
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The key format is invalid (must be section.key)
    /// - The key is unknown
    pub fn unset(&mut self, key: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return Err(anyhow::anyhow!("Invalid configuration key: {key}"));
        }

        match (parts[0], parts[1]) {
            ("core", "enabled") => self.core.enabled = false,
            ("core", "notification_period_secs") => {
                self.core.notification_period_secs = default_notification_period();
            }
            ("core", "initial_delay_secs") => {
                self.core.initial_delay_secs = default_initial_delay();
            }
            ("performance", "parallel_threads") => {
                self.performance.parallel_threads = default_parallel_threads();
            }
            _ => return Err(anyhow::anyhow!("Cannot unset configuration key: {key}")),
        }
        Ok(())
    }
}

// Default functions for serde
const fn default_notification_period() -> u64 {
    600
}

const fn default_initial_delay() -> u64 {
    1
}

fn default_parallel_threads() -> usize {
    crate::utils::thread_pool::default_thread_count()
}

const fn default_group_level() -> Level {
    Level::Construct
}

const fn default_rule_comparison() -> Comparison {
    Comparison::Greater
}

const fn default_percent_owned() -> f64 {
    20.0
}

fn default_message() -> String {
    "This message will be followed by a list of grids. Violating grids:".to_string()
}
