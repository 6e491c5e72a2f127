//! Tracking rules: predicates over units plus a comparison against a threshold.
//!
//! Rules come from the `[[groups.rules]]` configuration tables. Each rule is
//! compiled once per start against the event source's definition catalog and
//! then handed to its own [`crate::tracker::RuleTracker`].

pub mod predicate;

pub use predicate::{DefinitionCatalog, UnitPredicate};

use crate::config::GroupConfig;
use crate::error::{TrackingError, TrackingResult};
use crate::model::Level;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// How a count is compared against a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// `count < threshold`
    Less,
    /// `count == threshold`
    Equal,
    /// `count > threshold`
    #[serde(alias = "more")]
    Greater,
}

impl Comparison {
    /// Apply the comparison
    #[must_use]
    pub const fn evaluate(self, value: usize, threshold: usize) -> bool {
        match self {
            Self::Less => value < threshold,
            Self::Equal => value == threshold,
            Self::Greater => value > threshold,
        }
    }

    /// Operator used in listings
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Less => "<",
            Self::Equal => "==",
            Self::Greater => ">",
        }
    }
}

/// How a group combines the results of its rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// At least one rule must hold
    Any,
    /// Every rule must hold
    #[default]
    All,
}

/// Which owners of a matching node receive the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageMode {
    /// The owner(s) with the most units, ties included
    #[default]
    Majority,
    /// Every owner holding more than the configured share of units
    Percentage,
}

/// Unique key of a rule: `group/name`, or `group#index` for unnamed rules
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey(String);

impl RuleKey {
    /// Key of the rule at `index` in `group`
    #[must_use]
    pub fn new(group: &str, name: Option<&str>, index: usize) -> Self {
        match name {
            Some(name) => Self(format!("{group}/{name}")),
            None => Self(format!("{group}#{index}")),
        }
    }

    /// Key as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A compiled rule
#[derive(Debug, Clone)]
pub struct Rule {
    /// Unique key
    pub key: RuleKey,
    /// Level of the nodes this rule is evaluated for
    pub level: Level,
    /// Predicate source text
    pub spec: String,
    /// Compiled predicate, shared with scan jobs
    pub predicate: Arc<UnitPredicate>,
    /// Comparison applied to the tracked count
    pub comparison: Comparison,
    /// Threshold the count is compared with
    pub threshold: usize,
}

impl Rule {
    /// Check a tracked count against the rule
    #[must_use]
    pub const fn is_met(&self, count: usize) -> bool {
        self.comparison.evaluate(count, self.threshold)
    }
}

/// Output of [`compile_rules`]
#[derive(Debug, Default)]
pub struct CompiledRules {
    /// One rule per configured rule, in configuration order
    pub rules: Vec<Rule>,
    /// Configuration problems that degraded a predicate
    pub warnings: Vec<String>,
}

/// Compile every rule of every group
///
/// # Errors
///
/// Returns [`TrackingError::DuplicateRule`] if two rules share a key
pub fn compile_rules(
    groups: &[GroupConfig],
    catalog: &DefinitionCatalog,
) -> TrackingResult<CompiledRules> {
    let mut compiled = CompiledRules::default();
    let mut seen = HashSet::new();

    for group in groups {
        for (index, rule) in group.rules.iter().enumerate() {
            let key = RuleKey::new(&group.name, rule.name.as_deref(), index);
            if !seen.insert(key.clone()) {
                return Err(TrackingError::DuplicateRule(key.to_string()));
            }

            let (predicate, problems) = UnitPredicate::compile(&rule.matches, catalog);
            for problem in problems {
                warn!(rule = %key, "{problem}; rule will never match");
                compiled.warnings.push(format!("{key}: {problem}"));
            }

            compiled.rules.push(Rule {
                key,
                level: group.level,
                spec: rule.matches.clone(),
                predicate: Arc::new(predicate),
                comparison: rule.comparison,
                threshold: rule.threshold,
            });
        }
    }

    Ok(compiled)
}
