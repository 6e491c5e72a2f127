//! Unit predicates and the definition catalog they are checked against.
//!
//! A predicate string is a `|`-separated list of alternatives:
//!
//! - `*` matches every unit
//! - `Type` or `Type/*` matches any subtype of `Type`
//! - `Type/Subtype` matches one definition
//! - `Type/Large*` matches subtypes by glob pattern

use crate::model::{DefinitionId, Unit};
use glob::Pattern;
use std::collections::BTreeSet;

/// Definitions known to the event source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionCatalog {
    definitions: BTreeSet<DefinitionId>,
}

impl DefinitionCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition
    pub fn insert(&mut self, definition: DefinitionId) {
        self.definitions.insert(definition);
    }

    /// Check for an exact definition
    #[must_use]
    pub fn contains(&self, definition: &DefinitionId) -> bool {
        self.definitions.contains(definition)
    }

    /// Check whether any definition has the given type
    #[must_use]
    pub fn has_type(&self, type_id: &str) -> bool {
        self.definitions.iter().any(|d| d.type_id == type_id)
    }

    /// Iterate over all definitions in order
    pub fn iter(&self) -> impl Iterator<Item = &DefinitionId> {
        self.definitions.iter()
    }

    /// Number of definitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl FromIterator<DefinitionId> for DefinitionCatalog {
    fn from_iter<I: IntoIterator<Item = DefinitionId>>(iter: I) -> Self {
        Self {
            definitions: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
enum SubtypeMatch {
    Any,
    Exact(String),
    Glob(Pattern),
}

/// One compiled alternative of a predicate
#[derive(Debug, Clone)]
pub struct Alternative {
    type_id: String,
    subtype: SubtypeMatch,
}

impl Alternative {
    fn matches(&self, definition: &DefinitionId) -> bool {
        if definition.type_id != self.type_id {
            return false;
        }
        match &self.subtype {
            SubtypeMatch::Any => true,
            SubtypeMatch::Exact(subtype) => definition.subtype == *subtype,
            SubtypeMatch::Glob(pattern) => pattern.matches(&definition.subtype),
        }
    }
}

/// Compiled predicate over units
#[derive(Debug, Clone)]
pub enum UnitPredicate {
    /// Matches every unit
    All,
    /// Matches nothing; used when the predicate failed to compile
    Never,
    /// Matches units accepted by any alternative
    AnyOf(Vec<Alternative>),
}

impl UnitPredicate {
    /// Compile a predicate string against a catalog
    ///
    /// Any alternative that names an unknown definition, or that does not
    /// parse, turns the whole predicate into [`UnitPredicate::Never`]. The
    /// problems are returned as warnings rather than errors.
    #[must_use]
    pub fn compile(spec: &str, catalog: &DefinitionCatalog) -> (Self, Vec<String>) {
        let spec = spec.trim();
        if spec == "*" {
            return (Self::All, Vec::new());
        }

        let mut warnings = Vec::new();
        let mut alternatives = Vec::new();

        for raw in spec.split('|') {
            match parse_alternative(raw.trim(), catalog) {
                Ok(alternative) => alternatives.push(alternative),
                Err(warning) => warnings.push(warning),
            }
        }

        if !warnings.is_empty() || alternatives.is_empty() {
            if warnings.is_empty() {
                warnings.push(format!("Predicate '{spec}' has no alternatives"));
            }
            return (Self::Never, warnings);
        }

        (Self::AnyOf(alternatives), warnings)
    }

    /// Check a unit against the predicate
    #[must_use]
    pub fn matches(&self, unit: &Unit) -> bool {
        match self {
            Self::All => true,
            Self::Never => false,
            Self::AnyOf(alternatives) => alternatives.iter().any(|a| a.matches(&unit.definition)),
        }
    }

    /// Whether the predicate degraded to never matching
    #[must_use]
    pub const fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }
}

fn parse_alternative(raw: &str, catalog: &DefinitionCatalog) -> Result<Alternative, String> {
    if raw.is_empty() {
        return Err("Empty alternative in unit predicate".to_string());
    }

    let (type_id, subtype) = match raw.split_once('/') {
        Some((type_id, subtype)) => (type_id.trim(), subtype.trim()),
        None => (raw, "*"),
    };

    if type_id.is_empty() {
        return Err(format!("Missing type in unit predicate '{raw}'"));
    }
    if !catalog.has_type(type_id) {
        return Err(format!("Unknown unit type '{type_id}' in predicate '{raw}'"));
    }

    let subtype = if subtype.is_empty() || subtype == "*" {
        SubtypeMatch::Any
    } else if subtype.contains(['*', '?', '[']) {
        let pattern = Pattern::new(subtype)
            .map_err(|e| format!("Invalid subtype pattern '{subtype}': {e}"))?;
        let known = catalog
            .iter()
            .any(|d| d.type_id == type_id && pattern.matches(&d.subtype));
        if !known {
            return Err(format!("Pattern '{raw}' matches no known definition"));
        }
        SubtypeMatch::Glob(pattern)
    } else {
        if !catalog.contains(&DefinitionId::new(type_id, subtype)) {
            return Err(format!("Unknown unit definition '{type_id}/{subtype}'"));
        }
        SubtypeMatch::Exact(subtype.to_string())
    };

    Ok(Alternative {
        type_id: type_id.to_string(),
        subtype,
    })
}
