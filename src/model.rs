//! Core value types shared by the hierarchy, the trackers and the event source.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a physical body as reported by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyId(pub u64);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque recipient identity used for owner shares and message delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Definition of a unit: a type plus a subtype within that type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionId {
    /// Type name, e.g. `Refinery`
    pub type_id: String,
    /// Subtype name, e.g. `LargeRefinery`
    pub subtype: String,
}

impl DefinitionId {
    /// Create a definition from its type and subtype names
    #[must_use]
    pub fn new(type_id: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            subtype: subtype.into(),
        }
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_id, self.subtype)
    }
}

/// The smallest trackable element of a body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// What kind of unit this is
    #[serde(flatten)]
    pub definition: DefinitionId,
    /// Owner of the unit, if any
    #[serde(default)]
    pub owner: Option<OwnerId>,
}

impl Unit {
    /// Create an owned unit
    #[must_use]
    pub fn new(type_id: &str, subtype: &str, owner: Option<u64>) -> Self {
        Self {
            definition: DefinitionId::new(type_id, subtype),
            owner: owner.map(OwnerId),
        }
    }
}

/// Level of the containment hierarchy.
///
/// Levels are ordered from the leaves upwards: `Body < Construct < Cluster`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// A single body (the unit-group leaf)
    Body,
    /// Bodies joined by soft links
    Construct,
    /// Constructs joined by hard links
    Cluster,
}

impl Level {
    /// All levels from the leaves upwards
    pub const ALL: [Self; 3] = [Self::Body, Self::Construct, Self::Cluster];

    /// The topmost level; nodes of this level without a parent are roots
    pub const TOP: Self = Self::Cluster;

    /// Next level up, or `None` at the top
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Body => Some(Self::Construct),
            Self::Construct => Some(Self::Cluster),
            Self::Cluster => None,
        }
    }

    /// Link kinds whose edges join bodies at this level
    #[must_use]
    pub const fn link_kinds(self) -> &'static [LinkKind] {
        match self {
            Self::Body => &[],
            Self::Construct => &[LinkKind::Soft],
            Self::Cluster => &[LinkKind::Soft, LinkKind::Hard],
        }
    }

    /// Lowercase name used in configuration and output
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Construct => "construct",
            Self::Cluster => "cluster",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "body" => Ok(Self::Body),
            "construct" => Ok(Self::Construct),
            "cluster" => Ok(Self::Cluster),
            other => Err(anyhow::anyhow!("Unknown hierarchy level: {other}")),
        }
    }
}

/// Kind of link between two bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Low-level link; joins bodies into a construct
    Soft,
    /// High-level link; joins constructs into a cluster
    Hard,
}

impl LinkKind {
    /// Hierarchy level at which this link unifies bodies
    #[must_use]
    pub const fn level(self) -> Level {
        match self {
            Self::Soft => Level::Construct,
            Self::Hard => Level::Cluster,
        }
    }
}
