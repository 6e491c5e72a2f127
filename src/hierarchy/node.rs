use crate::model::{BodyId, Level, Unit};
use std::fmt;

/// Generational handle into the hierarchy arena.
///
/// A handle stays valid until its node is pruned; after that the slot may be
/// reused, but the generation no longer matches and lookups fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(super) index: u32,
    pub(super) generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)?;
        if self.generation > 0 {
            write!(f, "v{}", self.generation)?;
        }
        Ok(())
    }
}

/// Kind-specific payload of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Leaf wrapping one body and the units it currently holds
    UnitGroup {
        /// Body this leaf stands for
        body: BodyId,
        /// Units of the body, kept in step with unit events
        units: Vec<Unit>,
    },
    /// Bodies joined by soft links
    Construct,
    /// Constructs joined by hard links
    Cluster,
}

impl NodeKind {
    /// Hierarchy level of this kind
    #[must_use]
    pub const fn level(&self) -> Level {
        match self {
            Self::UnitGroup { .. } => Level::Body,
            Self::Construct => Level::Construct,
            Self::Cluster => Level::Cluster,
        }
    }
}

/// One record of the containment hierarchy
#[derive(Debug, Clone)]
pub struct Node {
    pub(super) kind: NodeKind,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
    pub(super) leaf_count: usize,
    pub(super) marked: bool,
}

impl Node {
    pub(super) fn new(kind: NodeKind) -> Self {
        let leaf_count = usize::from(matches!(kind, NodeKind::UnitGroup { .. }));
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            leaf_count,
            marked: false,
        }
    }

    /// Kind and payload
    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Hierarchy level
    #[must_use]
    pub const fn level(&self) -> Level {
        self.kind.level()
    }

    /// Parent handle, `None` for roots and unattached leaves
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order, including ones marked for removal
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Number of leaves in this subtree (1 for a leaf)
    #[must_use]
    pub const fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Whether the node waits for the next prune
    #[must_use]
    pub const fn is_marked(&self) -> bool {
        self.marked
    }

    /// Body of a leaf
    #[must_use]
    pub const fn body(&self) -> Option<BodyId> {
        match &self.kind {
            NodeKind::UnitGroup { body, .. } => Some(*body),
            _ => None,
        }
    }

    /// Units of a leaf; empty for internal nodes
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        match &self.kind {
            NodeKind::UnitGroup { units, .. } => units,
            _ => &[],
        }
    }
}
