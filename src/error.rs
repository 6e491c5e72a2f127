//! Invariant violations raised by the hierarchy, the trackers and the manager.
//!
//! Every variant here means event delivery or tree construction went wrong.
//! They are returned immediately and must never be absorbed, since carrying on
//! would leave the tracked counts wrong.

use crate::model::{BodyId, Level, Unit};
use thiserror::Error;

/// Errors raised when an operation would violate a tracking invariant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingError {
    /// The event source referenced a body that was never registered
    #[error("body {0} is not registered")]
    UnknownBody(BodyId),

    /// A unit was removed from a body that does not contain it
    #[error("body {body} does not contain unit {unit:?}")]
    UnknownUnit {
        /// Body the unit was expected in
        body: BodyId,
        /// The missing unit
        unit: Unit,
    },

    /// A node handle outlived the node it referred to
    #[error("node handle {0} is stale")]
    StaleNode(String),

    /// A node was attached while it still had a parent
    #[error("node {0} already has a parent")]
    AlreadyParented(String),

    /// A node was detached from a parent it does not belong to
    #[error("node {child} is not a child of node {parent}")]
    NotAChild {
        /// Expected parent
        parent: String,
        /// Node that was not found among its children
        child: String,
    },

    /// Walking upwards ended before reaching the requested level
    #[error("node {node} has no ancestor at level {level}")]
    MissingAncestor {
        /// Node the walk started from
        node: String,
        /// Level that was requested
        level: Level,
    },

    /// A tracker already has an entry for the node
    #[error("tracker '{tracker}' already tracks node {node}")]
    DoubleRegistration {
        /// Tracker key
        tracker: String,
        /// Node that was registered twice
        node: String,
    },

    /// A tracker was asked about a node it does not track
    #[error("tracker '{tracker}' does not track node {node}")]
    UnregisteredNode {
        /// Tracker key
        tracker: String,
        /// Node that was not registered
        node: String,
    },

    /// Subtracting matches would make a count negative
    #[error("tracker '{tracker}' count for node {node} would drop below zero")]
    CountUnderflow {
        /// Tracker key
        tracker: String,
        /// Node whose count underflowed
        node: String,
    },

    /// A node's cached leaf count disagrees with its children, or is smaller
    /// than the leaves being detached below it
    #[error("node {node} caches {cached} leaves but has {actual}")]
    LeafCountMismatch {
        /// Node with the stale cache
        node: String,
        /// Cached value
        cached: usize,
        /// Sum over the children, or the detached leaves
        actual: usize,
    },

    /// Two rules share the same key
    #[error("duplicate definition for tracking rule '{0}'")]
    DuplicateRule(String),

    /// Links only exist at the construct and cluster levels
    #[error("bodies cannot be linked at level {0}")]
    InvalidLinkLevel(Level),

    /// An operation that needs a running manager was called while stopped
    #[error("tracking manager is not running")]
    NotRunning,
}

/// Result alias for invariant-checked operations
pub type TrackingResult<T> = std::result::Result<T, TrackingError>;
