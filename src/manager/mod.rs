//! The tracking manager ties the hierarchy, the trackers and the event source together.
//!
//! Every structural change goes through the event handlers on
//! [`TrackingManager`]. They must be called one at a time; threaded hosts go
//! through [`TrackingService`], which keeps the manager behind a mutex. Bulk
//! unit scans inside a handler run in parallel.
//!
//! # Merging
//!
//! Linking two bodies at a level unifies their ancestors bottom-up: the
//! smaller ancestor hands its live children to the larger one, is marked for
//! removal, and the walk continues one level up until both sides share an
//! ancestor.
//!
//! # Splitting
//!
//! Unlinking re-derives connectivity from the event source for every level
//! from the link level upwards. The largest connected component keeps the
//! existing node; every other component gets a fresh node.

pub mod notify;
pub mod service;

pub use notify::{GroupMatch, NotificationReport};
pub use service::{ServiceOptions, TrackingService};

use crate::config::GroupConfig;
use crate::error::{TrackingError, TrackingResult};
use crate::hierarchy::{Hierarchy, NodeId};
use crate::model::{BodyId, Level, LinkKind, Unit};
use crate::rules::compile_rules;
use crate::source::{EventSource, SourceEvent};
use crate::tracker::{RuleTracker, ScanJob, scan_units};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::fmt::Write as _;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, info_span, trace, warn};

/// Lifecycle of a [`TrackingManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Incrementally maintained hierarchy plus per-rule counts
pub struct TrackingManager {
    source: Arc<dyn EventSource>,
    groups: Vec<GroupConfig>,
    state: ManagerState,
    tree: Hierarchy,
    trackers: Vec<RuleTracker>,
    /// Trackers of each group, by index into `trackers`
    group_trackers: Vec<Range<usize>>,
    registry: HashMap<BodyId, NodeId>,
    /// Bodies whose leaf exists but is not yet attached or counted
    pending: BTreeSet<BodyId>,
    warnings: Vec<String>,
}

impl fmt::Debug for TrackingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingManager")
            .field("state", &self.state)
            .field("groups", &self.groups.len())
            .field("trackers", &self.trackers.len())
            .field("bodies", &self.registry.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl TrackingManager {
    /// Create a stopped manager
    #[must_use]
    pub fn new(source: Arc<dyn EventSource>, groups: Vec<GroupConfig>) -> Self {
        Self {
            source,
            groups,
            state: ManagerState::Stopped,
            tree: Hierarchy::new(),
            trackers: Vec::new(),
            group_trackers: Vec::new(),
            registry: HashMap::new(),
            pending: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> ManagerState {
        self.state
    }

    /// Whether event handlers are active
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == ManagerState::Running
    }

    /// Configured groups
    #[must_use]
    pub fn groups(&self) -> &[GroupConfig] {
        &self.groups
    }

    /// Build trackers and the hierarchy from the event source
    ///
    /// Does nothing if already running. On failure every partial state is
    /// dropped and the manager is left stopped.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate rule keys or a broken invariant
    pub fn start(&mut self) -> TrackingResult<()> {
        if self.is_running() {
            debug!("Tracking already running");
            return Ok(());
        }

        let _span = info_span!("start").entered();
        self.state = ManagerState::Starting;

        match self.build() {
            Ok(()) => {
                self.state = ManagerState::Running;
                info!(
                    bodies = self.registry.len(),
                    trackers = self.trackers.len(),
                    clusters = self.tree.roots().len(),
                    "Tracking started"
                );
                Ok(())
            }
            Err(e) => {
                warn!("Tracking failed to start: {e}");
                self.clear();
                self.state = ManagerState::Stopped;
                Err(e)
            }
        }
    }

    fn build(&mut self) -> TrackingResult<()> {
        self.install_trackers()?;
        for body in self.source.bodies() {
            self.insert_pending(body);
        }
        self.promote_all()?;
        self.tree.prune()?;
        Ok(())
    }

    /// Drop all tracking state; idempotent
    pub fn stop(&mut self) {
        if self.state == ManagerState::Stopped {
            return;
        }
        self.state = ManagerState::Stopping;
        self.clear();
        self.state = ManagerState::Stopped;
        info!("Tracking stopped");
    }

    fn clear(&mut self) {
        self.tree.clear();
        self.trackers.clear();
        self.group_trackers.clear();
        self.registry.clear();
        self.pending.clear();
        self.warnings.clear();
    }

    /// Replace the configured groups
    ///
    /// While running, trackers are rebuilt and reseeded from the live tree.
    /// If the new rules do not compile or cannot be seeded, the previous
    /// groups and trackers stay in place.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate rule keys or a broken invariant
    pub fn reload_rules(&mut self, groups: Vec<GroupConfig>) -> TrackingResult<()> {
        if !self.is_running() {
            self.groups = groups;
            return Ok(());
        }

        let previous_groups = std::mem::replace(&mut self.groups, groups);
        let previous_trackers = std::mem::take(&mut self.trackers);
        let previous_ranges = std::mem::take(&mut self.group_trackers);
        let previous_warnings = std::mem::take(&mut self.warnings);

        if let Err(e) = self.install_trackers().and_then(|()| self.reseed()) {
            warn!("Rule reload failed, keeping previous rules: {e}");
            self.groups = previous_groups;
            self.trackers = previous_trackers;
            self.group_trackers = previous_ranges;
            self.warnings = previous_warnings;
            return Err(e);
        }
        info!(trackers = self.trackers.len(), "Rules reloaded");
        Ok(())
    }

    fn install_trackers(&mut self) -> TrackingResult<()> {
        let compiled = compile_rules(&self.groups, &self.source.catalog())?;

        let mut ranges = Vec::with_capacity(self.groups.len());
        let mut start = 0;
        for group in &self.groups {
            ranges.push(start..start + group.rules.len());
            start += group.rules.len();
        }

        self.trackers = compiled.rules.into_iter().map(RuleTracker::new).collect();
        self.group_trackers = ranges;
        self.warnings = compiled.warnings;
        Ok(())
    }

    fn reseed(&mut self) -> TrackingResult<()> {
        for tracker in &mut self.trackers {
            for node in self.tree.nodes_of_level(tracker.level()) {
                tracker.register_node(&self.tree, node)?;
            }
        }
        for leaf in self.tree.nodes_of_level(Level::Body) {
            self.scan_leaf(leaf)?;
        }
        Ok(())
    }

    fn leaf_of(&self, body: BodyId) -> TrackingResult<NodeId> {
        self.registry
            .get(&body)
            .copied()
            .ok_or(TrackingError::UnknownBody(body))
    }

    fn insert_pending(&mut self, body: BodyId) -> bool {
        if self.registry.contains_key(&body) {
            return false;
        }
        let leaf = self.tree.insert_leaf(body, self.source.units(body));
        self.registry.insert(body, leaf);
        self.pending.insert(body);
        true
    }

    /// Scan a set of units once for many jobs and apply the results
    fn run_jobs(&mut self, scope: NodeId, jobs: Vec<(usize, ScanJob)>) -> TrackingResult<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        let (indices, jobs): (Vec<usize>, Vec<ScanJob>) = jobs.into_iter().unzip();
        {
            let units = self.tree.units_under(scope)?;
            scan_units(&units, &jobs);
        }
        for (index, job) in indices.into_iter().zip(jobs) {
            self.trackers[index].finish(job)?;
        }
        Ok(())
    }

    fn scan_leaf(&mut self, leaf: NodeId) -> TrackingResult<()> {
        let mut jobs = Vec::with_capacity(self.trackers.len());
        for (index, tracker) in self.trackers.iter().enumerate() {
            jobs.push((index, tracker.scan_job(&self.tree, leaf)?));
        }
        self.run_jobs(leaf, jobs)
    }

    fn promote_all(&mut self) -> TrackingResult<usize> {
        let bodies: Vec<BodyId> = self.pending.iter().copied().collect();
        for body in &bodies {
            self.promote(*body)?;
        }
        Ok(bodies.len())
    }

    /// Give a pending body its own construct and cluster, count it, and link it up
    fn promote(&mut self, body: BodyId) -> TrackingResult<()> {
        if !self.pending.remove(&body) {
            return Ok(());
        }
        let leaf = self.leaf_of(body)?;

        let construct = self.tree.insert_internal(Level::Construct)?;
        let cluster = self.tree.insert_internal(Level::Cluster)?;
        self.tree.add_child(construct, leaf)?;
        self.tree.add_child(cluster, construct)?;

        for tracker in &mut self.trackers {
            tracker.register_node(&self.tree, leaf)?;
        }
        self.scan_leaf(leaf)?;

        for kind in [LinkKind::Soft, LinkKind::Hard] {
            for neighbour in self.source.linked_bodies(body, kind) {
                if neighbour == body
                    || self.pending.contains(&neighbour)
                    || !self.registry.contains_key(&neighbour)
                {
                    continue;
                }
                self.connect(body, neighbour, kind.level())?;
            }
        }

        trace!(%body, "Promoted pending body");
        Ok(())
    }

    /// Promote every pending body, returning how many were promoted
    ///
    /// # Errors
    ///
    /// Returns an error if a broken invariant is detected
    pub fn finalize_pending(&mut self) -> TrackingResult<usize> {
        if !self.is_running() || self.pending.is_empty() {
            return Ok(0);
        }
        let promoted = self.promote_all()?;
        self.tree.prune()?;
        debug!(promoted, "Finalized pending bodies");
        Ok(promoted)
    }

    /// Unify the ancestors of two bodies from `level` upwards
    fn connect(&mut self, a: BodyId, b: BodyId, level: Level) -> TrackingResult<()> {
        if level == Level::Body {
            return Err(TrackingError::InvalidLinkLevel(level));
        }
        let mut x = self.tree.ancestor_of_level(self.leaf_of(a)?, level)?;
        let mut y = self.tree.ancestor_of_level(self.leaf_of(b)?, level)?;
        let mut current = level;

        loop {
            if x == y {
                break;
            }
            if self.keeps_second(x, y)? {
                std::mem::swap(&mut x, &mut y);
            }
            let next_x = self.tree.get(x)?.parent();
            let next_y = self.tree.get(y)?.parent();

            let mut jobs = Vec::new();
            for (index, tracker) in self.trackers.iter_mut().enumerate() {
                if tracker.level() != current {
                    continue;
                }
                if let Some(job) = tracker.merge_into(&self.tree, y, x)? {
                    jobs.push((index, job));
                }
            }
            self.run_jobs(y, jobs)?;

            let moved = self.tree.move_children(y, x)?;
            self.tree.mark_for_removal(y)?;
            trace!(level = %current, from = %y, into = %x, moved = moved.len(), "Merged nodes");

            match (current.parent(), next_x, next_y) {
                (Some(up), Some(px), Some(py)) => {
                    x = px;
                    y = py;
                    current = up;
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Whether `y` should survive a merge instead of `x`
    fn keeps_second(&self, x: NodeId, y: NodeId) -> TrackingResult<bool> {
        let first = self.tree.get(x)?;
        let second = self.tree.get(y)?;
        if first.is_marked() {
            return Ok(true);
        }
        Ok(!second.is_marked() && second.leaf_count() > first.leaf_count())
    }

    /// Re-check connectivity from `level` upwards after a link between `a` and `b` went away
    fn disconnect(&mut self, a: BodyId, b: BodyId, level: Level) -> TrackingResult<()> {
        if level == Level::Body {
            return Err(TrackingError::InvalidLinkLevel(level));
        }
        let leaf_a = self.leaf_of(a)?;
        let leaf_b = self.leaf_of(b)?;

        let mut current = Some(level);
        while let Some(level) = current {
            let node_a = self.tree.ancestor_of_level(leaf_a, level)?;
            let node_b = self.tree.ancestor_of_level(leaf_b, level)?;
            if node_a == node_b && !self.split_node(node_a, level)? {
                // Still connected here, so connected at every level above too
                break;
            }
            current = level.parent();
        }
        Ok(())
    }

    /// Split `node` along the connected components of its bodies
    ///
    /// Returns whether anything was split off.
    fn split_node(&mut self, node: NodeId, level: Level) -> TrackingResult<bool> {
        let bodies = self.tree.bodies_under(node)?;
        let components = self.components(&bodies, level);
        if components.len() <= 1 {
            return Ok(false);
        }

        let keep = components
            .iter()
            .enumerate()
            .max_by(|(i, a), (j, b)| a.len().cmp(&b.len()).then(j.cmp(i)))
            .map_or(0, |(index, _)| index);

        for (index, component) in components.iter().enumerate() {
            if index == keep {
                continue;
            }
            let fresh = self.split_off(node, level, component)?;

            let mut jobs = Vec::new();
            for (index, tracker) in self.trackers.iter_mut().enumerate() {
                if tracker.level() != level {
                    continue;
                }
                tracker.register_node(&self.tree, fresh)?;
                jobs.push((index, tracker.split(node, fresh)?));
            }
            self.run_jobs(fresh, jobs)?;
        }

        debug!(%node, %level, parts = components.len(), "Split node");
        Ok(true)
    }

    /// Move the bodies of one component from `node` into a new node of `level`
    fn split_off(&mut self, node: NodeId, level: Level, component: &[BodyId]) -> TrackingResult<NodeId> {
        let fresh = self.tree.insert_internal(level)?;
        match level {
            Level::Construct => {
                if let Some(parent) = self.tree.get(node)?.parent() {
                    self.tree.add_child(parent, fresh)?;
                }
                for body in component {
                    let leaf = self.leaf_of(*body)?;
                    self.tree.reparent(leaf, fresh)?;
                }
            }
            Level::Cluster => {
                let mut moved = HashSet::new();
                for body in component {
                    let construct = self
                        .tree
                        .ancestor_of_level(self.leaf_of(*body)?, Level::Construct)?;
                    if moved.insert(construct) {
                        self.tree.reparent(construct, fresh)?;
                    }
                }
            }
            Level::Body => return Err(TrackingError::InvalidLinkLevel(level)),
        }
        Ok(fresh)
    }

    /// Connected components of `bodies` using the link kinds of `level`
    fn components(&self, bodies: &[BodyId], level: Level) -> Vec<Vec<BodyId>> {
        let members: HashSet<BodyId> = bodies.iter().copied().collect();
        let mut seen = HashSet::with_capacity(bodies.len());
        let mut components = Vec::new();

        for start in bodies {
            if !seen.insert(*start) {
                continue;
            }
            let mut component = vec![*start];
            let mut queue = VecDeque::from([*start]);
            while let Some(body) = queue.pop_front() {
                for kind in level.link_kinds() {
                    for neighbour in self.source.linked_bodies(body, *kind) {
                        if members.contains(&neighbour) && seen.insert(neighbour) {
                            component.push(neighbour);
                            queue.push_back(neighbour);
                        }
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Handle a new body; it stays pending until linked or finalized
    ///
    /// # Errors
    ///
    /// Never fails today; kept fallible like the other handlers
    pub fn body_created(&mut self, body: BodyId) -> TrackingResult<()> {
        if !self.is_running() {
            return Ok(());
        }
        if !self.insert_pending(body) {
            debug!(%body, "Body already registered");
        }
        Ok(())
    }

    /// Handle a destroyed body
    ///
    /// The highest ancestor the body is the only member of is detached,
    /// uncounted and marked; whatever remains of the body's former
    /// construct and cluster is re-split if the body was holding it together.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is unknown or an invariant breaks
    pub fn body_destroyed(&mut self, body: BodyId) -> TrackingResult<()> {
        if !self.is_running() {
            return Ok(());
        }
        let leaf = self.leaf_of(body)?;

        if self.pending.remove(&body) {
            self.registry.remove(&body);
            self.tree.mark_for_removal(leaf)?;
            self.tree.prune()?;
            return Ok(());
        }

        let top = self.tree.highest_sole_ancestor(leaf)?;
        let survivor = self.tree.get(top)?.parent();

        let mut jobs = Vec::new();
        for (index, tracker) in self.trackers.iter_mut().enumerate() {
            if let Some(job) = tracker.unregister(&self.tree, top)? {
                jobs.push((index, job));
            }
        }
        self.run_jobs(top, jobs)?;

        self.tree.mark_for_removal(top)?;
        self.registry.remove(&body);

        if let Some(survivor) = survivor {
            let mut level = Some(self.tree.level(survivor)?);
            while let Some(current) = level {
                let node = self.tree.ancestor_of_level(survivor, current)?;
                self.split_node(node, current)?;
                level = current.parent();
            }
        }

        self.tree.prune()?;
        debug!(%body, "Body removed");
        Ok(())
    }

    /// Handle a unit added to a body
    ///
    /// # Errors
    ///
    /// Returns an error if the body is unknown or an invariant breaks
    pub fn unit_added(&mut self, body: BodyId, unit: Unit) -> TrackingResult<()> {
        if !self.is_running() {
            return Ok(());
        }
        let leaf = self.leaf_of(body)?;
        if !self.pending.contains(&body) {
            for tracker in &mut self.trackers {
                tracker.register_unit(&self.tree, leaf, &unit)?;
            }
        }
        self.tree.units_mut(leaf)?.push(unit);
        Ok(())
    }

    /// Handle a unit removed from a body
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not hold the unit or an invariant breaks
    pub fn unit_removed(&mut self, body: BodyId, unit: &Unit) -> TrackingResult<()> {
        if !self.is_running() {
            return Ok(());
        }
        let leaf = self.leaf_of(body)?;
        let units = self.tree.units_mut(leaf)?;
        let position = units
            .iter()
            .position(|u| u == unit)
            .ok_or_else(|| TrackingError::UnknownUnit {
                body,
                unit: unit.clone(),
            })?;
        units.remove(position);

        if !self.pending.contains(&body) {
            for tracker in &mut self.trackers {
                tracker.unregister_unit(&self.tree, leaf, unit)?;
            }
        }
        Ok(())
    }

    /// Handle a new link between two bodies
    ///
    /// # Errors
    ///
    /// Returns an error if a body is unknown or an invariant breaks
    pub fn linked(&mut self, a: BodyId, b: BodyId, kind: LinkKind) -> TrackingResult<()> {
        if !self.is_running() || a == b {
            return Ok(());
        }
        self.leaf_of(a)?;
        self.leaf_of(b)?;
        self.promote(a)?;
        self.promote(b)?;
        self.connect(a, b, kind.level())?;
        self.tree.prune()?;
        Ok(())
    }

    /// Handle a removed link between two bodies
    ///
    /// # Errors
    ///
    /// Returns an error if a body is unknown or an invariant breaks
    pub fn unlinked(&mut self, a: BodyId, b: BodyId, kind: LinkKind) -> TrackingResult<()> {
        if !self.is_running() || a == b {
            return Ok(());
        }
        self.leaf_of(a)?;
        self.leaf_of(b)?;
        self.promote(a)?;
        self.promote(b)?;
        self.disconnect(a, b, kind.level())?;
        self.tree.prune()?;
        Ok(())
    }

    /// Dispatch an event to its handler; `Notify` is left to the caller
    ///
    /// # Errors
    ///
    /// Returns whatever the handler returns
    pub fn handle_event(&mut self, event: &SourceEvent) -> TrackingResult<()> {
        match event {
            SourceEvent::BodyCreated { body, .. } => self.body_created(*body),
            SourceEvent::BodyDestroyed { body } => self.body_destroyed(*body),
            SourceEvent::UnitAdded { body, unit } => self.unit_added(*body, unit.clone()),
            SourceEvent::UnitRemoved { body, unit } => self.unit_removed(*body, unit),
            SourceEvent::Linked { a, b, kind } => self.linked(*a, *b, *kind),
            SourceEvent::Unlinked { a, b, kind } => self.unlinked(*a, *b, *kind),
            SourceEvent::Notify => Ok(()),
        }
    }

    /// The containment hierarchy
    #[must_use]
    pub const fn tree(&self) -> &Hierarchy {
        &self.tree
    }

    /// All trackers, grouped by configuration order
    #[must_use]
    pub fn trackers(&self) -> &[RuleTracker] {
        &self.trackers
    }

    /// Tracker for a rule key such as `Industry/refineries`
    #[must_use]
    pub fn tracker(&self, key: &str) -> Option<&RuleTracker> {
        self.trackers.iter().find(|tracker| tracker.key().as_str() == key)
    }

    /// Leaf node of a registered body
    #[must_use]
    pub fn node_of_body(&self, body: BodyId) -> Option<NodeId> {
        self.registry.get(&body).copied()
    }

    /// Ancestor of a body at `level`, if the body is attached
    #[must_use]
    pub fn ancestor_of_body(&self, body: BodyId, level: Level) -> Option<NodeId> {
        let leaf = self.node_of_body(body)?;
        self.tree.find_ancestor_of_level(leaf, level).ok().flatten()
    }

    /// Bodies created but not yet attached
    #[must_use]
    pub fn pending_bodies(&self) -> Vec<BodyId> {
        self.pending.iter().copied().collect()
    }

    /// Rule configuration problems found by the last start or reload
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Number of live nodes of `level` reachable from a root
    #[must_use]
    pub fn count_nodes_of_level(&self, level: Level) -> usize {
        self.tree.nodes_of_level(level).len()
    }

    /// Display name of a node: its first body, plus how many others it holds
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is stale
    pub fn display_name(&self, node: NodeId) -> TrackingResult<String> {
        let bodies = self.tree.bodies_under(node)?;
        let Some(first) = bodies.first() else {
            return Ok(format!("empty {}", self.tree.level(node)?));
        };
        let name = self.source.body_name(*first);
        Ok(match bodies.len() {
            1 => name,
            n => format!("{name} (+{} more)", n - 1),
        })
    }

    /// Render the hierarchy, one node per line
    #[must_use]
    pub fn list_hierarchy(&self) -> String {
        let mut out = self.tree.render(|body| self.source.body_name(body));
        if !self.pending.is_empty() {
            let _ = writeln!(out, "pending:");
            for body in &self.pending {
                let _ = writeln!(out, "  - body {body} {}", self.source.body_name(*body));
            }
        }
        out
    }

    /// Render every tracker with its counts
    #[must_use]
    pub fn list_trackers(&self) -> String {
        let mut out = String::new();
        for tracker in &self.trackers {
            let rule = tracker.rule();
            let _ = writeln!(
                out,
                "{} [{}] {} {} {}: {} nodes, {} matches",
                rule.key,
                rule.level,
                rule.spec,
                rule.comparison.symbol(),
                rule.threshold,
                tracker.len(),
                tracker.total()
            );
            for (node, count) in tracker.entries() {
                let name = self.display_name(node).unwrap_or_else(|_| "?".to_string());
                let _ = writeln!(out, "  {node} {name}: {count}");
            }
        }
        out
    }

    /// Check the tree structure and that every live node at a tracker level is tracked
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found
    pub fn validate(&self) -> TrackingResult<()> {
        self.tree.validate()?;
        for tracker in &self.trackers {
            let live = self.tree.nodes_of_level(tracker.level());
            for node in &live {
                if tracker.count(*node).is_none() {
                    return Err(TrackingError::UnregisteredNode {
                        tracker: tracker.key().to_string(),
                        node: node.to_string(),
                    });
                }
            }
            if live.len() != tracker.len() {
                return Err(TrackingError::DoubleRegistration {
                    tracker: tracker.key().to_string(),
                    node: format!("{} stale entries", tracker.len().saturating_sub(live.len())),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;
    use crate::rules::Comparison;
    use crate::source::World;

    fn world() -> Arc<World> {
        let world = World::new();
        world.add_body(
            BodyId(1),
            Some("Alpha".to_string()),
            vec![
                Unit::new("Refinery", "Large", Some(1)),
                Unit::new("Refinery", "Large", Some(1)),
                Unit::new("Armor", "Light", Some(1)),
            ],
        );
        world.add_body(
            BodyId(2),
            Some("Beta".to_string()),
            vec![
                Unit::new("Refinery", "Large", Some(2)),
                Unit::new("Armor", "Light", Some(2)),
            ],
        );
        Arc::new(world)
    }

    fn groups(level: Level) -> Vec<GroupConfig> {
        vec![GroupConfig {
            name: "Industry".to_string(),
            level,
            rules: vec![RuleConfig {
                name: Some("refineries".to_string()),
                matches: "Refinery".to_string(),
                comparison: Comparison::Greater,
                threshold: 1,
            }],
            ..GroupConfig::default()
        }]
    }

    fn count_of(manager: &TrackingManager, body: u64) -> usize {
        let tracker = manager.tracker("Industry/refineries").unwrap();
        let node = manager.ancestor_of_body(BodyId(body), tracker.level()).unwrap();
        tracker.count(node).unwrap()
    }

    #[test]
    fn test_start_builds_one_chain_per_body() {
        let source = world();
        let mut manager = TrackingManager::new(source, groups(Level::Construct));
        manager.start().unwrap();

        assert_eq!(manager.state(), ManagerState::Running);
        assert_eq!(manager.count_nodes_of_level(Level::Cluster), 2);
        assert_eq!(manager.count_nodes_of_level(Level::Construct), 2);
        assert_eq!(count_of(&manager, 1), 2);
        assert_eq!(count_of(&manager, 2), 1);
        manager.validate().unwrap();
    }

    #[test]
    fn test_link_then_unlink_restores_counts() {
        let source = world();
        let mut manager = TrackingManager::new(source.clone(), groups(Level::Construct));
        manager.start().unwrap();

        source.link(BodyId(1), BodyId(2), LinkKind::Soft).unwrap();
        manager.linked(BodyId(1), BodyId(2), LinkKind::Soft).unwrap();
        assert_eq!(manager.count_nodes_of_level(Level::Construct), 1);
        assert_eq!(manager.count_nodes_of_level(Level::Cluster), 1);
        assert_eq!(count_of(&manager, 1), 3);
        manager.validate().unwrap();

        source.unlink(BodyId(1), BodyId(2), LinkKind::Soft).unwrap();
        manager.unlinked(BodyId(1), BodyId(2), LinkKind::Soft).unwrap();
        assert_eq!(manager.count_nodes_of_level(Level::Construct), 2);
        assert_eq!(manager.count_nodes_of_level(Level::Cluster), 2);
        assert_eq!(count_of(&manager, 1), 2);
        assert_eq!(count_of(&manager, 2), 1);
        manager.validate().unwrap();
    }

    #[test]
    fn test_handlers_ignored_while_stopped() {
        let mut manager = TrackingManager::new(world(), groups(Level::Construct));
        manager.body_destroyed(BodyId(42)).unwrap();
        manager.linked(BodyId(1), BodyId(2), LinkKind::Hard).unwrap();
        assert!(manager.tree().is_empty());
    }

    #[test]
    fn test_unknown_body_is_an_error() {
        let mut manager = TrackingManager::new(world(), groups(Level::Construct));
        manager.start().unwrap();
        assert_eq!(
            manager.body_destroyed(BodyId(42)),
            Err(TrackingError::UnknownBody(BodyId(42)))
        );
    }

    #[test]
    fn test_duplicate_rules_leave_manager_stopped() {
        let mut duplicated = groups(Level::Construct);
        duplicated.push(duplicated[0].clone());
        let mut manager = TrackingManager::new(world(), duplicated);

        assert!(matches!(manager.start(), Err(TrackingError::DuplicateRule(_))));
        assert_eq!(manager.state(), ManagerState::Stopped);
        assert!(manager.tree().is_empty());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut manager = TrackingManager::new(world(), groups(Level::Construct));
        manager.start().unwrap();
        manager.start().unwrap();
        manager.stop();
        manager.stop();
        assert_eq!(manager.state(), ManagerState::Stopped);
        assert!(manager.trackers().is_empty());
        assert!(manager.node_of_body(BodyId(1)).is_none());
    }

    #[test]
    fn test_reload_that_cannot_reseed_keeps_previous_trackers() {
        let mut manager = TrackingManager::new(world(), groups(Level::Construct));
        manager.start().unwrap();

        // A leaf hanging straight off a cluster has no construct to count into
        let cluster = manager.tree.insert_internal(Level::Cluster).unwrap();
        let stray = manager.tree.insert_leaf(BodyId(9), Vec::new());
        manager.tree.add_child(cluster, stray).unwrap();

        let mut raised = groups(Level::Construct);
        raised[0].rules[0].threshold = 7;
        assert!(matches!(
            manager.reload_rules(raised),
            Err(TrackingError::MissingAncestor { .. })
        ));

        let tracker = manager.tracker("Industry/refineries").unwrap();
        assert_eq!(tracker.rule().threshold, 1);
        assert_eq!(manager.groups[0].rules[0].threshold, 1);
        assert_eq!(count_of(&manager, 1), 2);
        assert_eq!(count_of(&manager, 2), 1);
        assert!(manager.is_running());
    }
}
