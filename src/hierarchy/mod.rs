//! Containment hierarchy of bodies, constructs and clusters.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`] handles:
//! children are owned by index, parents are plain back-references. Every
//! node caches the number of leaves below it, and every structural edit keeps
//! that cache exact along the whole ancestor chain.
//!
//! Deletion happens in two phases. [`Hierarchy::mark_for_removal`] only flags
//! nodes, so traversals already in flight keep seeing a consistent tree;
//! [`Hierarchy::prune`] later unlinks and frees whatever is fully marked.

mod node;

pub use node::{Node, NodeId, NodeKind};

use crate::error::{TrackingError, TrackingResult};
use crate::model::{BodyId, Level, Unit};
use std::fmt::Write as _;

/// Arena slot; the generation is bumped every time the slot is freed
#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-backed containment tree
#[derive(Debug, Default)]
pub struct Hierarchy {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Live clusters, in creation order
    roots: Vec<NodeId>,
    /// Nodes marked since the last prune
    pending_removal: Vec<NodeId>,
}

impl Hierarchy {
    /// Create an empty hierarchy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes, marked ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    /// Check if the arena holds no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every node and invalidate all handles
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.roots.clear();
        self.pending_removal.clear();
    }

    /// Insert an unattached leaf for a body
    pub fn insert_leaf(&mut self, body: BodyId, units: Vec<Unit>) -> NodeId {
        self.insert(Node::new(NodeKind::UnitGroup { body, units }))
    }

    /// Insert an empty internal node; clusters become roots immediately
    ///
    /// # Errors
    ///
    /// Returns an error for [`Level::Body`], since leaves need a body
    pub fn insert_internal(&mut self, level: Level) -> TrackingResult<NodeId> {
        let kind = match level {
            Level::Construct => NodeKind::Construct,
            Level::Cluster => NodeKind::Cluster,
            Level::Body => return Err(TrackingError::InvalidLinkLevel(level)),
        };
        let id = self.insert(Node::new(kind));
        if level == Level::TOP {
            self.roots.push(id);
        }
        Ok(id)
    }

    fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Check if the handle still refers to a live node
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.node.is_some())
    }

    /// Look up a node
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::StaleNode`] if the handle is no longer live
    pub fn get(&self, id: NodeId) -> TrackingResult<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or_else(|| TrackingError::StaleNode(id.to_string()))
    }

    fn get_mut(&mut self, id: NodeId) -> TrackingResult<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or_else(|| TrackingError::StaleNode(id.to_string()))
    }

    /// Level of a node
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is stale
    pub fn level(&self, id: NodeId) -> TrackingResult<Level> {
        Ok(self.get(id)?.level())
    }

    /// Mutable access to a leaf's unit list
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is stale or not a leaf
    pub fn units_mut(&mut self, id: NodeId) -> TrackingResult<&mut Vec<Unit>> {
        match &mut self.get_mut(id)?.kind {
            NodeKind::UnitGroup { units, .. } => Ok(units),
            _ => Err(TrackingError::MissingAncestor {
                node: id.to_string(),
                level: Level::Body,
            }),
        }
    }

    /// Live clusters
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Attach an orphan `child` under `parent` and add its leaves to every ancestor
    ///
    /// # Errors
    ///
    /// Returns an error if either handle is stale or the child already has a parent
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> TrackingResult<()> {
        self.get(parent)?;
        let child_node = self.get_mut(child)?;
        if child_node.parent.is_some() {
            return Err(TrackingError::AlreadyParented(child.to_string()));
        }
        child_node.parent = Some(parent);
        let delta = child_node.leaf_count;

        self.get_mut(parent)?.children.push(child);
        self.propagate(Some(parent), delta, true)
    }

    /// Detach `child` from `parent` and subtract its leaves from every ancestor
    ///
    /// # Errors
    ///
    /// Returns an error if either handle is stale or `child` is not under `parent`
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> TrackingResult<()> {
        let delta = self.get(child)?.leaf_count;
        let parent_node = self.get_mut(parent)?;
        let position = parent_node
            .children
            .iter()
            .position(|c| *c == child)
            .ok_or_else(|| TrackingError::NotAChild {
                parent: parent.to_string(),
                child: child.to_string(),
            })?;
        parent_node.children.remove(position);
        self.get_mut(child)?.parent = None;
        self.propagate(Some(parent), delta, false)
    }

    fn propagate(&mut self, start: Option<NodeId>, delta: usize, add: bool) -> TrackingResult<()> {
        let mut current = start;
        while let Some(id) = current {
            let node = self.get_mut(id)?;
            if add {
                node.leaf_count += delta;
            } else {
                let cached = node.leaf_count;
                node.leaf_count =
                    cached
                        .checked_sub(delta)
                        .ok_or_else(|| TrackingError::LeafCountMismatch {
                            node: id.to_string(),
                            cached,
                            actual: delta,
                        })?;
            }
            current = node.parent;
        }
        Ok(())
    }

    /// Move `child` under `new_parent`, detaching it from its current parent
    ///
    /// # Errors
    ///
    /// Returns an error if a handle is stale
    pub fn reparent(&mut self, child: NodeId, new_parent: NodeId) -> TrackingResult<()> {
        if let Some(old) = self.get(child)?.parent {
            if old == new_parent {
                return Ok(());
            }
            self.remove_child(old, child)?;
        }
        self.add_child(new_parent, child)
    }

    /// Move every live child of `from` under `to`, returning the moved handles
    ///
    /// Marked children stay where they are and go away with `from`.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle is stale
    pub fn move_children(&mut self, from: NodeId, to: NodeId) -> TrackingResult<Vec<NodeId>> {
        let live = self.live_children(from)?;
        for child in &live {
            self.remove_child(from, *child)?;
            self.add_child(to, *child)?;
        }
        Ok(live)
    }

    /// Children of a node that are not marked for removal
    ///
    /// # Errors
    ///
    /// Returns an error if a handle is stale
    pub fn live_children(&self, id: NodeId) -> TrackingResult<Vec<NodeId>> {
        let node = self.get(id)?;
        let mut live = Vec::with_capacity(node.children.len());
        for child in &node.children {
            if !self.get(*child)?.marked {
                live.push(*child);
            }
        }
        Ok(live)
    }

    /// Closest ancestor (or the node itself) at `level`
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::MissingAncestor`] if the chain ends first
    pub fn ancestor_of_level(&self, id: NodeId, level: Level) -> TrackingResult<NodeId> {
        self.find_ancestor_of_level(id, level)?
            .ok_or_else(|| TrackingError::MissingAncestor {
                node: id.to_string(),
                level,
            })
    }

    /// Like [`Self::ancestor_of_level`] but reports a missing ancestor as `None`
    ///
    /// # Errors
    ///
    /// Returns an error if a handle on the chain is stale
    pub fn find_ancestor_of_level(&self, id: NodeId, level: Level) -> TrackingResult<Option<NodeId>> {
        let mut current = Some(id);
        while let Some(candidate) = current {
            let node = self.get(candidate)?;
            if node.level() == level {
                return Ok(Some(candidate));
            }
            if node.level() > level {
                return Ok(None);
            }
            current = node.parent;
        }
        Ok(None)
    }

    /// Furthest ancestor (or the node itself) of which `id` is the sole live descendant
    ///
    /// Detaching the returned node removes `id` and every ancestor that would
    /// otherwise be left empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle on the chain is stale
    pub fn highest_sole_ancestor(&self, id: NodeId) -> TrackingResult<NodeId> {
        let mut current = id;
        while let Some(parent) = self.get(current)?.parent {
            if self.live_children(parent)?.len() != 1 {
                break;
            }
            current = parent;
        }
        Ok(current)
    }

    /// Live nodes of `level` under `id` (or `id` itself), depth-first in insertion order
    ///
    /// # Errors
    ///
    /// Returns an error if a handle is stale
    pub fn descendants_of_level(&self, id: NodeId, level: Level) -> TrackingResult<Vec<NodeId>> {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.get(current)?;
            if node.marked {
                continue;
            }
            if node.level() == level {
                found.push(current);
            } else if node.level() > level {
                stack.extend(node.children.iter().rev());
            }
        }
        Ok(found)
    }

    /// Live leaves under `id`, depth-first in insertion order
    ///
    /// # Errors
    ///
    /// Returns an error if a handle is stale
    pub fn leaves(&self, id: NodeId) -> TrackingResult<Vec<NodeId>> {
        self.descendants_of_level(id, Level::Body)
    }

    /// Bodies of the live leaves under `id`
    ///
    /// # Errors
    ///
    /// Returns an error if a handle is stale
    pub fn bodies_under(&self, id: NodeId) -> TrackingResult<Vec<BodyId>> {
        let mut bodies = Vec::new();
        for leaf in self.leaves(id)? {
            if let Some(body) = self.get(leaf)?.body() {
                bodies.push(body);
            }
        }
        Ok(bodies)
    }

    /// Units of every live leaf under `id`
    ///
    /// # Errors
    ///
    /// Returns an error if a handle is stale
    pub fn units_under(&self, id: NodeId) -> TrackingResult<Vec<&Unit>> {
        let mut units = Vec::new();
        for leaf in self.leaves(id)? {
            units.extend(self.get(leaf)?.units());
        }
        Ok(units)
    }

    /// Every live node of `level` reachable from a root
    #[must_use]
    pub fn nodes_of_level(&self, level: Level) -> Vec<NodeId> {
        self.roots
            .iter()
            .filter_map(|root| self.descendants_of_level(*root, level).ok())
            .flatten()
            .collect()
    }

    /// Flag a node for the next [`Self::prune`]
    ///
    /// The mark cascades to a parent once every one of its children is marked.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle is stale
    pub fn mark_for_removal(&mut self, id: NodeId) -> TrackingResult<()> {
        let mut current = Some(id);
        while let Some(target) = current {
            let node = self.get_mut(target)?;
            if node.marked {
                break;
            }
            node.marked = true;
            let parent = node.parent;
            self.pending_removal.push(target);

            current = match parent {
                Some(parent) if self.live_children(parent)?.is_empty() => Some(parent),
                _ => None,
            };
        }
        Ok(())
    }

    /// Number of nodes waiting for a prune
    #[must_use]
    pub fn pending_removals(&self) -> usize {
        self.pending_removal.len()
    }

    /// Unlink and free every fully marked subtree, returning the number of freed nodes
    ///
    /// A marked node that still has live descendants only loses its marked
    /// children; it stays queued until it empties out.
    ///
    /// # Errors
    ///
    /// Returns an error if the arena is inconsistent
    pub fn prune(&mut self) -> TrackingResult<usize> {
        let queued = std::mem::take(&mut self.pending_removal);
        let mut freed = 0;
        let mut keep = Vec::new();

        for id in queued {
            if !self.contains(id) {
                continue;
            }
            if self.fully_marked(id)? {
                if let Some(parent) = self.get(id)?.parent {
                    self.remove_child(parent, id)?;
                }
                freed += self.free_subtree(id)?;
            } else {
                freed += self.prune_marked_children(id)?;
                keep.push(id);
            }
        }

        self.pending_removal = keep;
        Ok(freed)
    }

    fn prune_marked_children(&mut self, id: NodeId) -> TrackingResult<usize> {
        let mut freed = 0;
        for child in self.get(id)?.children.clone() {
            if self.fully_marked(child)? {
                self.remove_child(id, child)?;
                freed += self.free_subtree(child)?;
            } else if self.get(child)?.marked {
                freed += self.prune_marked_children(child)?;
            }
        }
        Ok(freed)
    }

    fn fully_marked(&self, id: NodeId) -> TrackingResult<bool> {
        let node = self.get(id)?;
        if !node.marked {
            return Ok(false);
        }
        for child in &node.children {
            if !self.fully_marked(*child)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn free_subtree(&mut self, id: NodeId) -> TrackingResult<usize> {
        let children = self.get(id)?.children.clone();
        let mut freed = 0;
        for child in children {
            freed += self.free_subtree(child)?;
        }

        let slot = &mut self.slots[id.index as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.roots.retain(|root| *root != id);
        Ok(freed + 1)
    }

    /// Verify parent links, child membership and cached leaf counts
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found
    pub fn validate(&self) -> TrackingResult<()> {
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(node) = &slot.node else { continue };
            let id = NodeId {
                index: index as u32,
                generation: slot.generation,
            };

            if let Some(parent) = node.parent {
                if !self.get(parent)?.children.contains(&id) {
                    return Err(TrackingError::NotAChild {
                        parent: parent.to_string(),
                        child: id.to_string(),
                    });
                }
            }

            let expected = match node.kind {
                NodeKind::UnitGroup { .. } => 1,
                _ => {
                    let mut sum = 0;
                    for child in &node.children {
                        let child_node = self.get(*child)?;
                        if child_node.parent != Some(id) {
                            return Err(TrackingError::NotAChild {
                                parent: id.to_string(),
                                child: child.to_string(),
                            });
                        }
                        sum += child_node.leaf_count;
                    }
                    sum
                }
            };
            if node.leaf_count != expected {
                return Err(TrackingError::LeafCountMismatch {
                    node: id.to_string(),
                    cached: node.leaf_count,
                    actual: expected,
                });
            }
        }
        Ok(())
    }

    /// Render the tree below every root, one node per line
    ///
    /// `describe` supplies the label of each leaf.
    #[must_use]
    pub fn render(&self, describe: impl Fn(BodyId) -> String) -> String {
        let mut out = String::new();
        let mut stack: Vec<(NodeId, usize)> = self.roots.iter().rev().map(|r| (*r, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            let Ok(node) = self.get(id) else { continue };
            if node.marked {
                continue;
            }
            let indent = "  ".repeat(depth);
            let _ = match node.kind() {
                NodeKind::UnitGroup { body, units } => writeln!(
                    out,
                    "{indent}- body {} {} ({} units)",
                    body,
                    describe(*body),
                    units.len()
                ),
                _ => writeln!(
                    out,
                    "{indent}- {} {} ({} bodies)",
                    node.level(),
                    id,
                    node.leaf_count
                ),
            };
            for child in node.children.iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
        out
    }
}
