//! Per-rule match counters over the containment hierarchy.
//!
//! A [`RuleTracker`] keeps one count per node at its rule's level. Single-unit
//! events adjust a count directly. Anything that touches many units at once
//! (seeding, splits, removals below the tracker level) is expressed as a
//! [`ScanJob`]: the job is visited concurrently for every unit in a batch and
//! its accumulated delta is applied once with [`RuleTracker::finish`].

use crate::error::{TrackingError, TrackingResult};
use crate::hierarchy::{Hierarchy, NodeId};
use crate::model::{Level, Unit};
use crate::rules::{Rule, RuleKey, UnitPredicate};
use crate::utils::thread_pool::{IntoParallelRefIterator, ParallelIterator, run_in_pool};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// Batches smaller than this are scanned on the calling thread
const PARALLEL_SCAN_THRESHOLD: usize = 256;

/// Where the matches counted by a scan job end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEffect {
    /// Add matches to a node's count
    Add(NodeId),
    /// Subtract matches from a node's count
    Subtract(NodeId),
    /// Subtract matches from `from` and add them to `to`
    Move {
        /// Node losing the matches
        from: NodeId,
        /// Node gaining the matches
        to: NodeId,
    },
}

/// Deferred count adjustment for one tracker
///
/// Visiting is thread-safe; the job only accumulates. Nothing changes in the
/// tracker until the job is handed back to [`RuleTracker::finish`].
#[derive(Debug)]
pub struct ScanJob {
    tracker: RuleKey,
    predicate: Arc<UnitPredicate>,
    effect: ScanEffect,
    matched: AtomicUsize,
}

impl ScanJob {
    fn new(rule: &Rule, effect: ScanEffect) -> Self {
        Self {
            tracker: rule.key.clone(),
            predicate: Arc::clone(&rule.predicate),
            effect,
            matched: AtomicUsize::new(0),
        }
    }

    /// Count the unit if it matches the rule
    pub fn visit(&self, unit: &Unit) {
        if self.predicate.matches(unit) {
            self.matched.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Matches accumulated so far
    #[must_use]
    pub fn matched(&self) -> usize {
        self.matched.load(Ordering::Relaxed)
    }

    /// Key of the tracker this job belongs to
    #[must_use]
    pub const fn tracker(&self) -> &RuleKey {
        &self.tracker
    }

    /// What finishing the job will do
    #[must_use]
    pub const fn effect(&self) -> ScanEffect {
        self.effect
    }
}

/// Visit every unit with every job, in parallel for large batches
pub fn scan_units(units: &[&Unit], jobs: &[ScanJob]) {
    if jobs.is_empty() || units.is_empty() {
        return;
    }
    trace!(units = units.len(), jobs = jobs.len(), "Scanning units");

    if units.len() < PARALLEL_SCAN_THRESHOLD {
        for unit in units {
            for job in jobs {
                job.visit(unit);
            }
        }
        return;
    }

    run_in_pool(|| {
        units.par_iter().for_each(|unit| {
            for job in jobs {
                job.visit(unit);
            }
        });
    });
}

/// Match counts of one rule, keyed by node at the rule's level
#[derive(Debug)]
pub struct RuleTracker {
    rule: Rule,
    counts: HashMap<NodeId, usize>,
}

impl RuleTracker {
    /// Create an empty tracker for a rule
    #[must_use]
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            counts: HashMap::new(),
        }
    }

    /// The tracked rule
    #[must_use]
    pub const fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Unique key of the tracked rule
    #[must_use]
    pub const fn key(&self) -> &RuleKey {
        &self.rule.key
    }

    /// Level whose nodes carry counts
    #[must_use]
    pub const fn level(&self) -> Level {
        self.rule.level
    }

    fn unregistered(&self, node: NodeId) -> TrackingError {
        TrackingError::UnregisteredNode {
            tracker: self.rule.key.to_string(),
            node: node.to_string(),
        }
    }

    fn underflow(&self, node: NodeId) -> TrackingError {
        TrackingError::CountUnderflow {
            tracker: self.rule.key.to_string(),
            node: node.to_string(),
        }
    }

    fn add(&mut self, node: NodeId, amount: usize) -> TrackingResult<()> {
        match self.counts.get_mut(&node) {
            Some(count) => {
                *count += amount;
                Ok(())
            }
            None => Err(self.unregistered(node)),
        }
    }

    fn subtract(&mut self, node: NodeId, amount: usize) -> TrackingResult<()> {
        let Some(count) = self.counts.get(&node).copied() else {
            return Err(self.unregistered(node));
        };
        let remaining = count.checked_sub(amount).ok_or_else(|| self.underflow(node))?;
        self.counts.insert(node, remaining);
        Ok(())
    }

    /// Start tracking the ancestor of `node` at this tracker's level with a zero count
    ///
    /// # Errors
    ///
    /// Returns an error if the ancestor is missing or already tracked
    pub fn register_node(&mut self, tree: &Hierarchy, node: NodeId) -> TrackingResult<NodeId> {
        let target = tree.ancestor_of_level(node, self.level())?;
        if self.counts.contains_key(&target) {
            return Err(TrackingError::DoubleRegistration {
                tracker: self.rule.key.to_string(),
                node: target.to_string(),
            });
        }
        self.counts.insert(target, 0);
        Ok(target)
    }

    /// Job that adds the matches under `node` to its tracked ancestor
    ///
    /// `node` must be at or below the tracker level.
    ///
    /// # Errors
    ///
    /// Returns an error if the ancestor is missing or not tracked
    pub fn scan_job(&self, tree: &Hierarchy, node: NodeId) -> TrackingResult<ScanJob> {
        let target = tree.ancestor_of_level(node, self.level())?;
        if !self.counts.contains_key(&target) {
            return Err(self.unregistered(target));
        }
        Ok(ScanJob::new(&self.rule, ScanEffect::Add(target)))
    }

    /// Count one unit added to `leaf`
    ///
    /// # Errors
    ///
    /// Returns an error if the tracked ancestor is missing or not tracked
    pub fn register_unit(&mut self, tree: &Hierarchy, leaf: NodeId, unit: &Unit) -> TrackingResult<()> {
        if !self.rule.predicate.matches(unit) {
            return Ok(());
        }
        let target = tree.ancestor_of_level(leaf, self.level())?;
        self.add(target, 1)
    }

    /// Uncount one unit removed from `leaf`
    ///
    /// # Errors
    ///
    /// Returns an error if the ancestor is not tracked or the count would underflow
    pub fn unregister_unit(&mut self, tree: &Hierarchy, leaf: NodeId, unit: &Unit) -> TrackingResult<()> {
        if !self.rule.predicate.matches(unit) {
            return Ok(());
        }
        let target = tree.ancestor_of_level(leaf, self.level())?;
        self.subtract(target, 1)
    }

    /// Fold the matches of `from` into `into`
    ///
    /// When `from` sits at the tracker level the counts are summed and
    /// `from`'s entry is dropped. When it sits below, its units are about to
    /// change tracked ancestor, so a moving scan job is returned unless both
    /// nodes already share that ancestor. Above the tracker level nothing
    /// changes.
    ///
    /// # Errors
    ///
    /// Returns an error if either node is stale or not tracked
    pub fn merge_into(
        &mut self,
        tree: &Hierarchy,
        from: NodeId,
        into: NodeId,
    ) -> TrackingResult<Option<ScanJob>> {
        let level = tree.level(from)?;
        if level > self.level() {
            return Ok(None);
        }

        if level == self.level() {
            let moved = self.counts.remove(&from).ok_or_else(|| self.unregistered(from))?;
            self.add(into, moved)?;
            return Ok(None);
        }

        let old = tree.ancestor_of_level(from, self.level())?;
        let new = tree.ancestor_of_level(into, self.level())?;
        if old == new {
            return Ok(None);
        }
        if !self.counts.contains_key(&new) {
            return Err(self.unregistered(new));
        }
        Ok(Some(ScanJob::new(
            &self.rule,
            ScanEffect::Move { from: old, to: new },
        )))
    }

    /// Job that moves matches from `from` to the freshly split-off `to`
    ///
    /// # Errors
    ///
    /// Returns an error if either node is not tracked
    pub fn split(&self, from: NodeId, to: NodeId) -> TrackingResult<ScanJob> {
        for node in [from, to] {
            if !self.counts.contains_key(&node) {
                return Err(self.unregistered(node));
            }
        }
        Ok(ScanJob::new(&self.rule, ScanEffect::Move { from, to }))
    }

    /// Stop tracking `node`
    ///
    /// At or above the tracker level every tracked node under `node` loses
    /// its entry. Below the tracker level the tracked ancestor stays and a
    /// subtracting job over `node`'s units is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if a node is stale or an expected entry is missing
    pub fn unregister(&mut self, tree: &Hierarchy, node: NodeId) -> TrackingResult<Option<ScanJob>> {
        if tree.level(node)? >= self.level() {
            for tracked in tree.descendants_of_level(node, self.level())? {
                if self.counts.remove(&tracked).is_none() {
                    return Err(self.unregistered(tracked));
                }
            }
            return Ok(None);
        }

        let target = tree.ancestor_of_level(node, self.level())?;
        if !self.counts.contains_key(&target) {
            return Err(self.unregistered(target));
        }
        Ok(Some(ScanJob::new(&self.rule, ScanEffect::Subtract(target))))
    }

    /// Apply the delta accumulated by a job
    ///
    /// # Errors
    ///
    /// Returns an error if a target is no longer tracked or a count would underflow
    pub fn finish(&mut self, job: ScanJob) -> TrackingResult<()> {
        let matched = job.matched();
        match job.effect {
            ScanEffect::Add(node) => self.add(node, matched),
            ScanEffect::Subtract(node) => self.subtract(node, matched),
            ScanEffect::Move { from, to } => {
                self.subtract(from, matched)?;
                self.add(to, matched)
            }
        }
    }

    /// Current count of a node, if tracked
    #[must_use]
    pub fn count(&self, node: NodeId) -> Option<usize> {
        self.counts.get(&node).copied()
    }

    /// Every tracked node with its count, ordered by handle
    #[must_use]
    pub fn entries(&self) -> Vec<(NodeId, usize)> {
        let mut entries: Vec<_> = self.counts.iter().map(|(node, count)| (*node, *count)).collect();
        entries.sort_unstable();
        entries
    }

    /// Sum of all counts
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Number of tracked nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check if no node is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
