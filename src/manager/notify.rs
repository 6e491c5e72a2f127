//! Notification pass: evaluate every group against the live counts and message owners.

use super::TrackingManager;
use crate::config::GroupConfig;
use crate::error::{TrackingError, TrackingResult};
use crate::hierarchy::NodeId;
use crate::model::{Level, OwnerId, Unit};
use crate::rules::{MatchMode, MessageMode};
use crate::sink::MessageSink;
use crate::tracker::RuleTracker;
use crate::utils::thread_pool::{IntoParallelRefIterator, ParallelIterator, run_in_pool};
use chrono::{DateTime, Local};
use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::{debug, info, info_span};

/// A node that satisfied a group during a notification pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMatch {
    pub group: String,
    pub node: NodeId,
    /// Display name used in the message
    pub name: String,
    /// Owners selected for the message
    pub recipients: Vec<OwnerId>,
}

/// Outcome of one notification pass
#[derive(Debug, Clone)]
pub struct NotificationReport {
    pub started_at: DateTime<Local>,
    /// Nodes checked across all groups
    pub evaluated: usize,
    pub matches: Vec<GroupMatch>,
    /// Messages handed to the sink
    pub deliveries: usize,
}

impl NotificationReport {
    fn new() -> Self {
        Self {
            started_at: Local::now(),
            evaluated: 0,
            matches: Vec::new(),
            deliveries: 0,
        }
    }

    /// Matches of one group
    pub fn matches_of<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a GroupMatch> + 'a {
        self.matches.iter().filter(move |m| m.group == group)
    }
}

/// Units per owner; unowned units are not counted
fn owner_shares(units: &[&Unit]) -> BTreeMap<OwnerId, usize> {
    let shares: DashMap<OwnerId, usize> = DashMap::new();
    run_in_pool(|| {
        units.par_iter().filter_map(|unit| unit.owner).for_each(|owner| {
            *shares.entry(owner).or_insert(0) += 1;
        });
    });
    shares.into_iter().collect()
}

/// Owners that should hear about a matching node
#[allow(clippy::cast_precision_loss)]
fn select_recipients(group: &GroupConfig, shares: &BTreeMap<OwnerId, usize>) -> Vec<OwnerId> {
    match group.message_mode {
        MessageMode::Majority => {
            let Some(max) = shares.values().max().copied() else {
                return Vec::new();
            };
            shares
                .iter()
                .filter(|(_, owned)| **owned == max)
                .map(|(owner, _)| *owner)
                .collect()
        }
        MessageMode::Percentage => {
            let total: usize = shares.values().sum();
            if total == 0 {
                return Vec::new();
            }
            let fraction = group.percent_owned / 100.0;
            shares
                .iter()
                .filter(|(_, owned)| **owned as f64 / total as f64 > fraction)
                .map(|(owner, _)| *owner)
                .collect()
        }
    }
}

/// Group template followed by one line per matching node
fn format_section(template: &str, names: &[String]) -> String {
    let mut section = template.to_string();
    for name in names {
        section.push_str("\n - ");
        section.push_str(name);
    }
    section
}

impl TrackingManager {
    /// Run a notification pass and deliver the resulting messages
    ///
    /// Pending bodies are promoted first. Each owner receives at most one
    /// message per pass, holding one section per group that selected them.
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::NotRunning`] when stopped, or an invariant error
    pub fn notify(&mut self, sink: &dyn MessageSink) -> TrackingResult<NotificationReport> {
        if !self.is_running() {
            return Err(TrackingError::NotRunning);
        }
        let _span = info_span!("notify").entered();
        self.finalize_pending()?;

        let mut report = NotificationReport::new();
        let mut outgoing: BTreeMap<OwnerId, Vec<String>> = BTreeMap::new();

        for (index, group) in self.groups.iter().enumerate() {
            let range = self.group_trackers.get(index).cloned().unwrap_or(0..0);
            let trackers = &self.trackers[range];
            let mut batches: BTreeMap<OwnerId, Vec<String>> = BTreeMap::new();

            for node in self.tree.nodes_of_level(group.level) {
                report.evaluated += 1;
                let Some(hit) = self.evaluate(group, trackers, node)? else {
                    continue;
                };
                for owner in &hit.recipients {
                    batches.entry(*owner).or_default().push(hit.name.clone());
                }
                report.matches.push(hit);
            }

            for (owner, names) in batches {
                outgoing
                    .entry(owner)
                    .or_default()
                    .push(format_section(&group.message, &names));
            }
        }

        for (owner, sections) in outgoing {
            sink.enqueue(owner, sections.join("\n\n"));
            report.deliveries += 1;
        }
        sink.flush();

        info!(
            evaluated = report.evaluated,
            matches = report.matches.len(),
            deliveries = report.deliveries,
            "Notification pass finished"
        );
        Ok(report)
    }

    /// Check one node against a group
    fn evaluate(
        &self,
        group: &GroupConfig,
        trackers: &[RuleTracker],
        node: NodeId,
    ) -> TrackingResult<Option<GroupMatch>> {
        let record = self.tree.get(node)?;
        if group.level != Level::Body && !group.leaf_count.admits(record.leaf_count()) {
            return Ok(None);
        }

        let units = self.tree.units_under(node)?;
        if !group.unit_count.admits(units.len()) {
            return Ok(None);
        }

        let mut matched = group.match_mode == MatchMode::All || trackers.is_empty();
        for tracker in trackers {
            let count = tracker
                .count(node)
                .ok_or_else(|| TrackingError::UnregisteredNode {
                    tracker: tracker.key().to_string(),
                    node: node.to_string(),
                })?;
            let met = tracker.rule().is_met(count);
            match group.match_mode {
                MatchMode::All if !met => {
                    matched = false;
                    break;
                }
                MatchMode::Any if met => {
                    matched = true;
                    break;
                }
                _ => {}
            }
        }
        if !matched {
            return Ok(None);
        }

        let shares = owner_shares(&units);
        let recipients = select_recipients(group, &shares);
        let name = self.display_name(node)?;
        debug!(group = %group.name, %node, %name, recipients = recipients.len(), "Group matched");

        Ok(Some(GroupMatch {
            group: group.name.clone(),
            node,
            name,
            recipients,
        }))
    }
}
