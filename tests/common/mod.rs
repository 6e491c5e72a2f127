#![allow(dead_code)]

use blockwatch::config::{GroupConfig, RuleConfig};
use blockwatch::manager::TrackingManager;
use blockwatch::rules::Comparison;
use blockwatch::source::World;
use blockwatch::{BodyId, Level, LinkKind, Unit};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Key of the tracker built by [`refinery_group`]
pub const REFINERY_KEY: &str = "Industry/refineries";

pub fn refinery(owner: u64) -> Unit {
    Unit::new("Refinery", "LargeRefinery", Some(owner))
}

pub fn armor(owner: u64) -> Unit {
    Unit::new("Armor", "LightBlock", Some(owner))
}

/// One group at `level` with a single rule counting refineries against `threshold`
pub fn refinery_group(level: Level, threshold: usize) -> GroupConfig {
    GroupConfig {
        name: "Industry".to_string(),
        level,
        rules: vec![RuleConfig {
            name: Some("refineries".to_string()),
            matches: "Refinery".to_string(),
            comparison: Comparison::Greater,
            threshold,
        }],
        ..GroupConfig::default()
    }
}

/// World and running manager kept in step by [`Fixture`] helpers
pub struct Fixture {
    pub world: Arc<World>,
    pub manager: TrackingManager,
}

impl Fixture {
    /// Body A: 3 units, 2 refineries (owner 1). Body B: 2 units, 1 refinery (owner 2).
    pub fn two_bodies(groups: Vec<GroupConfig>) -> Self {
        let world = World::new();
        world.add_body(
            BodyId(1),
            Some("A".to_string()),
            vec![refinery(1), refinery(1), armor(1)],
        );
        world.add_body(BodyId(2), Some("B".to_string()), vec![refinery(2), armor(2)]);
        Self::start(world, groups)
    }

    pub fn start(world: World, groups: Vec<GroupConfig>) -> Self {
        let world = Arc::new(world);
        let mut manager = TrackingManager::new(world.clone(), groups);
        manager.start().expect("manager should start");
        Self { world, manager }
    }

    pub fn link(&mut self, a: u64, b: u64, kind: LinkKind) {
        self.world.link(BodyId(a), BodyId(b), kind).unwrap();
        self.manager.linked(BodyId(a), BodyId(b), kind).unwrap();
    }

    pub fn unlink(&mut self, a: u64, b: u64, kind: LinkKind) {
        self.world.unlink(BodyId(a), BodyId(b), kind).unwrap();
        self.manager.unlinked(BodyId(a), BodyId(b), kind).unwrap();
    }

    pub fn create(&mut self, body: u64, units: Vec<Unit>) {
        self.world.add_body(BodyId(body), None, units);
        self.manager.body_created(BodyId(body)).unwrap();
    }

    pub fn destroy(&mut self, body: u64) {
        self.world.remove_body(BodyId(body)).unwrap();
        self.manager.body_destroyed(BodyId(body)).unwrap();
    }

    /// Count of `key` at the ancestor of `body` the tracker works on
    pub fn count(&self, key: &str, body: u64) -> usize {
        let tracker = self.manager.tracker(key).expect("tracker exists");
        let node = self
            .manager
            .ancestor_of_body(BodyId(body), tracker.level())
            .expect("body is attached");
        tracker.count(node).expect("node is registered")
    }

    /// Sum of all counts of `key`
    pub fn total(&self, key: &str) -> usize {
        self.manager.tracker(key).expect("tracker exists").total()
    }

    /// Partition of bodies per level, independent of node handles
    pub fn shape(&self) -> BTreeSet<(Level, Vec<BodyId>)> {
        let tree = self.manager.tree();
        Level::ALL
            .iter()
            .flat_map(|level| {
                tree.nodes_of_level(*level).into_iter().map(move |node| {
                    let mut bodies = tree.bodies_under(node).unwrap();
                    bodies.sort();
                    (*level, bodies)
                })
            })
            .collect()
    }
}
