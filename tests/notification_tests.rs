mod common;

use blockwatch::config::{Gate, GroupConfig, RuleConfig};
use blockwatch::rules::{Comparison, MatchMode, MessageMode};
use blockwatch::sink::Outbox;
use blockwatch::source::World;
use blockwatch::{BodyId, Level, LinkKind, OwnerId, Unit};
use common::{Fixture, armor, refinery, refinery_group};

fn owners(hit: &blockwatch::manager::GroupMatch) -> Vec<u64> {
    hit.recipients.iter().map(|owner| owner.0).collect()
}

#[test]
fn test_all_mode_triggers_only_above_threshold() {
    let mut fx = Fixture::two_bodies(vec![refinery_group(Level::Construct, 1)]);
    let outbox = Outbox::new();

    let report = fx.manager.notify(&outbox).unwrap();
    assert_eq!(report.evaluated, 2);
    // A holds 2 refineries, B only 1
    let hits: Vec<_> = report.matches_of("Industry").collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "A");
    assert_eq!(owners(hits[0]), vec![1]);

    let delivered = outbox.take_delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].recipient, OwnerId(1));
    assert_eq!(
        delivered[0].body,
        "This message will be followed by a list of grids. Violating grids:\n - A"
    );
    assert_eq!(outbox.flush_count(), 1);
}

#[test]
fn test_unit_gate_excludes_small_nodes() {
    let mut group = refinery_group(Level::Construct, 1);
    group.unit_count = Gate {
        comparison: Comparison::Greater,
        threshold: 3,
    };
    let mut fx = Fixture::two_bodies(vec![group]);
    let outbox = Outbox::new();
    assert!(fx.manager.notify(&outbox).unwrap().matches.is_empty());

    fx.link(1, 2, LinkKind::Soft);
    let report = fx.manager.notify(&outbox).unwrap();
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches[0].name, "A (+1 more)");
}

#[test]
fn test_leaf_gate_counts_bodies() {
    let mut group = refinery_group(Level::Cluster, 0);
    group.leaf_count = Gate {
        comparison: Comparison::Equal,
        threshold: 2,
    };
    let mut fx = Fixture::two_bodies(vec![group]);
    let outbox = Outbox::new();
    assert!(fx.manager.notify(&outbox).unwrap().matches.is_empty());

    fx.link(1, 2, LinkKind::Hard);
    assert_eq!(fx.manager.notify(&outbox).unwrap().matches.len(), 1);
}

#[test]
fn test_any_mode_and_empty_rule_list() {
    let any = GroupConfig {
        name: "Either".to_string(),
        match_mode: MatchMode::Any,
        rules: vec![
            RuleConfig {
                name: None,
                matches: "Refinery".to_string(),
                comparison: Comparison::Greater,
                threshold: 5,
            },
            RuleConfig {
                name: None,
                matches: "Armor".to_string(),
                comparison: Comparison::Equal,
                threshold: 1,
            },
        ],
        ..GroupConfig::default()
    };
    let everything = GroupConfig {
        name: "Everything".to_string(),
        level: Level::Body,
        ..GroupConfig::default()
    };
    let mut fx = Fixture::two_bodies(vec![any, everything]);
    let report = fx.manager.notify(&Outbox::new()).unwrap();

    assert_eq!(report.matches_of("Either").count(), 2);
    assert_eq!(report.matches_of("Everything").count(), 2);
}

#[test]
fn test_majority_notifies_every_tied_owner() {
    let world = World::new();
    world.add_body(
        BodyId(1),
        Some("Shared".to_string()),
        vec![refinery(1), refinery(2), refinery(1), refinery(2), armor(3)],
    );
    let mut fx = Fixture::start(world, vec![refinery_group(Level::Construct, 1)]);
    let outbox = Outbox::new();

    let report = fx.manager.notify(&outbox).unwrap();
    assert_eq!(owners(&report.matches[0]), vec![1, 2]);
    let recipients: Vec<_> = outbox.delivered().iter().map(|d| d.recipient).collect();
    assert_eq!(recipients, vec![OwnerId(1), OwnerId(2)]);
}

#[test]
fn test_percentage_notifies_owners_strictly_above_share() {
    let mut group = refinery_group(Level::Construct, 0);
    group.message_mode = MessageMode::Percentage;
    group.percent_owned = 25.0;

    let world = World::new();
    // Owner 1: 6 units, owner 2: exactly a quarter, plus unowned units that do not count
    let mut units = vec![refinery(1); 6];
    units.extend(vec![refinery(2); 2]);
    units.push(Unit::new("Armor", "LightBlock", None));
    world.add_body(BodyId(1), None, units);
    let mut fx = Fixture::start(world, vec![group.clone()]);

    let report = fx.manager.notify(&Outbox::new()).unwrap();
    assert_eq!(owners(&report.matches[0]), vec![1]);

    group.percent_owned = 20.0;
    fx.manager.reload_rules(vec![group]).unwrap();
    let report = fx.manager.notify(&Outbox::new()).unwrap();
    assert_eq!(owners(&report.matches[0]), vec![1, 2]);
}

#[test]
fn test_one_message_per_owner_across_groups() {
    let mut second = refinery_group(Level::Cluster, 0);
    second.name = "Fleet".to_string();
    second.message = "Fleets:".to_string();
    let mut first = refinery_group(Level::Construct, 0);
    first.message = "Constructs:".to_string();

    let world = World::new();
    world.add_body(BodyId(1), Some("One".to_string()), vec![refinery(7)]);
    world.add_body(BodyId(2), Some("Two".to_string()), vec![refinery(7)]);
    let mut fx = Fixture::start(world, vec![first, second]);
    let outbox = Outbox::new();

    let report = fx.manager.notify(&outbox).unwrap();
    assert_eq!(report.matches.len(), 4);
    assert_eq!(report.deliveries, 1);

    let delivered = outbox.take_delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(
        delivered[0].body,
        "Constructs:\n - One\n - Two\n\nFleets:\n - One\n - Two"
    );
}

#[test]
fn test_notify_promotes_pending_bodies_first() {
    let mut fx = Fixture::two_bodies(vec![refinery_group(Level::Construct, 1)]);
    fx.create(3, vec![refinery(4), refinery(4)]);

    let report = fx.manager.notify(&Outbox::new()).unwrap();
    assert!(fx.manager.pending_bodies().is_empty());
    assert_eq!(report.evaluated, 3);
    assert_eq!(report.matches.len(), 2);
}

#[test]
fn test_notify_requires_running_manager() {
    let mut fx = Fixture::two_bodies(vec![refinery_group(Level::Construct, 1)]);
    fx.manager.stop();
    let outbox = Outbox::new();
    assert!(fx.manager.notify(&outbox).is_err());
    assert_eq!(outbox.flush_count(), 0);
}
