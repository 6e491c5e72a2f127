use blockwatch::config::{GroupConfig, RuleConfig};
use blockwatch::manager::TrackingManager;
use blockwatch::rules::Comparison;
use blockwatch::sink::Outbox;
use blockwatch::source::World;
use blockwatch::{BodyId, Level, LinkKind, Unit};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

fn groups() -> Vec<GroupConfig> {
    [Level::Construct, Level::Cluster]
        .into_iter()
        .map(|level| GroupConfig {
            name: format!("{level}"),
            level,
            rules: vec![RuleConfig {
                name: Some("refineries".to_string()),
                matches: "Refinery/*".to_string(),
                comparison: Comparison::Greater,
                threshold: 2,
            }],
            ..GroupConfig::default()
        })
        .collect()
}

/// World of `count` bodies with a few units each, soft-linked in pairs
fn create_world(count: u64) -> Arc<World> {
    let world = World::new();
    for id in 0..count {
        let owner = Some(id % 7);
        let units = vec![
            Unit::new("Refinery", "LargeRefinery", owner),
            Unit::new("Refinery", "SmallRefinery", owner),
            Unit::new("Armor", "LightBlock", owner),
            Unit::new("Armor", "HeavyBlock", None),
        ];
        world.add_body(BodyId(id), None, units);
    }
    for id in (0..count.saturating_sub(1)).step_by(2) {
        let _ = world.link(BodyId(id), BodyId(id + 1), LinkKind::Soft);
    }
    Arc::new(world)
}

fn benchmark_start(c: &mut Criterion) {
    let mut group = c.benchmark_group("start");

    for count in &[100u64, 1_000, 5_000] {
        let world = create_world(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &world, |b, world| {
            b.iter(|| {
                let mut manager = TrackingManager::new(world.clone(), groups());
                manager.start().unwrap();
                black_box(manager.count_nodes_of_level(Level::Construct))
            });
        });
    }

    group.finish();
}

fn benchmark_link_churn(c: &mut Criterion) {
    let world = create_world(1_000);
    let mut manager = TrackingManager::new(world.clone(), groups());
    manager.start().unwrap();

    let mut group = c.benchmark_group("link_churn");

    for kind in [LinkKind::Soft, LinkKind::Hard] {
        group.bench_function(format!("{kind:?}"), |b| {
            b.iter(|| {
                // Join two pairs, then split them again
                let (a, b) = (BodyId(10), BodyId(12));
                world.link(a, b, kind).unwrap();
                manager.linked(a, b, kind).unwrap();
                world.unlink(a, b, kind).unwrap();
                manager.unlinked(a, b, kind).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_notify(c: &mut Criterion) {
    let world = create_world(2_000);
    let mut manager = TrackingManager::new(world, groups());
    manager.start().unwrap();
    let outbox = Outbox::new();

    c.bench_function("notify_2000_bodies", |b| {
        b.iter(|| {
            let report = manager.notify(&outbox).unwrap();
            outbox.take_delivered();
            black_box(report)
        });
    });
}

criterion_group!(
    benches,
    benchmark_start,
    benchmark_link_churn,
    benchmark_notify
);
criterion_main!(benches);
