mod common;

use blockwatch::commands::replay;
use blockwatch::lock::LockScheduler;
use blockwatch::manager::{ServiceOptions, TrackingManager, TrackingService};
use blockwatch::sink::Outbox;
use blockwatch::source::World;
use blockwatch::{BodyId, Level};
use common::{REFINERY_KEY, refinery_group};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn demo_world() -> World {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/world.toml");
    World::load(&path).unwrap()
}

#[test]
fn test_demo_world_loads() {
    let world = demo_world();
    assert!(world.contains(BodyId(1)));
    assert!(!world.contains(BodyId(4)));
    assert_eq!(world.unit_count(), 6);
    assert_eq!(world.script().len(), 7);
}

#[test]
fn test_demo_world_replays_cleanly() {
    let world = Arc::new(demo_world());
    let outbox = Arc::new(Outbox::new());
    let manager = TrackingManager::new(world.clone(), vec![refinery_group(Level::Construct, 0)]);
    let service = TrackingService::new(
        manager,
        outbox.clone(),
        ServiceOptions {
            enabled: true,
            notification_period: None,
            initial_delay: Duration::ZERO,
        },
    )
    .unwrap();
    service.start().unwrap();

    let summary = replay(&world, &service, &LockScheduler::new()).unwrap();
    assert_eq!(summary.events, 5);
    assert_eq!(summary.notifications, 2);
    assert!(summary.deliveries > 0);
    assert_eq!(outbox.delivered().len(), summary.deliveries);

    // The drone is still pending until the next pass picks it up
    service
        .with_manager(|manager| {
            assert_eq!(manager.pending_bodies(), vec![BodyId(4)]);
            manager.finalize_pending().unwrap();
            assert_eq!(manager.tracker(REFINERY_KEY).unwrap().total(), 4);
            manager.validate()
        })
        .unwrap()
        .unwrap();
    assert!(!world.contains(BodyId(3)));
}
