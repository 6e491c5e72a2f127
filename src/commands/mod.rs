pub mod config;
pub mod context;
pub mod groups;
pub mod notify;
pub mod run;
pub mod trackers;
pub mod tree;

use crate::BlockwatchContext;
use crate::lock::LockScheduler;
use crate::manager::{ServiceOptions, TrackingService};
use crate::output;
use crate::source::{SourceEvent, World};
use anyhow::{Context, Result};

/// What a replay did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Events applied to the world and the manager
    pub events: usize,
    /// Notification passes requested by the script
    pub notifications: usize,
    /// Messages delivered by those passes
    pub deliveries: usize,
}

/// Apply the world's scripted events in order
///
/// Each event is applied to the world first and then delivered to the
/// service, under a lock over the bodies it touches.
///
/// # Errors
///
/// Returns an error if an event does not fit the world or a handler fails
pub fn replay(
    world: &World,
    service: &TrackingService,
    locks: &LockScheduler,
) -> Result<ReplaySummary> {
    let script = world.script();
    let mut summary = ReplaySummary::default();
    if script.is_empty() {
        return Ok(summary);
    }

    let mut progress = output::start_progress("Replaying events", script.len());
    for (index, event) in script.iter().enumerate() {
        let _lock = locks.acquire(event.bodies());
        if *event == SourceEvent::Notify {
            let report = service.trigger_notification_now()?;
            summary.notifications += 1;
            summary.deliveries += report.deliveries;
        } else {
            world
                .apply(event)
                .with_context(|| format!("Event {} does not fit the world", index + 1))?;
            service.handle_event(event)?;
            summary.events += 1;
        }
        output::verbose(&format!("{:>4} {event:?}", index + 1));
        progress.tick();
    }
    progress.finish();
    Ok(summary)
}

/// Service options for a world command, or `None` when tracking is switched off
///
/// `force` overrides `core.enabled` for this invocation only.
fn world_options(ctx: &BlockwatchContext, force: bool) -> Option<ServiceOptions> {
    let mut options = ServiceOptions::from(&ctx.config);
    options.enabled |= force;
    if !options.enabled {
        output::warning(
            "Tracking is disabled (core.enabled = false); \
             enable it with `blockwatch config core.enabled true` or pass --force",
        );
        return None;
    }
    Some(options)
}
