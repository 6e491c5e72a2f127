use crate::BlockwatchContext;
use crate::commands::context::CommandContext;
use crate::lock::LockScheduler;
use crate::output;
use crate::sink::Outbox;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// Execute trackers command: print every rule tracker with its per-node counts
///
/// # Errors
///
/// Returns an error if:
/// - The world file cannot be loaded
/// - Tracking fails to start
/// - A scripted event cannot be applied
pub fn execute(
    ctx: &BlockwatchContext,
    world_path: &Path,
    replay: bool,
    force: bool,
) -> Result<()> {
    let Some(mut options) = super::world_options(ctx, force) else {
        return Ok(());
    };
    options.notification_period = None;

    let world = ctx.load_world(world_path)?;
    let service = ctx.start_service(&world, Arc::new(Outbox::new()), options)?;
    if replay {
        super::replay(&world, &service, &LockScheduler::new())?;
    }

    let listing = service.list_trackers()?;
    if listing.is_empty() {
        output::info("No rules configured");
    } else {
        print!("{listing}");
    }

    service.stop()?;
    Ok(())
}
