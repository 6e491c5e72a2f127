use crate::BlockwatchContext;
use crate::commands::context::CommandContext;
use crate::lock::LockScheduler;
use crate::model::Level;
use crate::output;
use crate::sink::Outbox;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// Execute tree command: print the hierarchy built from a world
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

    let counts = Level::ALL
        .iter()
        .rev()
        .map(|level| Ok(format!("{level}: {}", service.count_nodes_of_level(*level)?)))
        .collect::<Result<Vec<_>>>()?;
    output::heading(&counts.join(", "));
    print!("{}", service.list_hierarchy()?);

    service.stop()?;
    Ok(())
}
