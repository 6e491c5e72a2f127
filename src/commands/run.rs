use crate::BlockwatchContext;
use crate::commands::context::CommandContext;
use crate::lock::LockScheduler;
use crate::output;
use crate::sink::ConsoleSink;
use crate::utils::format_duration;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Execute run command: start tracking, replay the world's script and notify
///
/// With `watch`, the service keeps running for that long after the replay
/// and notifications come from the timer instead of a final pass.
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
    period: Option<Duration>,
    watch: Option<Duration>,
    force: bool,
) -> Result<()> {
    let Some(mut options) = super::world_options(ctx, force) else {
        return Ok(());
    };

    let world = ctx.load_world(world_path)?;
    if let Some(period) = period {
        options.notification_period = (!period.is_zero()).then_some(period);
    }

    let service = ctx.start_service(&world, Arc::new(ConsoleSink::new()), options)?;
    let locks = LockScheduler::new();
    let summary = super::replay(&world, &service, &locks)?;
    output::action(
        "Replayed",
        &format!(
            "{} events, {} scripted notifications",
            summary.events, summary.notifications
        ),
    );

    if let Some(watch) = watch {
        match service.notification_period() {
            Some(period) => output::info(&format!(
                "Watching for {}, notifying every {}",
                format_duration(watch),
                format_duration(period)
            )),
            None => output::warning("Notification timer is disabled, nothing will be sent"),
        }
        std::thread::sleep(watch);
    } else {
        let report = service.trigger_notification_now()?;
        output::action(
            "Notified",
            &format!(
                "{} owners about {} nodes",
                report.deliveries,
                report.matches.len()
            ),
        );
    }

    locks.log_active_locks();
    service.stop()?;
    Ok(())
}
