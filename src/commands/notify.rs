use crate::BlockwatchContext;
use crate::commands::context::CommandContext;
use crate::lock::LockScheduler;
use crate::manager::NotificationReport;
use crate::output;
use crate::sink::{Delivery, Outbox};
use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

/// Execute notify command: run one notification pass and show who would hear what
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
    let outbox = Arc::new(Outbox::new());
    let service = ctx.start_service(&world, outbox.clone(), options)?;

    if replay {
        super::replay(&world, &service, &LockScheduler::new())?;
        outbox.take_delivered();
    }

    let report = service.trigger_notification_now()?;
    print_report(&report, &outbox.take_delivered());
    service.stop()?;
    Ok(())
}

fn print_report(report: &NotificationReport, deliveries: &[Delivery]) {
    if report.matches.is_empty() {
        output::info(&format!(
            "No group matched ({} nodes checked)",
            report.evaluated
        ));
        return;
    }

    output::heading("Matches");
    for hit in &report.matches {
        let owners: Vec<String> = hit.recipients.iter().map(ToString::to_string).collect();
        let owners = if owners.is_empty() {
            "nobody".dimmed().to_string()
        } else {
            format!("owners {}", owners.join(", "))
        };
        println!("  {} {} -> {owners}", hit.group.cyan(), hit.name);
    }

    println!();
    output::heading("Messages");
    for delivery in deliveries {
        println!("{} {}", "to owner".dimmed(), delivery.recipient.to_string().bold());
        for line in delivery.body.lines() {
            println!("  {line}");
        }
    }
}
