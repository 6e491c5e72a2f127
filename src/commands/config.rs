use crate::BlockwatchContext;
use crate::output;
use anyhow::Result;
use colored::Colorize;

/// Execute config command to get/set configuration values
///
/// # Errors
///
/// Returns an error if:
/// - Failed to set or unset configuration value
/// - Failed to save configuration
pub fn execute(
    ctx: &mut BlockwatchContext,
    key: Option<&str>,
    value: Option<&str>,
    unset: bool,
    list: bool,
) -> Result<()> {
    let Some(key) = key.filter(|_| !list) else {
        show_all_config(ctx);
        return Ok(());
    };

    if unset {
        ctx.config.unset(key)?;
        ctx.config.save(&ctx.config_path)?;
        output::success(&format!("Unset {key}"));
    } else if let Some(value) = value {
        ctx.config.set(key, value)?;
        ctx.config.save(&ctx.config_path)?;
        let stored = ctx.config.get(key).unwrap_or_else(|| value.to_string());
        output::success(&format!("Set {key} = {stored}"));
    } else if let Some(value) = ctx.config.get(key) {
        println!("{value}");
    } else {
        output::warning(&format!("Configuration key '{key}' is not set"));
    }

    Ok(())
}

/// Show all configuration values
fn show_all_config(ctx: &BlockwatchContext) {
    let mut section = "";
    for (key, value) in ctx.config.entries() {
        let (head, field) = key.split_once('.').unwrap_or(("", key));
        if head != section {
            if !section.is_empty() {
                println!();
            }
            println!("{}", format!("[{head}]").bold());
            section = head;
        }
        println!("  {field} = {value}");
    }

    if !ctx.config.groups.is_empty() {
        println!("\n{}", "[groups]".bold());
        for group in &ctx.config.groups {
            println!("  {} ({} rules)", group.name, group.rules.len());
        }
    }
}
