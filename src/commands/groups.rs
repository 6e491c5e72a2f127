use crate::BlockwatchContext;
use crate::config::{Gate, GroupConfig};
use crate::output;
use crate::rules::{MatchMode, MessageMode};
use colored::Colorize;

/// Execute groups command: list every configured tracking group
pub fn execute(ctx: &BlockwatchContext) {
    if ctx.config.groups.is_empty() {
        output::info("No tracking groups configured");
        return;
    }

    for group in &ctx.config.groups {
        println!(
            "{} {} {}",
            group.name.bold(),
            format!("[{}]", group.level).dimmed(),
            format!("{} rules", group.rules.len()).dimmed()
        );
    }
}

/// Execute rules command: describe one group and its rules
///
/// A name that matches no group gets a plain response, not an error.
pub fn execute_rules(ctx: &BlockwatchContext, name: &str) {
    let Some(group) = ctx.config.group(name) else {
        println!("No group found with name '{name}'");
        return;
    };
    print!("{}", describe_group(group));
}

fn describe_gate(label: &str, gate: &Gate) -> String {
    format!(
        "  {label}: {} {}\n",
        gate.comparison.symbol(),
        gate.threshold
    )
}

/// Human readable description of a group
#[must_use]
pub fn describe_group(group: &GroupConfig) -> String {
    let mut out = format!("{} ({})\n", group.name, group.level);

    let matching = match group.match_mode {
        MatchMode::All => "all rules",
        MatchMode::Any => "any rule",
    };
    out.push_str(&format!("  matches when {matching} hold\n"));
    out.push_str(&match group.message_mode {
        MessageMode::Majority => "  messages the majority owner\n".to_string(),
        MessageMode::Percentage => format!(
            "  messages owners above {}% of units\n",
            group.percent_owned
        ),
    });
    out.push_str(&describe_gate("leaf count", &group.leaf_count));
    out.push_str(&describe_gate("unit count", &group.unit_count));

    if group.rules.is_empty() {
        out.push_str("  no rules\n");
    }
    for (index, rule) in group.rules.iter().enumerate() {
        let name = rule
            .name
            .clone()
            .unwrap_or_else(|| format!("#{index}"));
        out.push_str(&format!(
            "  - {name}: {} {} {}\n",
            rule.matches,
            rule.comparison.symbol(),
            rule.threshold
        ));
    }
    out
}
