//! Command-line interface definitions for blockwatch.
//!
//! Shared between the main binary and xtask, which renders man pages from
//! the same definitions.

#![allow(missing_docs)]

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    crate::utils::parse_duration(value).map_err(|e| e.to_string())
}

/// Main CLI structure for blockwatch.
#[derive(Parser)]
#[command(
    name = "blockwatch",
    version = crate::VERSION,
    about = "Track body hierarchies against rules and notify owners",
    long_about = "Keeps a live body / construct / cluster hierarchy over a world, counts rule \
                  matches per node and messages the owners of nodes that break tracking groups"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Show verbose output and debug logs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress informational messages
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// All available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Start tracking a world, replay its events and send notifications
    Run {
        /// World file (TOML)
        world: PathBuf,

        /// Notification period, e.g. `10m` or `90s`; 0 disables the timer
        #[arg(long, value_parser = parse_duration_arg)]
        period: Option<Duration>,

        /// Keep running this long after the replay and let the timer notify
        #[arg(long, value_parser = parse_duration_arg)]
        watch: Option<Duration>,

        /// Track even when `core.enabled` is false
        #[arg(long)]
        force: bool,
    },

    /// Run one notification pass and show the matches and messages
    Notify {
        /// World file (TOML)
        world: PathBuf,

        /// Replay the scripted events first
        #[arg(short, long)]
        replay: bool,

        /// Track even when `core.enabled` is false
        #[arg(long)]
        force: bool,
    },

    /// Show the body / construct / cluster hierarchy of a world
    Tree {
        /// World file (TOML)
        world: PathBuf,

        /// Replay the scripted events first
        #[arg(short, long)]
        replay: bool,

        /// Track even when `core.enabled` is false
        #[arg(long)]
        force: bool,
    },

    /// Show rule trackers and their per-node counts
    Trackers {
        /// World file (TOML)
        world: PathBuf,

        /// Replay the scripted events first
        #[arg(short, long)]
        replay: bool,

        /// Track even when `core.enabled` is false
        #[arg(long)]
        force: bool,
    },

    /// List configured tracking groups
    Groups,

    /// Describe the rules of one tracking group
    Rules {
        /// Group name
        group: String,
    },

    /// Get and set configuration options
    Config {
        /// Configuration key (e.g. core.notification_period_secs)
        key: Option<String>,

        /// Value to set
        value: Option<String>,

        /// Reset the key to its default
        #[arg(long)]
        unset: bool,

        /// List all configuration
        #[arg(short, long)]
        list: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
