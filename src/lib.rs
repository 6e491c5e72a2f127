#![warn(missing_docs)]
// Allow pedantic strict lints that create false positives in this codebase
#![allow(clippy::arithmetic_side_effects)] // Counters over live nodes cannot overflow
#![allow(clippy::float_arithmetic)] // Ownership percentages
#![allow(clippy::indexing_slicing)] // Tracker ranges are built from the same vector

//! # Blockwatch - Incremental Body Hierarchy Tracking
//!
//! Blockwatch keeps a live three-level hierarchy over a world of bodies that
//! are joined and separated by links, counts rule matches per node as the
//! world changes, and periodically messages the owners of nodes that break
//! the configured rules.
//!
//! ## Features
//!
//! - **Incremental hierarchy**: bodies group into constructs through soft links
//!   and constructs group into clusters through hard links; merges and splits
//!   are applied as links come and go
//! - **Rule trackers**: per-node match counts kept up to date across merges,
//!   splits and unit changes, with bulk scans on a Rayon pool
//! - **Grouped notifications**: each owner gets one message per pass listing
//!   every node that tripped a group
//! - **Resource locks**: advisory locks over body sets for multi-threaded hosts
//!
//! ## Architecture
//!
//! - [`model`]: identifiers, units, levels and link kinds
//! - [`hierarchy`]: arena of nodes with two-phase removal
//! - [`rules`]: rule compilation and unit predicates
//! - [`tracker`]: per-rule counters and parallel scan jobs
//! - [`manager`]: the tracking state machine, notification pass and service
//! - [`source`] / [`sink`]: where events come from and where messages go
//! - [`lock`]: resource-set lock scheduler
//! - [`config`]: configuration parsing and validation
//! - [`commands`]: CLI command implementations
//! - [`output`]: terminal output and progress display
//! - [`utils`]: thread pool and small helpers
//!
//! ## Example Usage
//!
//! ```no_run
//! use blockwatch::manager::TrackingManager;
//! use blockwatch::source::World;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let ctx = blockwatch::BlockwatchContext::new()?;
//! let world = Arc::new(World::load("world.toml".as_ref())?);
//!
//! let mut manager = TrackingManager::new(world, ctx.config.groups.clone());
//! manager.start()?;
//! println!("{}", manager.list_hierarchy());
//! # Ok(())
//! # }
//! ```

/// Command-line interface definitions (argument parsing structures).
pub mod cli;

/// Commands module containing all CLI command implementations.
pub mod commands;

/// Configuration parsing, validation, and management.
pub mod config;

/// Error type for hierarchy and tracker invariants.
pub mod error;

/// Node arena for the body / construct / cluster hierarchy.
pub mod hierarchy;

/// Advisory locks over sets of bodies.
pub mod lock;

/// Tracking manager, notification pass and threaded service.
pub mod manager;

/// Core identifiers and value types.
pub mod model;

/// Output formatting and progress display.
pub mod output;

/// Rule definitions and unit predicates.
pub mod rules;

/// Message sinks for notification deliveries.
pub mod sink;

/// Event sources and the in-memory world.
pub mod source;

/// Per-rule match counters.
pub mod tracker;

/// Utility functions and helpers.
pub mod utils;

pub use error::{TrackingError, TrackingResult};
pub use manager::{TrackingManager, TrackingService};
pub use model::{BodyId, Level, LinkKind, OwnerId, Unit};

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Current version of the blockwatch binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file path relative to home directory.
pub const DEFAULT_CONFIG_PATH: &str = ".config/blockwatch/config";

/// Environment variable overriding the configuration path.
pub const CONFIG_PATH_ENV: &str = "BLOCKWATCH_CONFIG_PATH";

/// Shared state for CLI commands: where the configuration lives and what it says.
#[derive(Debug, Clone)]
pub struct BlockwatchContext {
    /// Path to the configuration file.
    pub config_path: PathBuf,

    /// Loaded configuration settings.
    pub config: config::Config,
}

impl BlockwatchContext {
    /// Creates a context from the default configuration path.
    ///
    /// `BLOCKWATCH_CONFIG_PATH` overrides `~/.config/blockwatch/config`. A
    /// missing file is created with a sample group.
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined or if the configuration
    /// file cannot be read or created.
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        let config = config::Config::load(&config_path)?;

        let validator = config::validator::ConfigValidator::new();
        if let Err(e) = validator.validate_config_file(&config_path) {
            output::warning(&format!("Warning: Configuration validation failed: {e}"));
        }

        if let Err(e) = utils::thread_pool::configure_from_config(&config) {
            output::warning(&format!("Warning: Failed to configure thread pool: {e}"));
        }

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Creates a context from an explicit configuration path.
    ///
    /// Skips validation and thread pool setup, which suits tests.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be loaded or created.
    pub fn new_explicit(config_path: PathBuf) -> Result<Self> {
        let config = config::Config::load(&config_path)?;
        Ok(Self {
            config_path,
            config,
        })
    }

    /// Resolves the configuration path, honouring the environment override.
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined.
    pub fn default_config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(DEFAULT_CONFIG_PATH))
    }
}
