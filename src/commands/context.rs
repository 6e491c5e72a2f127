use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::BlockwatchContext;
use crate::manager::{ServiceOptions, TrackingManager, TrackingService};
use crate::output;
use crate::sink::MessageSink;
use crate::source::World;
use crate::utils::expand_tilde;

/// Trait providing common operations for command modules
pub trait CommandContext {
    /// Loads a world file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    fn load_world(&self, path: &Path) -> Result<Arc<World>>;

    /// Creates a service over `world` delivering to `sink`
    ///
    /// The service is started only when `options.enabled` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules cannot be installed or the timer cannot be spawned
    fn start_service(
        &self,
        world: &Arc<World>,
        sink: Arc<dyn MessageSink>,
        options: ServiceOptions,
    ) -> Result<TrackingService>;
}

impl CommandContext for BlockwatchContext {
    fn load_world(&self, path: &Path) -> Result<Arc<World>> {
        let path = expand_tilde(&path.to_string_lossy())?;
        let world = World::load(&path)
            .with_context(|| format!("Failed to load world: {}", path.display()))?;
        output::verbose(&format!(
            "Loaded {} with {} units",
            path.display(),
            world.unit_count()
        ));
        Ok(Arc::new(world))
    }

    fn start_service(
        &self,
        world: &Arc<World>,
        sink: Arc<dyn MessageSink>,
        options: ServiceOptions,
    ) -> Result<TrackingService> {
        let manager = TrackingManager::new(world.clone(), self.config.groups.clone());
        let service = TrackingService::new(manager, sink, options)?;
        service
            .set_enabled(options.enabled)
            .context("Failed to start tracking")?;
        if !options.enabled {
            output::verbose("Tracking is disabled, service left stopped");
        }
        service.with_manager(|manager| output::rule_warnings(manager.warnings()))?;
        Ok(service)
    }
}
