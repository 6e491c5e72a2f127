//! Thread-safe front end of the tracking manager with a periodic notification timer.

use super::{NotificationReport, TrackingManager};
use crate::config::{Config, GroupConfig};
use crate::model::{BodyId, Level, LinkKind, Unit};
use crate::sink::MessageSink;
use crate::source::SourceEvent;
use anyhow::{Context, Result};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Timer settings of a [`TrackingService`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Whether tracking should run at all
    pub enabled: bool,
    /// Time between notification passes; `None` disables the timer
    pub notification_period: Option<Duration>,
    /// Time between start and the first pass
    pub initial_delay: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ServiceOptions {
    fn from(config: &Config) -> Self {
        let period = config.core.notification_period_secs;
        Self {
            enabled: config.core.enabled,
            notification_period: (period > 0).then(|| Duration::from_secs(period)),
            initial_delay: Duration::from_secs(config.core.initial_delay_secs),
        }
    }
}

enum TimerCommand {
    Arm { first: Duration, period: Duration },
    Disarm,
    Shutdown,
}

/// Owns a [`TrackingManager`] and serializes access to it
///
/// Event handlers, commands and timer ticks all take the same lock, so the
/// manager only ever sees one caller at a time.
pub struct TrackingService {
    manager: Arc<Mutex<TrackingManager>>,
    sink: Arc<dyn MessageSink>,
    options: Mutex<ServiceOptions>,
    timer: Sender<TimerCommand>,
    timer_thread: Option<JoinHandle<()>>,
}

impl TrackingService {
    /// Wrap a manager and spawn its (disarmed) timer thread
    ///
    /// # Errors
    ///
    /// Returns an error if the timer thread cannot be spawned
    pub fn new(
        manager: TrackingManager,
        sink: Arc<dyn MessageSink>,
        options: ServiceOptions,
    ) -> Result<Self> {
        let manager = Arc::new(Mutex::new(manager));
        let (timer, commands) = mpsc::channel();

        let weak = Arc::downgrade(&manager);
        let timer_sink = Arc::clone(&sink);
        let timer_thread = std::thread::Builder::new()
            .name("blockwatch-timer".to_string())
            .spawn(move || timer_loop(&weak, timer_sink.as_ref(), &commands))
            .context("Failed to spawn notification timer")?;

        Ok(Self {
            manager,
            sink,
            options: Mutex::new(options),
            timer,
            timer_thread: Some(timer_thread),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, TrackingManager>> {
        self.manager
            .lock()
            .map_err(|_| anyhow::anyhow!("Tracking manager lock poisoned"))
    }

    fn current_options(&self) -> ServiceOptions {
        *self
            .options
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn send(&self, command: TimerCommand) {
        if self.timer.send(command).is_err() {
            error!("Notification timer is gone");
        }
    }

    /// Run `f` with exclusive access to the manager
    ///
    /// # Errors
    ///
    /// Returns an error if the manager lock is poisoned
    pub fn with_manager<R>(&self, f: impl FnOnce(&mut TrackingManager) -> R) -> Result<R> {
        let mut manager = self.lock()?;
        Ok(f(&mut manager))
    }

    /// Start tracking and arm the timer
    ///
    /// # Errors
    ///
    /// Returns an error if the manager fails to start
    pub fn start(&self) -> Result<()> {
        self.lock()?.start()?;
        let options = self.current_options();
        if let Some(period) = options.notification_period {
            self.send(TimerCommand::Arm {
                first: options.initial_delay,
                period,
            });
        }
        Ok(())
    }

    /// Disarm the timer and stop tracking
    ///
    /// # Errors
    ///
    /// Returns an error if the manager lock is poisoned
    pub fn stop(&self) -> Result<()> {
        self.send(TimerCommand::Disarm);
        self.lock()?.stop();
        Ok(())
    }

    /// Turn tracking on or off, starting or stopping the manager to match
    ///
    /// Disabling an idle service and enabling a running one are no-ops.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager fails to start
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        let was_enabled = {
            let mut options = self
                .options
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            std::mem::replace(&mut options.enabled, enabled)
        };
        let running = self.lock()?.is_running();
        match (enabled, running) {
            (true, false) => self.start()?,
            (false, true) => self.stop()?,
            _ => {}
        }
        if was_enabled != enabled {
            info!(enabled, "Tracking toggled");
        }
        Ok(())
    }

    /// Whether tracking is switched on
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.current_options().enabled
    }

    /// Replace the tracking groups
    ///
    /// # Errors
    ///
    /// Returns an error if the new rules cannot be installed
    pub fn reload_rules(&self, groups: Vec<GroupConfig>) -> Result<()> {
        self.lock()?.reload_rules(groups)?;
        Ok(())
    }

    /// Change the notification period; 0 disables the timer
    ///
    /// Takes effect immediately: the next pass is one full period away.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager lock is poisoned
    pub fn set_notification_period(&self, secs: u64) -> Result<()> {
        let period = (secs > 0).then(|| Duration::from_secs(secs));
        self.options
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .notification_period = period;

        if !self.lock()?.is_running() {
            return Ok(());
        }
        match period {
            Some(period) => self.send(TimerCommand::Arm {
                first: period,
                period,
            }),
            None => self.send(TimerCommand::Disarm),
        }
        info!(secs, "Notification period changed");
        Ok(())
    }

    /// Current notification period, `None` when disabled
    #[must_use]
    pub fn notification_period(&self) -> Option<Duration> {
        self.current_options().notification_period
    }

    /// Run a notification pass right away
    ///
    /// # Errors
    ///
    /// Returns an error if tracking is stopped or an invariant breaks
    pub fn trigger_notification_now(&self) -> Result<NotificationReport> {
        let report = self.lock()?.notify(self.sink.as_ref())?;
        Ok(report)
    }

    /// Deliver one event to the manager
    ///
    /// # Errors
    ///
    /// Returns an error if the handler fails
    pub fn handle_event(&self, event: &SourceEvent) -> Result<()> {
        self.lock()?
            .handle_event(event)
            .with_context(|| format!("Failed to handle {event:?}"))
    }

    /// See [`TrackingManager::body_created`]
    ///
    /// # Errors
    ///
    /// Returns an error if the handler fails
    pub fn body_created(&self, body: BodyId) -> Result<()> {
        Ok(self.lock()?.body_created(body)?)
    }

    /// See [`TrackingManager::body_destroyed`]
    ///
    /// # Errors
    ///
    /// Returns an error if the handler fails
    pub fn body_destroyed(&self, body: BodyId) -> Result<()> {
        Ok(self.lock()?.body_destroyed(body)?)
    }

    /// See [`TrackingManager::unit_added`]
    ///
    /// # Errors
    ///
    /// Returns an error if the handler fails
    pub fn unit_added(&self, body: BodyId, unit: Unit) -> Result<()> {
        Ok(self.lock()?.unit_added(body, unit)?)
    }

    /// See [`TrackingManager::unit_removed`]
    ///
    /// # Errors
    ///
    /// Returns an error if the handler fails
    pub fn unit_removed(&self, body: BodyId, unit: &Unit) -> Result<()> {
        Ok(self.lock()?.unit_removed(body, unit)?)
    }

    /// See [`TrackingManager::linked`]
    ///
    /// # Errors
    ///
    /// Returns an error if the handler fails
    pub fn linked(&self, a: BodyId, b: BodyId, kind: LinkKind) -> Result<()> {
        Ok(self.lock()?.linked(a, b, kind)?)
    }

    /// See [`TrackingManager::unlinked`]
    ///
    /// # Errors
    ///
    /// Returns an error if the handler fails
    pub fn unlinked(&self, a: BodyId, b: BodyId, kind: LinkKind) -> Result<()> {
        Ok(self.lock()?.unlinked(a, b, kind)?)
    }

    /// See [`TrackingManager::list_hierarchy`]
    ///
    /// # Errors
    ///
    /// Returns an error if the manager lock is poisoned
    pub fn list_hierarchy(&self) -> Result<String> {
        Ok(self.lock()?.list_hierarchy())
    }

    /// See [`TrackingManager::list_trackers`]
    ///
    /// # Errors
    ///
    /// Returns an error if the manager lock is poisoned
    pub fn list_trackers(&self) -> Result<String> {
        Ok(self.lock()?.list_trackers())
    }

    /// See [`TrackingManager::count_nodes_of_level`]
    ///
    /// # Errors
    ///
    /// Returns an error if the manager lock is poisoned
    pub fn count_nodes_of_level(&self, level: Level) -> Result<usize> {
        Ok(self.lock()?.count_nodes_of_level(level))
    }
}

impl Drop for TrackingService {
    fn drop(&mut self) {
        let _ = self.timer.send(TimerCommand::Shutdown);
        if let Some(handle) = self.timer_thread.take()
            && handle.join().is_err()
        {
            error!("Notification timer panicked");
        }
    }
}

fn timer_loop(
    manager: &Weak<Mutex<TrackingManager>>,
    sink: &dyn MessageSink,
    commands: &Receiver<TimerCommand>,
) {
    // Next deadline and period while armed
    let mut schedule: Option<(Instant, Duration)> = None;

    loop {
        let command = match schedule {
            Some((deadline, _)) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match commands.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        match command {
            Some(TimerCommand::Arm { first, period }) => {
                schedule = Some((Instant::now() + first, period));
            }
            Some(TimerCommand::Disarm) => schedule = None,
            Some(TimerCommand::Shutdown) => break,
            None => {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                tick(&manager, sink);
                if let Some((_, period)) = schedule {
                    schedule = Some((Instant::now() + period, period));
                }
            }
        }
    }
    debug!("Notification timer exited");
}

fn tick(manager: &Mutex<TrackingManager>, sink: &dyn MessageSink) {
    let mut manager = manager
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if !manager.is_running() {
        debug!("Tracking stopped, skipping scheduled notification");
        return;
    }
    match manager.notify(sink) {
        Ok(report) => debug!(deliveries = report.deliveries, "Scheduled notification sent"),
        Err(e) => error!("Scheduled notification failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;
    use crate::rules::Comparison;
    use crate::sink::Outbox;
    use crate::source::World;

    fn service(outbox: Arc<Outbox>, options: ServiceOptions) -> TrackingService {
        let world = World::new();
        world.add_body(
            BodyId(1),
            None,
            vec![Unit::new("Refinery", "Large", Some(5)); 3],
        );
        let groups = vec![GroupConfig {
            name: "Refining".to_string(),
            rules: vec![RuleConfig {
                name: None,
                matches: "Refinery".to_string(),
                comparison: Comparison::Greater,
                threshold: 1,
            }],
            ..GroupConfig::default()
        }];
        let manager = TrackingManager::new(Arc::new(world), groups);
        TrackingService::new(manager, outbox, options).unwrap()
    }

    fn wait_for(outbox: &Outbox, flushes: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if outbox.flush_count() >= flushes {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_timer_fires_after_start() {
        let outbox = Arc::new(Outbox::new());
        let service = service(
            Arc::clone(&outbox),
            ServiceOptions {
                enabled: true,
                notification_period: Some(Duration::from_millis(20)),
                initial_delay: Duration::from_millis(1),
            },
        );
        service.start().unwrap();
        assert!(wait_for(&outbox, 2));
        assert_eq!(outbox.delivered()[0].recipient.0, 5);
    }

    #[test]
    fn test_disabled_timer_never_fires() {
        let outbox = Arc::new(Outbox::new());
        let service = service(
            Arc::clone(&outbox),
            ServiceOptions {
                enabled: true,
                notification_period: Some(Duration::from_millis(10)),
                initial_delay: Duration::from_secs(60),
            },
        );
        service.start().unwrap();
        service.set_notification_period(0).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(outbox.flush_count(), 0);
        assert!(service.notification_period().is_none());

        let report = service.trigger_notification_now().unwrap();
        assert_eq!(report.deliveries, 1);
        assert_eq!(outbox.flush_count(), 1);
    }

    #[test]
    fn test_trigger_requires_running() {
        let outbox = Arc::new(Outbox::new());
        let service = service(Arc::clone(&outbox), ServiceOptions::default());
        assert!(service.trigger_notification_now().is_err());
        service.start().unwrap();
        service.stop().unwrap();
        assert!(service.trigger_notification_now().is_err());
    }

    #[test]
    fn test_set_enabled_toggles_manager() {
        let outbox = Arc::new(Outbox::new());
        let options = ServiceOptions {
            enabled: false,
            notification_period: None,
            initial_delay: Duration::ZERO,
        };
        let service = service(Arc::clone(&outbox), options);
        service.set_enabled(false).unwrap();
        assert!(!service.with_manager(|m| m.is_running()).unwrap());

        service.set_enabled(true).unwrap();
        assert!(service.is_enabled());
        assert!(service.with_manager(|m| m.is_running()).unwrap());
        // Already running
        service.set_enabled(true).unwrap();

        service.set_enabled(false).unwrap();
        assert!(!service.is_enabled());
        assert!(!service.with_manager(|m| m.is_running()).unwrap());
        assert!(service.trigger_notification_now().is_err());
    }
}
