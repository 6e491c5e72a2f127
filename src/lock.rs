//! Advisory locking over sets of bodies
//!
//! Callers that touch several bodies from different threads take a
//! [`ResourceLock`] over the affected ids first. Locks held by the same
//! thread never conflict with each other, so nested acquisition is fine.
//! Locks are released automatically when dropped.

use crate::model::BodyId;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, trace};

const FIRST_WAIT: Duration = Duration::from_millis(1);
const MAX_WAIT: Duration = Duration::from_millis(8);

/// A lock currently registered with a scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveLock {
    /// Scheduler-unique lock id
    pub id: u64,
    pub owner: ThreadId,
    pub bodies: BTreeSet<BodyId>,
}

impl ActiveLock {
    fn conflicts_with(&self, thread: ThreadId, bodies: &BTreeSet<BodyId>) -> bool {
        self.owner != thread && !self.bodies.is_disjoint(bodies)
    }
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    active: Vec<ActiveLock>,
}

#[derive(Debug, Default)]
struct Inner {
    registry: Mutex<Registry>,
    released: Condvar,
}

/// Hands out [`ResourceLock`]s over body sets
///
/// Cloning is cheap; clones share the same set of active locks.
#[derive(Debug, Clone, Default)]
pub struct LockScheduler {
    inner: Arc<Inner>,
}

impl LockScheduler {
    /// Create a scheduler with no active locks
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock `bodies`, waiting while another thread holds an intersecting lock
    ///
    /// Waits back off from 1 ms up to 8 ms and are retried until the
    /// conflicting locks go away.
    pub fn acquire(&self, bodies: impl IntoIterator<Item = BodyId>) -> ResourceLock {
        let bodies: BTreeSet<BodyId> = bodies.into_iter().collect();
        let thread = thread::current().id();
        let mut wait = FIRST_WAIT;
        let mut registry = self.registry();

        while registry
            .active
            .iter()
            .any(|lock| lock.conflicts_with(thread, &bodies))
        {
            trace!(?bodies, ?wait, "Lock busy, waiting");
            registry = self
                .inner
                .released
                .wait_timeout(registry, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            wait = (wait * 2).min(MAX_WAIT);
        }

        self.register(&mut registry, thread, bodies)
    }

    /// Lock `bodies` only if no other thread holds an intersecting lock
    pub fn try_acquire(&self, bodies: impl IntoIterator<Item = BodyId>) -> Option<ResourceLock> {
        let bodies: BTreeSet<BodyId> = bodies.into_iter().collect();
        let thread = thread::current().id();
        let mut registry = self.registry();

        if registry
            .active
            .iter()
            .any(|lock| lock.conflicts_with(thread, &bodies))
        {
            return None;
        }
        Some(self.register(&mut registry, thread, bodies))
    }

    fn register(
        &self,
        registry: &mut Registry,
        owner: ThreadId,
        bodies: BTreeSet<BodyId>,
    ) -> ResourceLock {
        let id = registry.next_id;
        registry.next_id += 1;
        registry.active.push(ActiveLock {
            id,
            owner,
            bodies,
        });
        ResourceLock {
            scheduler: self.clone(),
            id,
            active: true,
            _not_send: PhantomData,
        }
    }

    fn unregister(&self, id: u64) {
        self.registry().active.retain(|lock| lock.id != id);
        self.inner.released.notify_all();
    }

    /// Snapshot of the locks held right now
    #[must_use]
    pub fn active_locks(&self) -> Vec<ActiveLock> {
        self.registry().active.clone()
    }

    /// Log every active lock at debug level
    pub fn log_active_locks(&self) {
        let active = self.active_locks();
        debug!(count = active.len(), "Active resource locks");
        for lock in &active {
            let bodies: Vec<String> = lock.bodies.iter().map(ToString::to_string).collect();
            debug!(id = lock.id, owner = ?lock.owner, "Locked bodies: {}", bodies.join(", "));
        }
    }
}

/// Holds a body set locked until dropped
///
/// Must be released on the thread that acquired it.
pub struct ResourceLock {
    scheduler: LockScheduler,
    id: u64,
    active: bool,
    _not_send: PhantomData<*const ()>,
}

impl ResourceLock {
    /// Scheduler-unique id of this lock
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Release the lock explicitly (normally handled by Drop)
    pub fn release(mut self) {
        self.unlock();
    }

    fn unlock(&mut self) {
        if self.active {
            self.active = false;
            self.scheduler.unregister(self.id);
        }
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        self.unlock();
    }
}

impl std::fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLock")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Instant;

    fn ids(raw: &[u64]) -> Vec<BodyId> {
        raw.iter().copied().map(BodyId).collect()
    }

    #[test]
    fn test_acquire_and_release() {
        let scheduler = LockScheduler::new();
        let lock = scheduler.acquire(ids(&[1, 2]));
        assert_eq!(scheduler.active_locks().len(), 1);
        lock.release();
        assert!(scheduler.active_locks().is_empty());
    }

    #[test]
    fn test_same_thread_never_conflicts() {
        let scheduler = LockScheduler::new();
        let _outer = scheduler.acquire(ids(&[1, 2]));
        let inner = scheduler.try_acquire(ids(&[2, 3]));
        assert!(inner.is_some());
        assert_eq!(scheduler.active_locks().len(), 2);
    }

    #[test]
    fn test_overlapping_lock_from_other_thread_fails() {
        let scheduler = LockScheduler::new();
        let _held = scheduler.acquire(ids(&[1, 2]));

        let other = scheduler.clone();
        let (overlap, disjoint) = thread::spawn(move || {
            let overlap = other.try_acquire(ids(&[2, 5])).is_some();
            let disjoint = other.try_acquire(ids(&[7])).is_some();
            (overlap, disjoint)
        })
        .join()
        .unwrap();

        assert!(!overlap);
        assert!(disjoint);
    }

    #[test]
    fn test_waiter_wakes_after_drop() {
        let scheduler = LockScheduler::new();
        let held = scheduler.acquire(ids(&[4]));

        let other = scheduler.clone();
        let (started_tx, started_rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            let start = Instant::now();
            started_tx.send(()).unwrap();
            let lock = other.acquire(ids(&[4]));
            let waited = start.elapsed();
            drop(lock);
            waited
        });

        started_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(30));
        drop(held);

        let waited = waiter.join().unwrap();
        assert!(waited >= Duration::from_millis(20), "waited {waited:?}");
        assert!(scheduler.active_locks().is_empty());
    }
}
