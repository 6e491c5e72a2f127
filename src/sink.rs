//! Message sinks for notification deliveries.
//!
//! A notification pass enqueues one message per recipient and flushes the
//! sink once at the end.

use crate::model::OwnerId;
use colored::Colorize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Receiver of notification messages
pub trait MessageSink: Send + Sync {
    /// Queue a message for a recipient
    fn enqueue(&self, recipient: OwnerId, body: String);

    /// Deliver everything queued so far
    fn flush(&self);
}

/// A message handed to a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: OwnerId,
    pub body: String,
}

/// Sink that keeps deliveries in memory
#[derive(Debug, Default)]
pub struct Outbox {
    queued: Mutex<Vec<Delivery>>,
    delivered: Mutex<Vec<Delivery>>,
    flushes: Mutex<usize>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Outbox {
    /// Create an empty outbox
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered by past flushes
    #[must_use]
    pub fn delivered(&self) -> Vec<Delivery> {
        lock(&self.delivered).clone()
    }

    /// Messages waiting for the next flush
    #[must_use]
    pub fn queued(&self) -> Vec<Delivery> {
        lock(&self.queued).clone()
    }

    /// Number of flushes so far
    #[must_use]
    pub fn flush_count(&self) -> usize {
        *lock(&self.flushes)
    }

    /// Remove and return every delivered message
    pub fn take_delivered(&self) -> Vec<Delivery> {
        std::mem::take(&mut *lock(&self.delivered))
    }
}

impl MessageSink for Outbox {
    fn enqueue(&self, recipient: OwnerId, body: String) {
        lock(&self.queued).push(Delivery { recipient, body });
    }

    fn flush(&self) {
        let mut queued = std::mem::take(&mut *lock(&self.queued));
        lock(&self.delivered).append(&mut queued);
        *lock(&self.flushes) += 1;
    }
}

/// Sink that prints deliveries to stdout
#[derive(Debug, Default)]
pub struct ConsoleSink {
    queued: Mutex<Vec<Delivery>>,
}

impl ConsoleSink {
    /// Create a console sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageSink for ConsoleSink {
    fn enqueue(&self, recipient: OwnerId, body: String) {
        lock(&self.queued).push(Delivery { recipient, body });
    }

    fn flush(&self) {
        let queued = std::mem::take(&mut *lock(&self.queued));
        for delivery in queued {
            println!(
                "{} {}",
                "to".dimmed(),
                format!("owner {}", delivery.recipient).bold()
            );
            for line in delivery.body.lines() {
                println!("  {line}");
            }
        }
    }
}
