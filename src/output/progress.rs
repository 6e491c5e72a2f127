//! In-place progress line for event replay.

use colored::Colorize;
use std::io::{self, IsTerminal, Write};

/// Progress line that redraws in place on a TTY and stays silent otherwise
///
/// Renders as "Replaying events: 40% (8/20)" and ends with ", done.".
pub struct Progress {
    title: String,
    total: usize,
    current: usize,
    is_tty: bool,
    /// Last drawn percentage, to skip redundant redraws
    last_percent: u8,
    finished: bool,
}

impl Progress {
    /// Creates a progress line over `total` steps.
    #[must_use]
    pub fn new(title: &str, total: usize) -> Self {
        let progress = Self {
            title: title.to_string(),
            total,
            current: 0,
            is_tty: io::stderr().is_terminal(),
            last_percent: 0,
            finished: false,
        };
        progress.draw();
        progress
    }

    /// Advances by one step.
    pub fn tick(&mut self) {
        self.set(self.current + 1);
    }

    /// Moves to `current`, clamped to the total.
    pub fn set(&mut self, current: usize) {
        self.current = current.min(self.total);
        let percent = self.percent();
        if percent != self.last_percent {
            self.last_percent = percent;
            self.draw();
        }
    }

    /// Steps completed so far.
    #[must_use]
    pub const fn current(&self) -> usize {
        self.current
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.current as f64 / self.total as f64) * 100.0) as u8
    }

    fn draw(&self) {
        if !self.is_tty || self.total == 0 || super::get_verbosity() == super::Verbosity::Quiet {
            return;
        }
        eprint!(
            "\r{}: {}% ({}/{})",
            self.title.dimmed(),
            self.percent().to_string().dimmed(),
            self.current,
            self.total
        );
        let _ = io::stderr().flush();
    }

    /// Completes the line with a "done" suffix.
    pub fn finish(mut self) {
        self.current = self.total;
        self.finished = true;
        if self.is_tty && self.total > 0 && super::get_verbosity() != super::Verbosity::Quiet {
            eprintln!(
                "\r{}: 100% ({}/{}), done.",
                self.title.dimmed(),
                self.total,
                self.total
            );
        }
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if self.is_tty && !self.finished && self.current > 0 && self.current < self.total {
            eprintln!();
        }
    }
}
