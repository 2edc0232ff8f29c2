//! Lock-free progress counting and a polling progress bar.
//!
//! Workers bump a single atomic counter; a reporter thread samples it on a
//! fixed interval and redraws an `indicatif` bar. The reporter never
//! touches image data and workers never wait on the reporter.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Shared count of completed work units (rows, or pixels for tiles).
#[derive(Debug)]
pub struct Progress {
    completed: AtomicUsize,
    total: usize,
    finished: AtomicBool,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
            finished: AtomicBool::new(false),
        }
    }

    /// Record `units` more units of finished work.
    pub fn advance(&self, units: usize) {
        self.completed.fetch_add(units, Ordering::Release);
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Completed fraction in [0, 1].
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.completed() as f64 / self.total as f64).min(1.0)
    }

    /// Tell the reporter that every worker has been joined.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Guard that calls [`Progress::finish`] when dropped, including
    /// during unwinding, so the reporter can never outlive the workers.
    pub fn finish_on_drop(&self) -> FinishGuard<'_> {
        FinishGuard(self)
    }
}

pub struct FinishGuard<'a>(&'a Progress);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Poll `progress` every `interval` and mirror it onto `bar` until the
/// render is marked finished.
pub fn report(progress: &Progress, bar: &ProgressBar, interval: Duration) {
    bar.set_length(progress.total() as u64);
    loop {
        // Read the flag before the counter so the last redraw is complete.
        let finished = progress.is_finished();
        bar.set_position(progress.completed() as u64);
        if finished {
            break;
        }
        std::thread::sleep(interval);
    }
    bar.finish();
}

/// A progress bar drawn to stderr with percentage and elapsed time.
pub fn stderr_bar(total: u64) -> ProgressBar {
    let style = ProgressStyle::with_template(
        "{elapsed_precise} [{bar:40.cyan/blue}] {percent:>3}% ({pos}/{len})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");

    ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr_with_hz(20))
        .with_style(style)
}
