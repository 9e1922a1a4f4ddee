//! Console reporter.
//!
//! Stands in for the recovery screen: text goes to stdout, and every line
//! is also logged so the persistent log carries the screen transcript.
//! Progress is tracked in a [`ProgressBar`] and logged at debug level.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use recovery_core::progress::ProgressBar;
use recovery_core::{Background, Reporter};
use tracing::{debug, info};

pub struct ConsoleReporter {
    progress: Mutex<ProgressBar>,
    background: Mutex<Background>,
    text_visible: bool,
}

impl std::fmt::Debug for ConsoleReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleReporter")
            .field("text_visible", &self.text_visible)
            .finish_non_exhaustive()
    }
}

impl ConsoleReporter {
    pub fn new(text_visible: bool) -> Self {
        Self {
            progress: Mutex::new(ProgressBar::new(Instant::now())),
            background: Mutex::new(Background::None),
            text_visible,
        }
    }

    /// Current background icon.
    pub fn background(&self) -> Background {
        *lock(&self.background)
    }

    /// Current bar position in `0.0..=1.0`.
    pub fn position(&self) -> f32 {
        lock(&self.progress).position_at(Instant::now())
    }
}

// A panic while holding the lock leaves plain display state behind; keep
// using it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Reporter for ConsoleReporter {
    fn print(&self, msg: &str) {
        info!("{msg}");
        println!("{msg}");
    }

    fn set_background(&self, background: Background) {
        debug!("background: {background:?}");
        *lock(&self.background) = background;
    }

    fn show_indeterminate_progress(&self) {
        let mut bar = lock(&self.progress);
        bar.show_indeterminate();
        debug!("progress {:?}", bar.mode());
    }

    fn show_progress(&self, portion: f32, seconds: u32) {
        let mut bar = lock(&self.progress);
        bar.show_progress(portion, seconds, Instant::now());
        debug!("progress segment {portion} over {seconds}s, ends at {}", bar.segment_end());
    }

    fn set_progress(&self, fraction: f32) {
        let mut bar = lock(&self.progress);
        bar.set_progress(fraction);
        debug!("progress {:?} at {:.3}", bar.mode(), bar.position_at(Instant::now()));
    }

    fn reset_progress(&self) {
        lock(&self.progress).reset(Instant::now());
    }

    fn text_visible(&self) -> bool {
        self.text_visible
    }
}
