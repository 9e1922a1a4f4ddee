//! Segmented progress bar state.
//!
//! The bar is a sequence of segments. Each segment begins where the previous
//! one ended and covers a `portion` of the whole bar. Within a segment the
//! fill is the larger of the explicitly reported fraction and, for timed
//! segments, the elapsed share of the segment's duration.

use std::time::{Duration, Instant};

/// What the bar is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Not shown.
    Hidden,
    /// Animated, no known completion.
    Indeterminate,
    /// Segmented fill.
    Normal,
}

/// Progress bar state, owned by whoever renders it.
#[derive(Debug, Clone)]
pub struct ProgressBar {
    mode: ProgressMode,
    start: f32,
    size: f32,
    fraction: f32,
    duration: Duration,
    started: Instant,
}

impl ProgressBar {
    /// A hidden, empty bar.
    pub fn new(now: Instant) -> Self {
        Self {
            mode: ProgressMode::Hidden,
            start: 0.0,
            size: 0.0,
            fraction: 0.0,
            duration: Duration::ZERO,
            started: now,
        }
    }

    /// Current mode.
    pub fn mode(&self) -> ProgressMode {
        self.mode
    }

    /// Start a new segment after the current one.
    pub fn show_progress(&mut self, portion: f32, seconds: u32, now: Instant) {
        self.mode = ProgressMode::Normal;
        self.start += self.size;
        self.size = portion.clamp(0.0, 1.0 - self.start.min(1.0));
        self.fraction = 0.0;
        self.duration = Duration::from_secs(u64::from(seconds));
        self.started = now;
    }

    /// Report the completed fraction of the current segment.
    ///
    /// Values are clamped to `[0, 1]`; a value lower than the one already
    /// reported is ignored.
    pub fn set_progress(&mut self, fraction: f32) {
        if self.mode != ProgressMode::Normal {
            return;
        }
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        if fraction > self.fraction {
            self.fraction = fraction;
        }
    }

    /// Switch to the animated busy display.
    pub fn show_indeterminate(&mut self) {
        self.mode = ProgressMode::Indeterminate;
    }

    /// Hide the bar and drop all segments.
    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(now);
    }

    /// Filled share of the whole bar at `now`, in `[0, 1]`.
    pub fn position_at(&self, now: Instant) -> f32 {
        if self.mode != ProgressMode::Normal {
            return self.start;
        }
        let mut fill = self.fraction;
        if !self.duration.is_zero() {
            let elapsed = now.saturating_duration_since(self.started);
            let timed = (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0);
            fill = fill.max(timed);
        }
        self.start + self.size * fill
    }

    /// End of the current segment.
    pub fn segment_end(&self) -> f32 {
        self.start + self.size
    }
}
