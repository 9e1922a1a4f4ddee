//! Reporter trait for dependency injection
//!
//! Installer and recovery logic report operator-visible text and progress
//! through this trait instead of talking to a display directly.

/// Background icon shown behind the text and progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    /// No icon.
    None,
    /// An installation is running.
    Installing,
    /// The last operation failed.
    Error,
}

/// Operator-facing display sink.
pub trait Reporter: Send + Sync {
    /// Print a line of text on the display.
    fn print(&self, msg: &str);

    /// Switch the background icon.
    fn set_background(&self, background: Background);

    /// Show an animated "busy" bar with no known completion.
    fn show_indeterminate_progress(&self);

    /// Start a new progress segment covering `portion` of the whole bar,
    /// filling automatically over `seconds` (0 means only [`set_progress`]
    /// moves it).
    ///
    /// [`set_progress`]: Reporter::set_progress
    fn show_progress(&self, portion: f32, seconds: u32);

    /// Set the fraction of the current segment that is complete.
    fn set_progress(&self, fraction: f32);

    /// Hide the progress bar and forget all segments.
    fn reset_progress(&self);

    /// Whether the operator has turned on the text log.
    fn text_visible(&self) -> bool;
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn print(&self, msg: &str) {
        (**self).print(msg);
    }
    fn set_background(&self, background: Background) {
        (**self).set_background(background);
    }
    fn show_indeterminate_progress(&self) {
        (**self).show_indeterminate_progress();
    }
    fn show_progress(&self, portion: f32, seconds: u32) {
        (**self).show_progress(portion, seconds);
    }
    fn set_progress(&self, fraction: f32) {
        (**self).set_progress(fraction);
    }
    fn reset_progress(&self) {
        (**self).reset_progress();
    }
    fn text_visible(&self) -> bool {
        (**self).text_visible()
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn print(&self, _: &str) {}
    fn set_background(&self, _: Background) {}
    fn show_indeterminate_progress(&self) {}
    fn show_progress(&self, _: f32, _: u32) {}
    fn set_progress(&self, _: f32) {}
    fn reset_progress(&self) {}
    fn text_visible(&self) -> bool {
        false
    }
}
