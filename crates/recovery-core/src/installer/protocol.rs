//! Update binary control protocol.
//!
//! The child writes one command per line to the pipe it was handed:
//!
//! | Line | Effect |
//! |---|---|
//! | `progress <frac> <secs>` | start a progress segment of `frac` of the install share, filled over `secs` (0: manual) |
//! | `set_progress <frac>` | fraction of the current segment that is done |
//! | `firmware <kind> <target>` | stage a firmware image once the child exits cleanly |
//! | `ui_print [text]` | show `text` (everything after the first space) |
//!
//! Blank lines are ignored. Anything else is logged and skipped so a newer
//! update binary keeps working on an older recovery.

use recovery_schema::VERIFICATION_PROGRESS_FRACTION;
use thiserror::Error;
use tracing::{debug, warn};

use crate::firmware::FirmwareRequest;
use crate::reporter::Reporter;

/// A line the parser could not turn into a command.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// The verb is not one this recovery understands.
    #[error("unknown command [{0}]")]
    UnknownVerb(String),

    /// The verb is known but its arguments are not.
    #[error("bad arguments for {verb}: {line:?}")]
    BadArguments {
        /// Verb of the line.
        verb: &'static str,
        /// Full line.
        line: String,
    },
}

/// One parsed protocol line.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildCommand {
    /// `progress <fraction> <seconds>`
    Progress {
        /// Share of the install portion this segment covers.
        fraction: f32,
        /// Seconds to fill it in, 0 for manual.
        seconds: u32,
    },
    /// `set_progress <fraction>`
    SetProgress(f32),
    /// `firmware <kind> <target>`
    Firmware {
        /// Image kind.
        kind: String,
        /// Image location, possibly `PACKAGE:`-prefixed.
        target: String,
    },
    /// `ui_print [text]`
    UiPrint(String),
}

impl ChildCommand {
    /// Parse one line (with or without its trailing newline).
    ///
    /// Returns `Ok(None)` for a blank line.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] for unknown verbs and malformed arguments.
    pub fn parse(line: &str) -> Result<Option<Self>, ProtocolError> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.trim_start_matches(' ');
        if line.trim().is_empty() {
            return Ok(None);
        }
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));

        let bad = |verb| ProtocolError::BadArguments {
            verb,
            line: line.to_string(),
        };

        let cmd = match verb {
            "progress" => {
                let [fraction, seconds] = words(rest).ok_or_else(|| bad("progress"))?;
                Self::Progress {
                    fraction: fraction_arg(fraction).ok_or_else(|| bad("progress"))?,
                    seconds: seconds.parse().map_err(|_| bad("progress"))?,
                }
            }
            "set_progress" => {
                let [fraction] = words(rest).ok_or_else(|| bad("set_progress"))?;
                Self::SetProgress(fraction_arg(fraction).ok_or_else(|| bad("set_progress"))?)
            }
            "firmware" => {
                let [kind, target] = words(rest).ok_or_else(|| bad("firmware"))?;
                Self::Firmware {
                    kind: kind.to_string(),
                    target: target.to_string(),
                }
            }
            "ui_print" => Self::UiPrint(rest.to_string()),
            other => return Err(ProtocolError::UnknownVerb(other.to_string())),
        };
        Ok(Some(cmd))
    }
}

fn words<const N: usize>(rest: &str) -> Option<[&str; N]> {
    let mut it = rest.split_whitespace();
    let mut out = [""; N];
    for slot in &mut out {
        *slot = it.next()?;
    }
    it.next().is_none().then_some(out)
}

fn fraction_arg(s: &str) -> Option<f32> {
    s.parse::<f32>().ok().filter(|f| f.is_finite())
}

/// Applies child commands for one install attempt.
pub struct ProtocolHandler<'a> {
    reporter: &'a dyn Reporter,
    firmware: Option<FirmwareRequest>,
}

impl std::fmt::Debug for ProtocolHandler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolHandler")
            .field("firmware", &self.firmware)
            .finish_non_exhaustive()
    }
}

impl<'a> ProtocolHandler<'a> {
    /// Handler reporting to `reporter`, with no firmware requested yet.
    pub fn new(reporter: &'a dyn Reporter) -> Self {
        Self {
            reporter,
            firmware: None,
        }
    }

    /// Parse and apply one line. Bad lines are logged and skipped.
    pub fn handle_line(&mut self, line: &str) {
        match ChildCommand::parse(line) {
            Ok(Some(cmd)) => self.apply(cmd),
            Ok(None) => {}
            Err(e) => warn!("update binary: {e}"),
        }
    }

    /// Apply one parsed command.
    pub fn apply(&mut self, cmd: ChildCommand) {
        match cmd {
            ChildCommand::Progress { fraction, seconds } => {
                self.reporter
                    .show_progress(fraction * (1.0 - VERIFICATION_PROGRESS_FRACTION), seconds);
            }
            ChildCommand::SetProgress(fraction) => self.reporter.set_progress(fraction),
            ChildCommand::Firmware { kind, target } => {
                if let Some(first) = &self.firmware {
                    warn!(
                        "Ignoring attempt to do multiple firmware updates ({kind} after {})",
                        first.kind
                    );
                } else {
                    debug!("update binary requested {kind} firmware from {target}");
                    self.firmware = Some(FirmwareRequest::new(&kind, &target));
                }
            }
            ChildCommand::UiPrint(text) => self.reporter.print(&text),
        }
    }

    /// The firmware request made during the run, if any.
    pub fn into_firmware(self) -> Option<FirmwareRequest> {
        self.firmware
    }
}
