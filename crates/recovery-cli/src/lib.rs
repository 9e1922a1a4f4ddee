//! recovery - OTA package installer for recovery mode
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Boots into recovery, works out what the main system asked for, does it,
//! and leaves the device ready to boot normally again.
//!
//! # Overview
//!
//! Requests arrive as `--option` arguments, from (in order of precedence)
//! the command line, the bootloader control block, or the command file the
//! main system drops in `/cache/recovery/command`. Supported requests are
//! installing a signed update package and wiping user data or cache.
//!
//! # Restartability
//!
//! The control block is rewritten to `boot-recovery` with the current
//! arguments before any work starts, and cleared only once the work is
//! done. Losing power at any point in between re-runs the same request.
//!
//! # Files
//!
//! ```text
//! /cache/recovery/
//! ├── command     # INPUT: one argument per line
//! ├── log         # OUTPUT: combined log from every run
//! ├── intent      # OUTPUT: --send_intent text
//! └── firmware/   # firmware image waiting for the boot loader
//! ```

pub mod ops;
pub mod ui;

pub use ops::{RecoveryContext, RecoveryError};

use clap::Parser;
use std::path::PathBuf;

/// Program name placed in front of the recovery arguments.
pub const PROGRAM_NAME: &str = "recovery";

#[derive(Debug, Parser)]
#[command(name = "recovery")]
#[command(author, version = env!("RECOVERY_VERSION"), about = "Install signed OTA update packages from recovery mode")]
pub struct Cli {
    /// Configuration file (defaults to device paths, or $RECOVERY_ROOT)
    #[arg(long, env = "RECOVERY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Keep the text log on screen; recovery then waits in the menu after
    /// a successful command instead of rebooting
    #[arg(long, env = "RECOVERY_SHOW_TEXT")]
    pub show_text: bool,

    /// Recovery arguments (--update_package=ROOT:path, --wipe_data, ...)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Full argument vector, program name first.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(PROGRAM_NAME.to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}
