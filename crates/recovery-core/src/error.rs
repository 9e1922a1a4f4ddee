//! Install failure classification.

use std::path::PathBuf;

use recovery_schema::InstallStatus;
use thiserror::Error;

use crate::firmware::FirmwareError;
use crate::installer::script::ScriptError;
use crate::keys::KeyError;
use crate::package::PackageError;
use crate::roots::RootError;
use crate::verifier::VerifyError;

/// Why an install attempt did not succeed.
#[derive(Error, Debug)]
pub enum InstallError {
    /// The package's root could not be made available.
    #[error("Can't mount {path}: {source}")]
    Mount {
        /// Package path as given.
        path: String,
        /// Underlying root error.
        source: RootError,
    },

    /// The package path could not be mapped to a host path.
    #[error("Bad path {path}: {source}")]
    Translate {
        /// Package path as given.
        path: String,
        /// Underlying root error.
        source: RootError,
    },

    /// The trusted key file is unusable.
    #[error("Failed to load keys: {0}")]
    Keys(#[from] KeyError),

    /// The package is not a readable archive.
    #[error("{0}")]
    Open(#[source] PackageError),

    /// The signature did not verify.
    #[error("Signature verification failed: {0}")]
    Verify(#[from] VerifyError),

    /// The package carries neither an update binary nor an update script.
    #[error("Can't find update script")]
    NoInstaller,

    /// The update binary could not be written out.
    #[error("Can't copy update binary to {}: {source}", path.display())]
    ExtractBinary {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The update binary could not be started.
    #[error("Can't run update binary: {0}")]
    Spawn(#[source] std::io::Error),

    /// Reading the child's output or waiting for it failed.
    #[error("Lost contact with update binary: {0}")]
    Child(#[source] std::io::Error),

    /// The update binary exited unsuccessfully.
    #[error("Update binary failed ({0})")]
    BinaryFailed(String),

    /// The requested firmware image could not be staged.
    #[error("Firmware update failed: {0}")]
    Firmware(#[from] FirmwareError),

    /// The update script entry is empty.
    #[error("Update script is empty")]
    EmptyScript,

    /// The update script entry could not be read.
    #[error("Can't read update script: {0}")]
    ReadScript(#[source] PackageError),

    /// The update script could not be parsed.
    #[error("Syntax error in update script: {0}")]
    ParseScript(#[from] ScriptError),

    /// The update script stopped on a failing command.
    #[error("Failure at line {line}:\n{text}")]
    ScriptHalted {
        /// 1-based line number.
        line: usize,
        /// Source text of that line.
        text: String,
    },
}

impl InstallError {
    /// Status reported for this failure.
    ///
    /// Anything that shows the package itself is untrustworthy or
    /// unrecognizable is [`InstallStatus::Corrupt`]; failures while
    /// processing a verified package are [`InstallStatus::Error`].
    pub fn status(&self) -> InstallStatus {
        match self {
            Self::Mount { .. }
            | Self::Translate { .. }
            | Self::Keys(_)
            | Self::Open(_)
            | Self::Verify(_)
            | Self::NoInstaller => InstallStatus::Corrupt,
            Self::ExtractBinary { .. }
            | Self::Spawn(_)
            | Self::Child(_)
            | Self::BinaryFailed(_)
            | Self::Firmware(_)
            | Self::EmptyScript
            | Self::ReadScript(_)
            | Self::ParseScript(_)
            | Self::ScriptHalted { .. } => InstallStatus::Error,
        }
    }
}
