//! Errors raised by the recovery flow itself

use std::path::PathBuf;

use recovery_core::roots::RootError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Can't mount {path}: {source}")]
    Mount { path: String, source: RootError },

    #[error("Bad path {path}: {source}")]
    Translate { path: String, source: RootError },

    #[error("Can't access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl RecoveryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
