//! Bootloader control block storage.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use recovery_schema::message::{BootloaderMessage, MESSAGE_SIZE};
use thiserror::Error;
use tracing::warn;

use crate::io::{ensure_read, ensure_write};

/// Errors accessing the control block.
#[derive(Error, Debug)]
pub enum MiscError {
    /// Reading the block failed.
    #[error("Can't read {}: {source}", path.display())]
    Read {
        /// Backing file or device.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Writing the block failed.
    #[error("Can't write {}: {source}", path.display())]
    Write {
        /// Backing file or device.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Persistent storage for the bootloader control block.
pub trait MiscStore: Send + Sync {
    /// Read the current block.
    ///
    /// # Errors
    ///
    /// Returns [`MiscError::Read`] if the storage cannot be read.
    fn read(&self) -> Result<BootloaderMessage, MiscError>;

    /// Replace the block.
    ///
    /// # Errors
    ///
    /// Returns [`MiscError::Write`] if the block cannot be written durably.
    fn write(&self, msg: &BootloaderMessage) -> Result<(), MiscError>;
}

/// Control block at offset 0 of a file or block device.
#[derive(Debug, Clone)]
pub struct FileMisc {
    path: PathBuf,
}

impl FileMisc {
    /// Block stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MiscStore for FileMisc {
    fn read(&self) -> Result<BootloaderMessage, MiscError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(BootloaderMessage::default());
            }
            Err(source) => {
                return Err(MiscError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut buf = [0u8; MESSAGE_SIZE];
        if let Err(short) = ensure_read(&mut file, &mut buf) {
            if short.source.is_some() {
                return Err(MiscError::Read {
                    path: self.path.clone(),
                    source: short.into(),
                });
            }
            warn!(
                "{} holds {} of {MESSAGE_SIZE} bytes, treating as empty",
                self.path.display(),
                short.actual
            );
            return Ok(BootloaderMessage::default());
        }

        BootloaderMessage::from_bytes(&buf).map_err(|e| MiscError::Read {
            path: self.path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })
    }

    fn write(&self, msg: &BootloaderMessage) -> Result<(), MiscError> {
        let wrap = |source| MiscError::Write {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(wrap)?;
        file.seek(SeekFrom::Start(0)).map_err(wrap)?;
        ensure_write(&mut file, &msg.to_bytes()).map_err(|e| wrap(e.into()))?;
        file.sync_all().map_err(wrap)
    }
}
