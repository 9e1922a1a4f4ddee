//! Firmware images deferred to the boot loader.
//!
//! Radio and bootloader images cannot be written from recovery. An update
//! binary asks for one with `firmware <kind> <target>`; once the child has
//! exited cleanly the image is staged here and the boot loader flashes it
//! on the next boot. At most one image is staged per session.
//!
//! Staged layout inside the firmware directory:
//!
//! ```text
//! firmware.img    raw image bytes
//! firmware.json   {"kind": "radio", "size": 1234, "sha256": "..."}
//! ```

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use recovery_schema::PACKAGE_PREFIX;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

use crate::io::{ensure_read, ensure_write};
use crate::package::{PackageError, UpdatePackage};

/// Image file name inside the firmware directory.
pub const IMAGE_FILE: &str = "firmware.img";
/// Metadata file name inside the firmware directory.
pub const METADATA_FILE: &str = "firmware.json";

/// Errors loading or staging a firmware image.
#[derive(Error, Debug)]
pub enum FirmwareError {
    /// An image is already staged for this session.
    #[error("Firmware {pending} already pending, ignoring {kind}")]
    AlreadyPending {
        /// Kind already staged.
        pending: String,
        /// Kind that was refused.
        kind: String,
    },

    /// The kind is not a plain identifier.
    #[error("Bad firmware type {0:?}")]
    InvalidKind(String),

    /// The image could not be read from the package.
    #[error("Can't load firmware image: {0}")]
    Package(#[from] PackageError),

    /// The image could not be read from the filesystem.
    #[error("Can't read firmware image {}: {source}", path.display())]
    ReadFile {
        /// Image path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The image or its metadata could not be stored.
    #[error("Can't store firmware in {}: {source}", dir.display())]
    Store {
        /// Firmware directory.
        dir: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Where a requested image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareSource {
    /// An entry of the package being installed.
    Package(String),
    /// A file on the recovery filesystem.
    File(PathBuf),
}

/// A `firmware` request made by the update binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareRequest {
    /// Image kind, e.g. `radio` or `hboot`.
    pub kind: String,
    /// Image location.
    pub source: FirmwareSource,
}

/// Image bytes ready to be staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    /// Image kind.
    pub kind: String,
    /// Raw image.
    pub data: Vec<u8>,
}

impl FirmwareRequest {
    /// Request from the protocol's `<kind> <target>` pair. A target of the
    /// form `PACKAGE:<entry>` names an entry of the open package.
    pub fn new(kind: &str, target: &str) -> Self {
        let source = match target.strip_prefix(PACKAGE_PREFIX) {
            Some(entry) => FirmwareSource::Package(entry.to_string()),
            None => FirmwareSource::File(PathBuf::from(target)),
        };
        Self {
            kind: kind.to_string(),
            source,
        }
    }

    /// Read the requested image.
    ///
    /// # Errors
    ///
    /// Returns [`FirmwareError::Package`] if the package entry is missing or
    /// unreadable, or [`FirmwareError::ReadFile`] if the file cannot be read
    /// in full.
    pub fn load(self, package: &mut UpdatePackage) -> Result<FirmwareImage, FirmwareError> {
        let data = match &self.source {
            FirmwareSource::Package(entry) => package.read_entry(entry)?,
            FirmwareSource::File(path) => read_file(path)?,
        };
        Ok(FirmwareImage {
            kind: self.kind,
            data,
        })
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, FirmwareError> {
    let read_err = |source| FirmwareError::ReadFile {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(read_err)?;
    let len = file.metadata().map_err(read_err)?.len();
    let len = usize::try_from(len)
        .map_err(|e| read_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    let mut data = vec![0u8; len];
    ensure_read(&mut file, &mut data).map_err(|e| read_err(e.into()))?;
    Ok(data)
}

/// Metadata of the staged image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFirmware {
    /// Image kind.
    pub kind: String,
    /// Image size in bytes.
    pub size: u64,
    /// Hex SHA-256 of the image.
    pub sha256: String,
}

/// Single-slot store for a deferred firmware image.
#[derive(Debug)]
pub struct FirmwareStore {
    dir: PathBuf,
    pending: Option<PendingFirmware>,
}

impl FirmwareStore {
    /// Store backed by `dir`, with nothing pending.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pending: None,
        }
    }

    /// Firmware directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether an image was staged this session.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The staged image, if any.
    pub fn pending(&self) -> Option<&PendingFirmware> {
        self.pending.as_ref()
    }

    /// Stage `data` as the firmware image of type `kind`.
    ///
    /// Both files are written to temporaries, synced and renamed into place,
    /// so a crash leaves either the previous files or the new ones.
    ///
    /// # Errors
    ///
    /// Returns [`FirmwareError::AlreadyPending`] if an image is already
    /// staged, [`FirmwareError::InvalidKind`] for a kind that is not a plain
    /// identifier, or [`FirmwareError::Store`] if writing fails.
    pub fn remember(&mut self, kind: &str, data: Vec<u8>) -> Result<&PendingFirmware, FirmwareError> {
        if let Some(pending) = &self.pending {
            return Err(FirmwareError::AlreadyPending {
                pending: pending.kind.clone(),
                kind: kind.to_string(),
            });
        }
        if kind.is_empty()
            || !kind
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(FirmwareError::InvalidKind(kind.to_string()));
        }

        let meta = PendingFirmware {
            kind: kind.to_string(),
            size: data.len() as u64,
            sha256: hex::encode(Sha256::digest(&data)),
        };
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| self.store_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        std::fs::create_dir_all(&self.dir).map_err(|e| self.store_err(e))?;
        self.persist(IMAGE_FILE, &data)?;
        self.persist(METADATA_FILE, &json)?;

        info!(
            "Stored {} firmware ({} bytes, sha256 {}) in {}",
            meta.kind,
            meta.size,
            meta.sha256,
            self.dir.display()
        );
        Ok(self.pending.insert(meta))
    }

    fn persist(&self, name: &str, bytes: &[u8]) -> Result<(), FirmwareError> {
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| self.store_err(e))?;
        ensure_write(tmp.as_file_mut(), bytes).map_err(|e| self.store_err(e.into()))?;
        tmp.as_file().sync_all().map_err(|e| self.store_err(e))?;
        tmp.persist(self.dir.join(name))
            .map_err(|e| self.store_err(e.error))?;
        Ok(())
    }

    fn store_err(&self, source: io::Error) -> FirmwareError {
        FirmwareError::Store {
            dir: self.dir.clone(),
            source,
        }
    }
}
