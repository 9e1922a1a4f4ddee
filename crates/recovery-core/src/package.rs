//! Update package archive access.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

/// Errors that can occur when accessing an update package.
#[derive(Error, Debug)]
pub enum PackageError {
    /// The file could not be opened or is not a ZIP archive.
    #[error("Can't open {}: {source}", path.display())]
    Open {
        /// Package path.
        path: PathBuf,
        /// Underlying archive error.
        source: ZipError,
    },

    /// The archive has no entry with this name.
    #[error("No {0} in package")]
    NotFound(String),

    /// An entry could not be read.
    #[error("Can't read {name}: {source}")]
    Read {
        /// Entry name.
        name: String,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// An opened update package.
#[derive(Debug)]
pub struct UpdatePackage {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl UpdatePackage {
    /// Open the archive at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Open`] if the file is missing or not a valid
    /// archive.
    pub fn open(path: &Path) -> Result<Self, PackageError> {
        let open_err = |source| PackageError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(|e| open_err(ZipError::Io(e)))?;
        let archive = ZipArchive::new(file).map_err(open_err)?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    /// Path the package was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an entry named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    /// Uncompressed size of `name`, if present.
    pub fn entry_len(&mut self, name: &str) -> Option<u64> {
        self.archive.by_name(name).ok().map(|entry| entry.size())
    }

    /// Read the whole entry into memory.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::NotFound`] or [`PackageError::Read`].
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, PackageError> {
        let mut buf = Vec::new();
        self.extract_entry(name, &mut buf)?;
        Ok(buf)
    }

    /// Stream an entry into `out`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::NotFound`] if there is no such entry, or
    /// [`PackageError::Read`] if decompression or the write fails.
    pub fn extract_entry<W: Write + ?Sized>(&mut self, name: &str, out: &mut W) -> Result<u64, PackageError> {
        let read_err = |source| PackageError::Read {
            name: name.to_string(),
            source,
        };
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Err(PackageError::NotFound(name.to_string())),
            Err(e) => return Err(read_err(e.into())),
        };
        let expected = entry.size();
        let copied = io::copy(&mut entry, out).map_err(read_err)?;
        if copied != expected {
            return Err(read_err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("extracted {copied} of {expected} bytes"),
            )));
        }
        Ok(copied)
    }

    /// Close the archive.
    pub fn close(self) {
        drop(self.archive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::SimpleFileOptions;

    fn build(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn reads_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.zip");
        build(&path, &[("radio.img", b"RADIO"), ("empty", b"")]);

        let mut pkg = UpdatePackage::open(&path).unwrap();
        assert_eq!(pkg.path(), path);
        assert!(pkg.contains("radio.img"));
        assert!(!pkg.contains("boot.img"));
        assert_eq!(pkg.entry_len("radio.img"), Some(5));
        assert_eq!(pkg.entry_len("empty"), Some(0));
        assert_eq!(pkg.entry_len("boot.img"), None);
        assert_eq!(pkg.read_entry("radio.img").unwrap(), b"RADIO");

        let mut out = Vec::new();
        assert_eq!(pkg.extract_entry("radio.img", &mut out).unwrap(), 5);
        assert_eq!(out, b"RADIO");
        pkg.close();
    }

    #[test]
    fn missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.zip");
        build(&path, &[("a", b"1")]);
        let mut pkg = UpdatePackage::open(&path).unwrap();
        assert!(matches!(
            pkg.read_entry("b"),
            Err(PackageError::NotFound(name)) if name == "b"
        ));
    }

    #[test]
    fn not_an_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();
        assert!(matches!(
            UpdatePackage::open(&path),
            Err(PackageError::Open { .. })
        ));
        assert!(matches!(
            UpdatePackage::open(&dir.path().join("missing.zip")),
            Err(PackageError::Open { .. })
        ));
    }
}
