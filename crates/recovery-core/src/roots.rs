//! Root path translation.
//!
//! Recovery names files as `ROOT:path` (`CACHE:recovery/command`,
//! `SDCARD:update.zip`). A [`Roots`] implementation makes the root usable
//! and maps such a name to a host path. Plain absolute paths are accepted
//! as-is.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::info;

/// Errors resolving or preparing a root.
#[derive(Error, Debug)]
pub enum RootError {
    /// The path has no `ROOT:` prefix and is not absolute.
    #[error("Bad path {0:?}: expected ROOT:path")]
    Malformed(String),

    /// The root name is not configured.
    #[error("Unknown root {0:?}")]
    UnknownRoot(String),

    /// The root's backing storage is not available.
    #[error("{root} is not mounted ({} missing)", dir.display())]
    NotMounted {
        /// Root name.
        root: String,
        /// Backing directory.
        dir: PathBuf,
    },

    /// The path tries to leave its root.
    #[error("Path {0:?} escapes its root")]
    Escapes(String),

    /// Erasing the root failed.
    #[error("Can't format {root}: {source}")]
    Format {
        /// Root name.
        root: String,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Root mounting and path translation.
pub trait Roots: Send + Sync {
    /// Make the root named by `root_path` available.
    ///
    /// # Errors
    ///
    /// Returns [`RootError`] if the root is unknown or cannot be made
    /// available.
    fn ensure_mounted(&self, root_path: &str) -> Result<(), RootError>;

    /// Map `root_path` to a host path.
    ///
    /// # Errors
    ///
    /// Returns [`RootError`] if the path is malformed, names an unknown
    /// root, or escapes the root.
    fn translate(&self, root_path: &str) -> Result<PathBuf, RootError>;

    /// Erase everything on the root named by `root` (`"CACHE:"` or `"CACHE"`).
    ///
    /// # Errors
    ///
    /// Returns [`RootError`] if the root is unknown or cannot be erased.
    fn format(&self, root: &str) -> Result<(), RootError>;
}

/// Roots backed by plain directories.
///
/// A root counts as mounted when its directory exists. Formatting empties
/// the directory.
#[derive(Debug, Clone, Default)]
pub struct DirRoots {
    dirs: BTreeMap<String, PathBuf>,
}

impl DirRoots {
    /// Roots from a name-to-directory map.
    pub fn new(dirs: BTreeMap<String, PathBuf>) -> Self {
        Self { dirs }
    }

    fn split<'a>(&self, root_path: &'a str) -> Result<(&str, &PathBuf, &'a str), RootError> {
        let (name, rest) = root_path
            .split_once(':')
            .ok_or_else(|| RootError::Malformed(root_path.to_string()))?;
        let (name, dir) = self
            .dirs
            .get_key_value(name)
            .ok_or_else(|| RootError::UnknownRoot(name.to_string()))?;
        Ok((name.as_str(), dir, rest))
    }
}

impl Roots for DirRoots {
    fn ensure_mounted(&self, root_path: &str) -> Result<(), RootError> {
        if Path::new(root_path).is_absolute() {
            return Ok(());
        }
        let (name, dir, _) = self.split(root_path)?;
        if dir.is_dir() {
            Ok(())
        } else {
            Err(RootError::NotMounted {
                root: name.to_string(),
                dir: dir.clone(),
            })
        }
    }

    fn translate(&self, root_path: &str) -> Result<PathBuf, RootError> {
        if Path::new(root_path).is_absolute() {
            return Ok(PathBuf::from(root_path));
        }
        let (_, dir, rest) = self.split(root_path)?;
        let rel = Path::new(rest.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(RootError::Escapes(root_path.to_string()));
        }
        Ok(dir.join(rel))
    }

    fn format(&self, root: &str) -> Result<(), RootError> {
        let name = root.strip_suffix(':').unwrap_or(root);
        let dir = self
            .dirs
            .get(name)
            .ok_or_else(|| RootError::UnknownRoot(name.to_string()))?;
        info!("Formatting {name} ({})", dir.display());
        empty_dir(dir).map_err(|source| RootError::Format {
            root: name.to_string(),
            source,
        })
    }
}

fn empty_dir(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        return std::fs::create_dir_all(dir);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots(base: &Path) -> DirRoots {
        let mut dirs = BTreeMap::new();
        dirs.insert("CACHE".to_string(), base.join("cache"));
        dirs.insert("SDCARD".to_string(), base.join("sdcard"));
        DirRoots::new(dirs)
    }

    #[test]
    fn translates_root_paths() {
        let dir = tempfile::tempdir().unwrap();
        let roots = roots(dir.path());
        assert_eq!(
            roots.translate("CACHE:recovery/command").unwrap(),
            dir.path().join("cache/recovery/command")
        );
        assert_eq!(
            roots.translate("SDCARD:/update.zip").unwrap(),
            dir.path().join("sdcard/update.zip")
        );
        assert_eq!(roots.translate("CACHE:").unwrap(), dir.path().join("cache"));
        assert_eq!(
            roots.translate("/tmp/pkg.zip").unwrap(),
            PathBuf::from("/tmp/pkg.zip")
        );
    }

    #[test]
    fn rejects_bad_paths() {
        let dir = tempfile::tempdir().unwrap();
        let roots = roots(dir.path());
        assert!(matches!(
            roots.translate("CACHE:../etc/passwd"),
            Err(RootError::Escapes(_))
        ));
        assert!(matches!(
            roots.translate("BOGUS:x"),
            Err(RootError::UnknownRoot(_))
        ));
        assert!(matches!(
            roots.translate("relative.zip"),
            Err(RootError::Malformed(_))
        ));
    }

    #[test]
    fn mounted_means_directory_exists() {
        let dir = tempfile::tempdir().unwrap();
        let roots = roots(dir.path());
        assert!(matches!(
            roots.ensure_mounted("SDCARD:update.zip"),
            Err(RootError::NotMounted { .. })
        ));
        std::fs::create_dir(dir.path().join("sdcard")).unwrap();
        roots.ensure_mounted("SDCARD:update.zip").unwrap();
    }

    #[test]
    fn format_empties_root() {
        let dir = tempfile::tempdir().unwrap();
        let roots = roots(dir.path());
        let cache = dir.path().join("cache");
        std::fs::create_dir_all(cache.join("recovery")).unwrap();
        std::fs::write(cache.join("recovery/log"), "old").unwrap();
        std::fs::write(cache.join("junk"), "x").unwrap();

        roots.format("CACHE:").unwrap();
        assert!(cache.is_dir());
        assert_eq!(std::fs::read_dir(&cache).unwrap().count(), 0);

        assert!(matches!(roots.format("DATA:"), Err(RootError::UnknownRoot(_))));
    }
}
