//! Recovery configuration
//!
//! Every path recovery touches lives here. On a device the defaults apply;
//! tests and host runs point `RECOVERY_ROOT` at a scratch directory, or
//! `RECOVERY_CONFIG` at a TOML file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a TOML configuration file.
pub const CONFIG_ENV: &str = "RECOVERY_CONFIG";

/// Environment variable naming a directory that stands in for `/`.
pub const ROOT_ENV: &str = "RECOVERY_ROOT";

/// Errors that can occur when loading the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Can't read {}: {source}", path.display())]
    Read {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML content could not be deserialized.
    #[error("Parse error in {}: {source}", path.display())]
    Parse {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// Paths and root layout used by recovery.
///
/// Fields written as `ROOT:path` are resolved through [`crate::roots`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Trusted public key file.
    pub keys: PathBuf,
    /// Scratch directory for the update binary and the temporary log.
    pub tmp_dir: PathBuf,
    /// Bootloader control block (block device or plain file).
    pub misc: PathBuf,
    /// Root name (`CACHE`, `DATA`, ...) to backing directory.
    pub roots: BTreeMap<String, PathBuf>,
    /// Argument file written by the main system.
    pub command_file: String,
    /// Where `--send_intent` text is handed back.
    pub intent_file: String,
    /// Persistent log, appended to on every finish.
    pub log_file: String,
    /// Package applied from the operator menu.
    pub sdcard_package: String,
    /// Directory holding a firmware image deferred to the boot loader.
    pub firmware_dir: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self::with_base(Path::new("/"))
    }
}

impl RecoveryConfig {
    /// Lay every path out under `base` instead of `/`.
    pub fn under(base: &Path) -> Self {
        Self::with_base(base)
    }

    fn with_base(base: &Path) -> Self {
        let tmp_dir = base.join("tmp");
        let roots = [
            ("CACHE", base.join("cache")),
            ("DATA", base.join("data")),
            ("SDCARD", base.join("sdcard")),
            ("SYSTEM", base.join("system")),
            ("TMP", tmp_dir.clone()),
        ]
        .into_iter()
        .map(|(name, dir)| (name.to_string(), dir))
        .collect();

        let misc = if base == Path::new("/") {
            PathBuf::from("/dev/block/misc")
        } else {
            base.join("misc")
        };

        Self {
            keys: base.join("res").join("keys"),
            tmp_dir,
            misc,
            roots,
            command_file: "CACHE:recovery/command".to_string(),
            intent_file: "CACHE:recovery/intent".to_string(),
            log_file: "CACHE:recovery/log".to_string(),
            sdcard_package: "SDCARD:update.zip".to_string(),
            firmware_dir: "CACHE:recovery/firmware".to_string(),
        }
    }

    /// Read a TOML configuration file. Missing fields take device defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the configuration for this run.
    ///
    /// An explicit file wins, then [`CONFIG_ENV`], then [`ROOT_ENV`], then
    /// the device defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a named configuration file is unusable.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }
        if let Some(base) = std::env::var_os(ROOT_ENV) {
            return Ok(Self::under(Path::new(&base)));
        }
        Ok(Self::default())
    }

    /// Log written during this session, before it is copied to `log_file`.
    pub fn temporary_log(&self) -> PathBuf {
        self.tmp_dir.join("recovery.log")
    }

    /// Where the update binary is extracted before it runs.
    pub fn update_binary_path(&self) -> PathBuf {
        self.tmp_dir.join("update_binary")
    }
}
