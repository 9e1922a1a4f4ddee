//! Recovery session context.
//!
//! Everything one recovery run works with, passed explicitly instead of
//! living in globals: configuration, root and control-block access, the
//! display, the operator, the firmware slot and how much of the temporary
//! log has already been copied out.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use recovery_core::roots::RootError;
use recovery_core::{
    Background, DirRoots, FileMisc, FirmwareStore, InstallSession, InstallStatus, MiscStore,
    RecoveryConfig, Reporter, Roots, ScriptEngine, UnsupportedScriptEngine,
};

use crate::ops::RecoveryError;
use crate::ui::Operator;

pub struct RecoveryContext {
    pub config: RecoveryConfig,
    pub roots: Box<dyn Roots>,
    pub misc: Box<dyn MiscStore>,
    pub reporter: Arc<dyn Reporter>,
    pub operator: Box<dyn Operator>,
    pub script_engine: Box<dyn ScriptEngine>,
    pub firmware: FirmwareStore,
    /// Bytes of the temporary log already appended to the persistent log.
    pub(crate) log_offset: u64,
}

impl fmt::Debug for RecoveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryContext")
            .field("config", &self.config)
            .field("firmware", &self.firmware)
            .field("log_offset", &self.log_offset)
            .finish_non_exhaustive()
    }
}

impl RecoveryContext {
    /// Context backed by plain directories and a file control block, as
    /// laid out by `config`.
    pub fn new(
        config: RecoveryConfig,
        reporter: Arc<dyn Reporter>,
        operator: Box<dyn Operator>,
    ) -> Result<Self, RecoveryError> {
        let roots = DirRoots::new(config.roots.clone());
        let firmware_dir =
            roots
                .translate(&config.firmware_dir)
                .map_err(|source| RecoveryError::Translate {
                    path: config.firmware_dir.clone(),
                    source,
                })?;
        Ok(Self {
            misc: Box::new(FileMisc::new(config.misc.clone())),
            roots: Box::new(roots),
            reporter,
            operator,
            script_engine: Box::new(UnsupportedScriptEngine),
            firmware: FirmwareStore::new(firmware_dir),
            log_offset: 0,
            config,
        })
    }

    /// Skip the first `offset` bytes of the temporary log, written by an
    /// earlier session, when copying it out.
    pub fn resume_log_at(&mut self, offset: u64) {
        self.log_offset = offset;
    }

    /// Mount the root holding `root_path` and return its host path.
    pub fn root_file(&self, root_path: &str) -> Result<PathBuf, RecoveryError> {
        self.roots
            .ensure_mounted(root_path)
            .map_err(|source| RecoveryError::Mount {
                path: root_path.to_string(),
                source,
            })?;
        self.roots
            .translate(root_path)
            .map_err(|source| RecoveryError::Translate {
                path: root_path.to_string(),
                source,
            })
    }

    /// Verify and install the package at `root_path`.
    pub fn install(&mut self, root_path: &str) -> InstallStatus {
        let mut session = InstallSession {
            config: &self.config,
            roots: self.roots.as_ref(),
            reporter: self.reporter.as_ref(),
            script_engine: self.script_engine.as_ref(),
            firmware: &mut self.firmware,
        };
        session.install_package(root_path)
    }

    /// Erase a root (`"DATA:"`, `"CACHE:"`) with the busy display up.
    pub fn erase_root(&self, root: &str) -> Result<(), RootError> {
        self.reporter.set_background(Background::Installing);
        self.reporter.show_indeterminate_progress();
        self.reporter.print(&format!("Formatting {root}..."));
        self.roots.format(root)
    }
}
