//! Package installation.
//!
//! `install_package` runs one attempt end to end: locate the package, load
//! the trusted keys, open and verify the archive, then hand it to the first
//! installer path that applies (update binary, else legacy script).

pub mod binary;
pub mod protocol;
pub mod script;

use recovery_schema::{InstallStatus, VERIFICATION_PROGRESS_FRACTION, VERIFICATION_PROGRESS_TIME};
use tracing::{error, info};

use crate::config::RecoveryConfig;
use crate::error::InstallError;
use crate::firmware::FirmwareStore;
use crate::keys::load_keys;
use crate::package::UpdatePackage;
use crate::reporter::{Background, Reporter};
use crate::roots::Roots;
use crate::verifier::verify_package;

use script::ScriptEngine;

/// Outcome of one installer path.
#[derive(Debug)]
pub(crate) enum Strategy {
    Success,
    Failure(InstallError),
    /// The package does not carry this path's entry.
    NotApplicable,
}

/// Everything one install attempt works with.
pub struct InstallSession<'a> {
    /// Paths and layout.
    pub config: &'a RecoveryConfig,
    /// Root mounting and translation.
    pub roots: &'a dyn Roots,
    /// Operator display.
    pub reporter: &'a dyn Reporter,
    /// Interpreter for legacy update scripts.
    pub script_engine: &'a dyn ScriptEngine,
    /// Slot for a firmware image deferred to the boot loader.
    pub firmware: &'a mut FirmwareStore,
}

impl std::fmt::Debug for InstallSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallSession")
            .field("config", self.config)
            .field("firmware", &self.firmware)
            .finish_non_exhaustive()
    }
}

impl InstallSession<'_> {
    /// Install the package at `root_path` (`ROOT:path` or absolute).
    ///
    /// Failures are logged and printed; the returned status says whether
    /// the package was applied, failed while applying, or was rejected.
    pub fn install_package(&mut self, root_path: &str) -> InstallStatus {
        self.reporter.set_background(Background::Installing);
        self.reporter.print("Preparing to install...");
        self.reporter.show_indeterminate_progress();
        info!("Update location: {root_path}");

        match self.try_install(root_path) {
            Ok(()) => {
                info!("Install of {root_path} complete");
                InstallStatus::Success
            }
            Err(err) => {
                let status = err.status();
                error!("Install of {root_path} failed ({status}): {err}");
                self.reporter.print(&err.to_string());
                status
            }
        }
    }

    fn try_install(&mut self, root_path: &str) -> Result<(), InstallError> {
        self.roots
            .ensure_mounted(root_path)
            .map_err(|source| InstallError::Mount {
                path: root_path.to_string(),
                source,
            })?;

        self.reporter.print("Opening update package...");
        let path = self
            .roots
            .translate(root_path)
            .map_err(|source| InstallError::Translate {
                path: root_path.to_string(),
                source,
            })?;

        let keys = load_keys(&self.config.keys)?;
        info!("{} key(s) loaded from {}", keys.len(), self.config.keys.display());

        self.reporter.print("Verifying update package...");
        self.reporter
            .show_progress(VERIFICATION_PROGRESS_FRACTION, VERIFICATION_PROGRESS_TIME);

        let mut package = UpdatePackage::open(&path).map_err(InstallError::Open)?;
        let verified = verify_package(&path, &keys, self.reporter);
        drop(keys);
        if let Err(e) = verified {
            package.close();
            return Err(e.into());
        }

        let result = self.handle_update_package(&mut package);
        package.close();
        result
    }

    /// Run the installer carried by a verified package.
    fn handle_update_package(&mut self, package: &mut UpdatePackage) -> Result<(), InstallError> {
        self.reporter.print("Installing update...");

        let outcome = match binary::try_update_binary(self, package) {
            Strategy::NotApplicable => {
                info!("No update binary in package, trying update script");
                script::try_update_script(self, package)
            }
            other => other,
        };

        match outcome {
            Strategy::Success => Ok(()),
            Strategy::Failure(err) => Err(err),
            Strategy::NotApplicable => Err(InstallError::NoInstaller),
        }
    }
}
