//! Recovery installer core.
//!
//! Verification, dispatch and child supervision for signed update packages,
//! plus the persistent state recovery keeps between boots.

pub mod config;
pub mod error;
pub mod firmware;
pub mod installer;
pub mod io;
pub mod keys;
pub mod misc;
pub mod package;
pub mod progress;
pub mod reporter;
pub mod roots;
pub mod verifier;

pub use config::RecoveryConfig;
pub use error::InstallError;
pub use firmware::FirmwareStore;
pub use installer::InstallSession;
pub use installer::script::{ScriptEngine, UnsupportedScriptEngine};
pub use keys::{KeySet, load_keys};
pub use misc::{FileMisc, MiscStore};
pub use progress::ProgressBar;
pub use reporter::{Background, NullReporter, Reporter};
pub use roots::{DirRoots, Roots};
pub use verifier::verify_package;

pub use recovery_schema::InstallStatus;
