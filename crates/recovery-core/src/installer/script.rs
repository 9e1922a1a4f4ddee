//! Legacy update-script path.
//!
//! Packages from before the update-binary interface carry a script instead.
//! The language itself lives behind [`ScriptEngine`]; this module only
//! feeds it the script and turns a halt into a report naming the failing
//! source line.

use recovery_schema::{PACKAGE_PREFIX, UPDATE_SCRIPT_ENTRY};
use thiserror::Error;
use tracing::info;

use super::{InstallSession, Strategy};
use crate::error::InstallError;
use crate::package::{PackageError, UpdatePackage};
use crate::reporter::Reporter;

/// The script could not be turned into a program.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Syntax error in the script.
    #[error("line {line}: {message}")]
    Syntax {
        /// 1-based line number.
        line: usize,
        /// Parser message.
        message: String,
    },

    /// No interpreter is available.
    #[error("{0}")]
    Unsupported(String),
}

/// Execution stopped on a failing command.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("script halted at line {line}")]
pub struct ScriptHalt {
    /// 1-based line of the failing command.
    pub line: usize,
}

/// What a running script may touch.
pub struct ScriptEnv<'a> {
    /// The package being installed, reachable as the `PACKAGE:` root.
    pub package: &'a mut UpdatePackage,
    /// Operator display.
    pub reporter: &'a dyn Reporter,
}

impl std::fmt::Debug for ScriptEnv<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEnv")
            .field("package", &self.package.path())
            .finish_non_exhaustive()
    }
}

impl ScriptEnv<'_> {
    /// Read a `PACKAGE:<entry>` path out of the package.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::NotFound`] if `path` is not in the
    /// `PACKAGE:` root or the entry is missing.
    pub fn read_package_file(&mut self, path: &str) -> Result<Vec<u8>, PackageError> {
        let entry = path
            .strip_prefix(PACKAGE_PREFIX)
            .ok_or_else(|| PackageError::NotFound(path.to_string()))?;
        self.package.read_entry(entry)
    }
}

/// A parsed script.
pub trait ScriptProgram {
    /// Run the script to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptHalt`] naming the line of the first failing command.
    fn execute(&self, env: &mut ScriptEnv<'_>) -> Result<(), ScriptHalt>;
}

/// Script language front end.
pub trait ScriptEngine: Send + Sync {
    /// Parse `source` into a runnable program.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError`] if the script cannot be parsed.
    fn parse(&self, source: &str) -> Result<Box<dyn ScriptProgram>, ScriptError>;
}

/// Engine for builds without a script interpreter. Every script is refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedScriptEngine;

impl ScriptEngine for UnsupportedScriptEngine {
    fn parse(&self, _: &str) -> Result<Box<dyn ScriptProgram>, ScriptError> {
        Err(ScriptError::Unsupported(
            "update scripts are not supported by this recovery; use an update binary".to_string(),
        ))
    }
}

/// Source text of 1-based `line`, or `(not found)`.
fn source_line(script: &str, line: usize) -> String {
    line.checked_sub(1)
        .and_then(|i| script.lines().nth(i))
        .unwrap_or("(not found)")
        .to_string()
}

pub(super) fn try_update_script(session: &InstallSession<'_>, package: &mut UpdatePackage) -> Strategy {
    let Some(len) = package.entry_len(UPDATE_SCRIPT_ENTRY) else {
        return Strategy::NotApplicable;
    };
    if len == 0 {
        return Strategy::Failure(InstallError::EmptyScript);
    }

    let bytes = match package.read_entry(UPDATE_SCRIPT_ENTRY) {
        Ok(bytes) => bytes,
        Err(e) => return Strategy::Failure(InstallError::ReadScript(e)),
    };
    let script = String::from_utf8_lossy(&bytes);

    let program = match session.script_engine.parse(&script) {
        Ok(program) => program,
        Err(e) => return Strategy::Failure(e.into()),
    };

    info!("Running update script ({len} bytes)");
    let mut env = ScriptEnv {
        package,
        reporter: session.reporter,
    };
    match program.execute(&mut env) {
        Ok(()) => Strategy::Success,
        Err(halt) => Strategy::Failure(InstallError::ScriptHalted {
            line: halt.line,
            text: source_line(&script, halt.line),
        }),
    }
}
