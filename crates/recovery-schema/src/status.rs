//! Install outcome.

/// Terminal outcome of one install attempt.
///
/// `Corrupt` means the package is not installable as-is (unreadable archive,
/// bad signature, no recognised installer). `Error` means it was recognised
/// but something failed while applying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallStatus {
    /// The package was applied.
    Success,
    /// The package was recognised but applying it failed.
    Error,
    /// The package could not be recognised or verified.
    Corrupt,
}

impl InstallStatus {
    /// Whether the attempt succeeded.
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl std::fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Corrupt => "corrupt",
        };
        f.write_str(s)
    }
}
