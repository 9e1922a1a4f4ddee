//! Shared types and on-disk formats for the recovery installer.
//!
//! Everything in here is a contract with something outside this process:
//! the boot loader (control block layout), the main system (command file
//! arguments) or update packages built by the signing tools (archive entry
//! names, the child protocol version).

pub mod command;
pub mod message;
pub mod status;

// Re-exports
pub use command::RecoveryCommand;
pub use message::{BootloaderMessage, MessageError};
pub use status::InstallStatus;

/// Version of the update-binary interface passed as the child's first
/// argument. Version 2 added `PACKAGE:` firmware targets.
pub const RECOVERY_API_VERSION: u32 = 2;

/// Conventional location of the installer executable inside a package.
pub const UPDATE_BINARY_ENTRY: &str = "META-INF/com/google/android/update-binary";

/// Conventional location of the legacy update script inside a package.
pub const UPDATE_SCRIPT_ENTRY: &str = "META-INF/com/google/android/update-script";

/// Prefix marking a firmware target that lives inside the open package.
pub const PACKAGE_PREFIX: &str = "PACKAGE:";

/// Share of the progress bar given to signature verification.
pub const VERIFICATION_PROGRESS_FRACTION: f32 = 0.25;

/// Expected duration of signature verification, in seconds.
pub const VERIFICATION_PROGRESS_TIME: u32 = 60;
