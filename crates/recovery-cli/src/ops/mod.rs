//! Recovery operations: argument resolution, the main flow and cleanup.

pub mod args;
pub mod context;
pub mod error;
pub mod finish;
pub mod flow;

pub use context::RecoveryContext;
pub use error::RecoveryError;
pub use flow::{RebootTarget, RunOutcome, run};
