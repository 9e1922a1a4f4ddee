//! IO helpers - side effects on raw devices and pipes

pub mod exact;

pub use exact::{ShortTransfer, ensure_read, ensure_write};
