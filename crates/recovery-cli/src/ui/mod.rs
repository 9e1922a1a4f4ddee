//! Operator display and input.

pub mod console;
pub mod menu;

pub use console::ConsoleReporter;
pub use menu::{ConsoleOperator, MenuItem, Operator};
