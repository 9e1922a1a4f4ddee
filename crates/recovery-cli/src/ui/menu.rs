//! Operator menu.
//!
//! [`Operator`] is whoever sits in front of the device. The console
//! implementation reads choices from a line-oriented input; when that input
//! is not an interactive terminal nobody can answer, so every question gets
//! the safe answer (reboot, don't wipe).

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

/// Actions offered by the main menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    /// Leave recovery and boot the main system.
    Reboot,
    /// Install the package at the configured sdcard location.
    ApplySdcard,
    /// Erase user data and cache.
    WipeData,
    /// Erase cache only.
    WipeCache,
}

impl MenuItem {
    /// Main menu, in display order.
    pub const MAIN: [MenuItem; 4] = [
        MenuItem::Reboot,
        MenuItem::ApplySdcard,
        MenuItem::WipeData,
        MenuItem::WipeCache,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MenuItem::Reboot => "reboot system now",
            MenuItem::ApplySdcard => "apply sdcard:update.zip",
            MenuItem::WipeData => "wipe data/factory reset",
            MenuItem::WipeCache => "wipe cache partition",
        }
    }
}

/// Whoever answers recovery's questions.
pub trait Operator: Send + Sync {
    /// Pick one of `items`. `headers` are shown above the list.
    fn select(&self, headers: &[String], items: &[MenuItem]) -> MenuItem;

    /// Ask a yes/no question. Anything but an explicit yes is a no.
    fn confirm(&self, headers: &[String]) -> bool;

    /// Device-specific cleanup run before the data root is erased.
    fn wipe_device_data(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Menu on a line-oriented console.
pub struct ConsoleOperator {
    input: Option<Mutex<Box<dyn BufRead + Send>>>,
}

impl std::fmt::Debug for ConsoleOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleOperator")
            .field("interactive", &self.input.is_some())
            .finish()
    }
}

impl ConsoleOperator {
    /// Operator on standard input; non-interactive unless stdin is a TTY.
    pub fn stdin() -> Self {
        let stdin = io::stdin();
        if stdin.is_terminal() {
            Self::from_reader(Box::new(io::BufReader::new(stdin)))
        } else {
            debug!("stdin is not a terminal, menu choices default to reboot");
            Self { input: None }
        }
    }

    /// Operator answering from `input`, one answer per line.
    pub fn from_reader(input: Box<dyn BufRead + Send>) -> Self {
        Self {
            input: Some(Mutex::new(input)),
        }
    }

    /// Next trimmed answer, or `None` at end of input.
    fn answer(&self, prompt: &str) -> Option<String> {
        let input = self.input.as_ref()?;
        let mut input = input.lock().unwrap_or_else(PoisonError::into_inner);
        print!("{prompt}");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(e) => {
                warn!("Can't read operator input: {e}");
                None
            }
        }
    }
}

fn print_headers(headers: &[String]) {
    for header in headers {
        println!("{header}");
    }
}

impl Operator for ConsoleOperator {
    fn select(&self, headers: &[String], items: &[MenuItem]) -> MenuItem {
        print_headers(headers);
        for (i, item) in items.iter().enumerate() {
            println!("  {}. {}", i + 1, item.label());
        }
        loop {
            let Some(answer) = self.answer("> ") else {
                return MenuItem::Reboot;
            };
            match answer.parse::<usize>() {
                Ok(n) if (1..=items.len()).contains(&n) => return items[n - 1],
                _ => println!("Choose 1-{}", items.len()),
            }
        }
    }

    fn confirm(&self, headers: &[String]) -> bool {
        print_headers(headers);
        self.answer("Type 'yes' to confirm: ")
            .is_some_and(|answer| answer.eq_ignore_ascii_case("yes"))
    }
}
