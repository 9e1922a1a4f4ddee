//! Recovery command arguments.
//!
//! The main system asks for recovery work by writing one argument per line
//! to the command file (or into the control block):
//!
//! | Argument | Meaning |
//! |---|---|
//! | `--send_intent=<text>` | write `<text>` to the intent file when done |
//! | `--update_package=<root:path>` | verify and install an update package |
//! | `--wipe_data` | erase user data (and cache) |
//! | `--wipe_cache` | erase cache only |
//! | `--previous_runs=<n>` | how many times recovery already ran for this request |
//!
//! Requests come from another system image, so a word this build does not
//! know never aborts the parse; it is set aside in
//! [`RecoveryCommand::unrecognized`] and the rest still applies.

use clap::builder::{StringValueParser, TypedValueParser};
use clap::{CommandFactory, Parser};

/// Maximum number of arguments (including the program name) accepted from
/// the control block or the command file.
pub const MAX_ARGS: usize = 100;

/// Maximum length of one argument line in the command file.
pub const MAX_ARG_LENGTH: usize = 4096;

/// Parsed recovery command.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true,
    args_override_self = true
)]
pub struct RecoveryCommand {
    /// Text to hand back to the main system through the intent file.
    #[arg(long = "send_intent", value_name = "TEXT")]
    pub send_intent: Option<String>,

    /// Package to install, in `ROOT:path` form.
    #[arg(long = "update_package", value_name = "ROOT:PATH")]
    pub update_package: Option<String>,

    /// Erase user data. Implies `wipe_cache`.
    #[arg(long = "wipe_data")]
    pub wipe_data: bool,

    /// Erase the cache partition.
    #[arg(long = "wipe_cache")]
    pub wipe_cache: bool,

    /// Earlier recovery runs for the same request, as counted by the caller.
    #[arg(
        long = "previous_runs",
        value_name = "N",
        value_parser = StringValueParser::new().map(|s| leading_count(&s))
    )]
    pub previous_runs: Option<u32>,

    /// Arguments that were not understood, in order.
    #[arg(skip)]
    pub unrecognized: Vec<String>,
}

impl RecoveryCommand {
    /// Parse arguments, excluding the program name.
    ///
    /// Accepts `--opt=value` and `--opt value`. Anything that does not name
    /// a declared option, a flag given a value, or an option missing its
    /// value ends up in [`RecoveryCommand::unrecognized`].
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Self {
        let (known, unrecognized) = Self::sort_args(args);
        let mut cmd = match Self::try_parse_from(&known) {
            Ok(cmd) => cmd,
            Err(_) => Self {
                unrecognized: known,
                ..Self::default()
            },
        };
        cmd.unrecognized.extend(unrecognized);
        if cmd.wipe_data {
            cmd.wipe_cache = true;
        }
        cmd
    }

    /// Split `args` into ones clap will accept, normalized to `--opt=value`,
    /// and the rest.
    fn sort_args<S: AsRef<str>>(args: &[S]) -> (Vec<String>, Vec<String>) {
        let declared = Self::command();
        let mut known = Vec::new();
        let mut unrecognized = Vec::new();
        let mut iter = args.iter().map(AsRef::<str>::as_ref);

        while let Some(arg) = iter.next() {
            let (name, inline) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg, None),
            };
            let option = name.strip_prefix("--").and_then(|long| {
                declared
                    .get_arguments()
                    .find(|a| a.get_long() == Some(long))
            });
            match option {
                Some(option) if option.get_action().takes_values() => {
                    match inline.or_else(|| iter.next()) {
                        Some(value) => known.push(format!("{name}={value}")),
                        None => unrecognized.push(arg.to_string()),
                    }
                }
                Some(_) if inline.is_none() => known.push(arg.to_string()),
                _ => unrecognized.push(arg.to_string()),
            }
        }

        (known, unrecognized)
    }
}

/// Leading decimal digits, 0 when there are none.
fn leading_count(value: &str) -> u32 {
    let digits = value.trim_start();
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().unwrap_or(0)
}
