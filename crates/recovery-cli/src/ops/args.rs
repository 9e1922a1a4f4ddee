//! Where recovery's arguments come from.
//!
//! In decreasing precedence:
//!
//! 1. the actual command line,
//! 2. the bootloader control block (one per line, after `recovery`),
//! 3. the command file (one per line).
//!
//! Whatever is found is written straight back into the control block, so a
//! reboot at any later point restarts recovery with the same request until
//! [`finish_recovery`](crate::ops::finish::finish_recovery) clears it.

use recovery_schema::command::{MAX_ARG_LENGTH, MAX_ARGS};
use recovery_schema::message::{BOOT_RECOVERY, BootloaderMessage};
use tracing::{error, info, warn};

use crate::ops::{RecoveryContext, RecoveryError};

/// Resolve the argument vector for this run. `argv[0]` is the program name
/// and is kept as-is.
pub fn resolve_args(ctx: &RecoveryContext, mut argv: Vec<String>) -> Vec<String> {
    let program = argv
        .first()
        .cloned()
        .unwrap_or_else(|| crate::PROGRAM_NAME.to_string());

    // An unreadable block behaves like an empty one.
    let mut boot = ctx.misc.read().unwrap_or_else(|e| {
        error!("{e}");
        BootloaderMessage::default()
    });
    if !boot.command.is_empty() {
        info!("Boot command: {}", boot.command);
    }
    if !boot.status.is_empty() {
        info!("Boot status: {}", boot.status);
    }

    if argv.len() <= 1 {
        if let Some(args) = boot.recovery_args() {
            argv = with_program(&program, args);
            info!("Got arguments from boot message");
        } else if !boot.recovery.is_empty() {
            let head: String = boot.recovery.chars().take(20).collect();
            error!("Bad boot message\n\"{head}\"");
        }
    }

    if argv.len() <= 1 {
        match read_command_file(ctx) {
            Ok(Some(args)) => {
                argv = with_program(&program, args);
                info!("Got arguments from {}", ctx.config.command_file);
            }
            Ok(None) => {}
            Err(e) => warn!("{e}"),
        }
    }

    boot.command = BOOT_RECOVERY.to_string();
    boot.recovery = BootloaderMessage::boot_recovery(&argv[1..]).recovery;
    if let Err(e) = ctx.misc.write(&boot) {
        error!("{e}");
    }

    argv
}

fn with_program(program: &str, args: Vec<String>) -> Vec<String> {
    std::iter::once(program.to_string())
        .chain(args.into_iter().take(MAX_ARGS - 1))
        .collect()
}

/// Arguments from the command file, or `None` if there is no such file.
fn read_command_file(ctx: &RecoveryContext) -> Result<Option<Vec<String>>, RecoveryError> {
    let path = ctx.root_file(&ctx.config.command_file)?;
    let text = match std::fs::read(&path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RecoveryError::io(path, e)),
    };
    Ok(Some(parse_command_file(&text)))
}

/// One argument per line; line endings stripped, blank lines skipped,
/// over-long lines cut to the line buffer size.
fn parse_command_file(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches(['\r', '\n']))
        .filter(|line| !line.is_empty())
        .map(|line| truncate(line, MAX_ARG_LENGTH - 1).to_string())
        .take(MAX_ARGS - 1)
        .collect()
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::flow::tests::{Scripted, context};

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("recovery")
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect()
    }

    fn write_command_file(ctx: &RecoveryContext, text: &str) {
        let path = ctx.roots.translate(&ctx.config.command_file).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn command_file_lines() {
        assert_eq!(
            parse_command_file("--wipe_cache\r\n\n--send_intent=hi\n"),
            vec!["--wipe_cache", "--send_intent=hi"]
        );
        let many = "--wipe_cache\n".repeat(150);
        assert_eq!(parse_command_file(&many).len(), MAX_ARGS - 1);
        let long = "x".repeat(MAX_ARG_LENGTH + 10);
        assert_eq!(parse_command_file(&long)[0].len(), MAX_ARG_LENGTH - 1);
    }

    #[test]
    fn command_line_wins() {
        let (_dir, ctx) = context(Scripted::default());
        ctx.misc
            .write(&BootloaderMessage::boot_recovery(&["--wipe_data"]))
            .unwrap();
        write_command_file(&ctx, "--update_package=CACHE:a.zip\n");

        let args = resolve_args(&ctx, argv(&["--wipe_cache"]));
        assert_eq!(args, argv(&["--wipe_cache"]));
        assert_eq!(
            ctx.misc.read().unwrap().recovery,
            "recovery\n--wipe_cache\n"
        );
    }

    #[test]
    fn control_block_beats_command_file() {
        let (_dir, ctx) = context(Scripted::default());
        let mut boot = BootloaderMessage::boot_recovery(&["--wipe_data"]);
        boot.status = "OKAY".to_string();
        ctx.misc.write(&boot).unwrap();
        write_command_file(&ctx, "--wipe_cache\n");

        assert_eq!(resolve_args(&ctx, argv(&[])), argv(&["--wipe_data"]));
        let written = ctx.misc.read().unwrap();
        assert_eq!(written.command, BOOT_RECOVERY);
        assert_eq!(written.status, "OKAY");
    }

    #[test]
    fn command_file_is_persisted_to_control_block() {
        let (_dir, ctx) = context(Scripted::default());
        write_command_file(&ctx, "--update_package=CACHE:ota.zip\n--send_intent=done\n");

        let args = resolve_args(&ctx, argv(&[]));
        assert_eq!(
            args,
            argv(&["--update_package=CACHE:ota.zip", "--send_intent=done"])
        );
        let written = ctx.misc.read().unwrap();
        assert_eq!(written.command, BOOT_RECOVERY);
        assert_eq!(
            written.recovery_args().unwrap(),
            vec!["--update_package=CACHE:ota.zip", "--send_intent=done"]
        );
    }

    #[test]
    fn garbage_block_falls_through() {
        let (_dir, ctx) = context(Scripted::default());
        let boot = BootloaderMessage {
            recovery: "not-recovery\n--wipe_data\n".to_string(),
            ..BootloaderMessage::default()
        };
        ctx.misc.write(&boot).unwrap();

        assert_eq!(resolve_args(&ctx, argv(&[])), argv(&[]));
        assert_eq!(ctx.misc.read().unwrap().recovery, "recovery\n");
    }
}
