//! Main recovery flow.
//!
//! ```text
//! resolve_args --> run command --(failed or text visible)--> menu loop
//!                      |                                        |
//!                      +------------------+---------------------+
//!                                         v
//!                firmware pending? --yes--> hand off to boot loader
//!                      | no
//!                      v
//!                finish_recovery --> reboot into main system
//! ```

use recovery_core::{Background, InstallStatus};
use recovery_schema::RECOVERY_API_VERSION;
use recovery_schema::command::RecoveryCommand;
use recovery_schema::message::BootloaderMessage;
use tracing::{error, info};

use crate::ops::RecoveryContext;
use crate::ops::args::resolve_args;
use crate::ops::finish::finish_recovery;
use crate::ui::MenuItem;

/// What the device should boot into after recovery exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootTarget {
    /// The main system; the control block is clear.
    System,
    /// The boot loader, to flash a staged firmware image of this kind.
    Firmware(String),
}

/// Result of a recovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Outcome of the requested command. A run without a command is an
    /// error.
    pub status: InstallStatus,
    pub reboot: RebootTarget,
}

impl RunOutcome {
    /// Process exit status: 0 when the command succeeded.
    pub fn exit_code(&self) -> u8 {
        u8::from(!self.status.is_success())
    }
}

/// Run recovery with `argv` (program name first).
pub fn run(ctx: &mut RecoveryContext, argv: Vec<String>) -> RunOutcome {
    let argv = resolve_args(ctx, argv);
    let command = RecoveryCommand::from_args(&argv[1..]);
    for arg in &command.unrecognized {
        error!("Invalid command argument: {arg}");
    }
    if let Some(runs) = command.previous_runs {
        info!("Previous runs: {runs}");
    }
    let quoted: Vec<String> = argv.iter().map(|a| format!("\"{a}\"")).collect();
    info!("Command: {}", quoted.join(" "));

    let status = run_command(ctx, &command);

    if !status.is_success() {
        ctx.reporter.set_background(Background::Error);
    }
    if !status.is_success() || ctx.reporter.text_visible() {
        prompt_and_wait(ctx);
    }

    let send_intent = command.send_intent.as_deref();
    if let Some(kind) = maybe_install_firmware_update(ctx, send_intent) {
        return RunOutcome {
            status,
            reboot: RebootTarget::Firmware(kind),
        };
    }

    finish_recovery(ctx, send_intent);
    ctx.reporter.print("Rebooting...");
    RunOutcome {
        status,
        reboot: RebootTarget::System,
    }
}

fn run_command(ctx: &mut RecoveryContext, command: &RecoveryCommand) -> InstallStatus {
    if let Some(package) = &command.update_package {
        let status = ctx.install(package);
        if !status.is_success() {
            ctx.reporter.print("Installation aborted.");
        }
        status
    } else if command.wipe_data {
        let mut status = InstallStatus::Success;
        if let Err(e) = ctx.operator.wipe_device_data() {
            error!("Device data wipe failed: {e}");
            status = InstallStatus::Error;
        }
        for root in ["DATA:", "CACHE:"] {
            if let Err(e) = ctx.erase_root(root) {
                error!("{e}");
                status = InstallStatus::Error;
            }
        }
        if !status.is_success() {
            ctx.reporter.print("Data wipe failed.");
        }
        status
    } else if command.wipe_cache {
        match ctx.erase_root("CACHE:") {
            Ok(()) => InstallStatus::Success,
            Err(e) => {
                error!("{e}");
                ctx.reporter.print("Cache wipe failed.");
                InstallStatus::Error
            }
        }
    } else {
        info!("No command specified");
        InstallStatus::Error
    }
}

fn title(headers: &[&str]) -> Vec<String> {
    [
        format!("Android system recovery <{RECOVERY_API_VERSION}e>"),
        String::new(),
    ]
    .into_iter()
    .chain(headers.iter().map(|h| (*h).to_string()))
    .collect()
}

/// Operator menu. Returns when the operator picks reboot, or after an
/// action completes while the text log is hidden.
pub fn prompt_and_wait(ctx: &mut RecoveryContext) {
    let headers = title(&["Use the menu to select an item.", ""]);
    loop {
        finish_recovery(ctx, None);
        ctx.reporter.reset_progress();

        let item = ctx.operator.select(&headers, &MenuItem::MAIN);
        info!("Menu: {}", item.label());
        match item {
            MenuItem::Reboot => return,
            MenuItem::WipeData => {
                let visible = ctx.reporter.text_visible();
                wipe_data(ctx, visible);
                if !visible {
                    return;
                }
            }
            MenuItem::WipeCache => {
                ctx.reporter.print("\n-- Wiping cache...");
                if let Err(e) = ctx.erase_root("CACHE:") {
                    error!("{e}");
                }
                ctx.reporter.print("Cache wipe complete.");
                if !ctx.reporter.text_visible() {
                    return;
                }
            }
            MenuItem::ApplySdcard => {
                if install_sdcard(ctx).is_success() && !ctx.reporter.text_visible() {
                    return;
                }
            }
        }
    }
}

fn wipe_data(ctx: &RecoveryContext, confirm: bool) {
    if confirm {
        let question = title(&["Confirm wipe of all user data?", "  THIS CAN NOT BE UNDONE.", ""]);
        if !ctx.operator.confirm(&question) {
            return;
        }
    }

    ctx.reporter.print("\n-- Wiping data...");
    if let Err(e) = ctx.operator.wipe_device_data() {
        error!("Device data wipe failed: {e}");
    }
    for root in ["DATA:", "CACHE:"] {
        if let Err(e) = ctx.erase_root(root) {
            error!("{e}");
        }
    }
    ctx.reporter.print("Data wipe complete.");
}

fn install_sdcard(ctx: &mut RecoveryContext) -> InstallStatus {
    // A reboot mid-install comes back to recovery, without repeating it.
    if let Err(e) = ctx.misc.write(&BootloaderMessage::boot_recovery::<&str>(&[])) {
        error!("{e}");
    }

    ctx.reporter.print("\n-- Install from sdcard...");
    let package = ctx.config.sdcard_package.clone();
    let status = ctx.install(&package);
    if !status.is_success() {
        ctx.reporter.set_background(Background::Error);
        ctx.reporter.print("Installation aborted.");
    } else if ctx.reporter.text_visible() {
        if ctx.firmware.is_pending() {
            ctx.reporter.print("\nReboot via menu to complete installation.");
        } else {
            ctx.reporter.print("\nInstall from sdcard complete.");
        }
    }
    status
}

/// Hand a staged firmware image to the boot loader.
///
/// The control block is first set to come back to recovery and wipe the
/// cache (where the image lives), then switched to `update-<kind>` with the
/// same arguments. The block is deliberately left set: the boot loader
/// flashes the image and reboots into recovery, which wipes the cache and
/// finishes normally. Returns the firmware kind when the hand-off is armed.
pub fn maybe_install_firmware_update(
    ctx: &RecoveryContext,
    send_intent: Option<&str>,
) -> Option<String> {
    let kind = ctx.firmware.pending()?.kind.clone();

    let mut args = vec!["--wipe_cache".to_string()];
    if let Some(intent) = send_intent {
        args.push(format!("--send_intent={intent}"));
    }
    let mut boot = BootloaderMessage::boot_recovery(&args);
    if let Err(e) = ctx.misc.write(&boot) {
        error!("Can't set boot message for firmware update: {e}");
        return None;
    }

    boot.command = format!("update-{kind}");
    if let Err(e) = ctx.misc.write(&boot) {
        error!("Can't set boot message for firmware update: {e}");
        return None;
    }

    info!("Firmware update ({kind}) armed");
    ctx.reporter.print(&format!("Rebooting to install {kind} firmware..."));
    Some(kind)
}
