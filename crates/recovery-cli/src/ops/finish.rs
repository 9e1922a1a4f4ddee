//! Leaving recovery.
//!
//! [`finish_recovery`] prepares for a normal boot of the main system and is
//! safe to call any number of times: the menu loop calls it on every pass.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom};

use recovery_schema::message::BootloaderMessage;
use tracing::{debug, error, warn};

use crate::ops::{RecoveryContext, RecoveryError};

/// Hand control back to the main system.
///
/// Writes `send_intent` to the intent file, appends whatever the temporary
/// log gained since the last call to the persistent log, clears the control
/// block and removes the command file. Failures are logged; nothing here
/// stops the reboot.
pub fn finish_recovery(ctx: &mut RecoveryContext, send_intent: Option<&str>) {
    if let Some(intent) = send_intent
        && let Err(e) = write_intent(ctx, intent)
    {
        error!("{e}");
    }

    if let Err(e) = copy_log(ctx) {
        error!("{e}");
    }

    if let Err(e) = ctx.misc.write(&BootloaderMessage::default()) {
        error!("{e}");
    }

    if let Err(e) = remove_command_file(ctx) {
        warn!("Can't unlink {}: {e}", ctx.config.command_file);
    }

    sync();
}

fn write_intent(ctx: &RecoveryContext, intent: &str) -> Result<(), RecoveryError> {
    let path = ctx.root_file(&ctx.config.intent_file)?;
    create_parent(&path)?;
    fs::write(&path, intent).map_err(|e| RecoveryError::io(&path, e))
}

/// Append the temporary log from the saved offset, then advance it.
fn copy_log(ctx: &mut RecoveryContext) -> Result<(), RecoveryError> {
    let path = ctx.root_file(&ctx.config.log_file)?;
    create_parent(&path)?;
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| RecoveryError::io(&path, e))?;

    let tmp_path = ctx.config.temporary_log();
    let mut tmp = File::open(&tmp_path).map_err(|e| RecoveryError::io(&tmp_path, e))?;
    tmp.seek(SeekFrom::Start(ctx.log_offset))
        .map_err(|e| RecoveryError::io(&tmp_path, e))?;
    let copied = io::copy(&mut tmp, &mut log).map_err(|e| RecoveryError::io(&path, e))?;
    ctx.log_offset += copied;
    debug!("Appended {copied} log bytes to {}", path.display());

    log.sync_all().map_err(|e| RecoveryError::io(&path, e))
}

fn remove_command_file(ctx: &RecoveryContext) -> Result<(), RecoveryError> {
    let path = ctx.root_file(&ctx.config.command_file)?;
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RecoveryError::io(path, e)),
    }
}

fn create_parent(path: &std::path::Path) -> Result<(), RecoveryError> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|e| RecoveryError::io(parent, e)),
        None => Ok(()),
    }
}

#[allow(unsafe_code)]
fn sync() {
    // SAFETY: sync(2) takes no arguments and cannot fail.
    unsafe { libc::sync() };
}
