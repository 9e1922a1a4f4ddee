//! Update binary path.
//!
//! The package's installer executable is copied out to the scratch
//! directory and run as
//!
//! ```text
//! update_binary <api-version> <pipe-fd> <package-path>
//! ```
//!
//! The child reports through the write end of a pipe (see
//! [`super::protocol`]). The parent reads until the child closes it, then
//! reaps the child. A firmware request is only honoured after a clean exit.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

use recovery_schema::{RECOVERY_API_VERSION, UPDATE_BINARY_ENTRY};
use tracing::{debug, info, warn};

use super::protocol::ProtocolHandler;
use super::{InstallSession, Strategy};
use crate::error::InstallError;
use crate::package::UpdatePackage;

const SPAWN_ATTEMPTS: u32 = 5;
const SPAWN_BACKOFF: Duration = Duration::from_millis(50);

/// Size of the parent's line buffer. A longer line is handled in pieces.
const LINE_BUFFER: u64 = 1024;

pub(super) fn try_update_binary(session: &mut InstallSession<'_>, package: &mut UpdatePackage) -> Strategy {
    if !package.contains(UPDATE_BINARY_ENTRY) {
        return Strategy::NotApplicable;
    }

    let binary = session.config.update_binary_path();
    if let Err(source) = extract_binary(package, &binary) {
        return Strategy::Failure(InstallError::ExtractBinary {
            path: binary,
            source,
        });
    }

    let (reader, writer) = match io::pipe() {
        Ok(pipe) => pipe,
        Err(e) => return Strategy::Failure(InstallError::Spawn(e)),
    };
    let mut cmd = child_command(&binary, writer.as_raw_fd(), package.path());

    info!("Running {} {}", binary.display(), package.path().display());
    let mut child = match spawn(&mut cmd) {
        Ok(child) => child,
        Err(e) => return Strategy::Failure(InstallError::Spawn(e)),
    };
    // EOF on the read end only arrives once every write end is closed.
    drop(writer);

    let mut handler = ProtocolHandler::new(session.reporter);
    let drained = drain(reader, &mut handler);

    let status = match child.wait() {
        Ok(status) => status,
        Err(e) => return Strategy::Failure(InstallError::Child(e)),
    };
    if let Err(e) = drained {
        return Strategy::Failure(InstallError::Child(e));
    }
    if !status.success() {
        warn!("Update binary exited with {status}");
        return Strategy::Failure(InstallError::BinaryFailed(status.to_string()));
    }
    debug!("Update binary exited cleanly");

    let Some(request) = handler.into_firmware() else {
        return Strategy::Success;
    };
    let staged = request
        .load(package)
        .and_then(|image| session.firmware.remember(&image.kind, image.data).map(|_| ()));
    match staged {
        Ok(()) => Strategy::Success,
        Err(e) => Strategy::Failure(e.into()),
    }
}

/// Command line for the child. The pipe's write end is created
/// close-on-exec; the child clears that flag on its own copy.
#[allow(unsafe_code)]
fn child_command(binary: &Path, pipe_fd: RawFd, package: &Path) -> Command {
    let mut cmd = Command::new(binary);
    cmd.arg(RECOVERY_API_VERSION.to_string())
        .arg(pipe_fd.to_string())
        .arg(package);

    // SAFETY: The hook runs between fork and exec and only calls fcntl,
    // which is async-signal-safe.
    unsafe {
        cmd.pre_exec(move || {
            if libc::fcntl(pipe_fd, libc::F_SETFD, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
    cmd
}

fn extract_binary(package: &mut UpdatePackage, binary: &Path) -> io::Result<()> {
    match fs::remove_file(binary) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    if let Some(parent) = binary.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o755)
        .open(binary)?;
    package
        .extract_entry(UPDATE_BINARY_ENTRY, &mut file)
        .map_err(|e| io::Error::other(e.to_string()))?;
    file.sync_all()
}

/// Spawn, retrying while another process briefly holds the freshly written
/// binary open for writing.
fn spawn(cmd: &mut Command) -> io::Result<Child> {
    let mut attempt = 1;
    loop {
        match cmd.spawn() {
            Err(e) if e.raw_os_error() == Some(libc::ETXTBSY) && attempt < SPAWN_ATTEMPTS => {
                debug!("update binary busy, retrying (attempt {attempt})");
                attempt += 1;
                thread::sleep(SPAWN_BACKOFF);
            }
            result => return result,
        }
    }
}

fn drain(reader: impl Read, handler: &mut ProtocolHandler<'_>) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if (&mut reader).take(LINE_BUFFER - 1).read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        handler.handle_line(&String::from_utf8_lossy(&buf));
    }
}
