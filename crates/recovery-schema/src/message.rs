//! Bootloader control block ("misc" partition) layout.
//!
//! ```text
//! offset  size  field
//!      0    32  command   e.g. "boot-recovery", "update-radio"
//!     32    32  status    written back by the boot loader
//!     64  1024  recovery  "recovery\n<arg>\n<arg>\n..."
//! ```
//!
//! Fields are NUL padded. A field whose first byte is `0x00` or `0xFF`
//! (erased flash) is empty. Writes truncate like `strlcpy`, always leaving
//! room for the terminating NUL.

use thiserror::Error;

/// Size of the `command` field.
pub const COMMAND_LEN: usize = 32;
/// Size of the `status` field.
pub const STATUS_LEN: usize = 32;
/// Size of the `recovery` field.
pub const RECOVERY_LEN: usize = 1024;
/// Total size of the serialized control block.
pub const MESSAGE_SIZE: usize = COMMAND_LEN + STATUS_LEN + RECOVERY_LEN;

/// Command telling the boot loader to enter recovery again.
pub const BOOT_RECOVERY: &str = "boot-recovery";
/// First line of the `recovery` field when it carries arguments.
pub const RECOVERY_MARKER: &str = "recovery";

/// Errors decoding a control block.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MessageError {
    /// The buffer is smaller than [`MESSAGE_SIZE`].
    #[error("control block too short: expected {MESSAGE_SIZE} bytes, got {0}")]
    Truncated(usize),
}

/// Decoded bootloader control block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootloaderMessage {
    /// Boot command for the boot loader.
    pub command: String,
    /// Status reported by the boot loader.
    pub status: String,
    /// Recovery argument blob, newline separated.
    pub recovery: String,
}

impl BootloaderMessage {
    /// A block that makes every subsequent boot re-enter recovery with `args`.
    ///
    /// `args` excludes the program name.
    pub fn boot_recovery<S: AsRef<str>>(args: &[S]) -> Self {
        let mut recovery = format!("{RECOVERY_MARKER}\n");
        for arg in args {
            recovery.push_str(arg.as_ref());
            recovery.push('\n');
        }
        Self {
            command: BOOT_RECOVERY.to_string(),
            status: String::new(),
            recovery,
        }
    }

    /// Decode a block from its on-disk representation.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Truncated`] if `bytes` is shorter than
    /// [`MESSAGE_SIZE`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() < MESSAGE_SIZE {
            return Err(MessageError::Truncated(bytes.len()));
        }
        let (command, rest) = bytes.split_at(COMMAND_LEN);
        let (status, rest) = rest.split_at(STATUS_LEN);
        let recovery = &rest[..RECOVERY_LEN];
        Ok(Self {
            command: read_field(command),
            status: read_field(status),
            recovery: read_field(recovery),
        })
    }

    /// Encode the block, truncating oversized fields.
    pub fn to_bytes(&self) -> [u8; MESSAGE_SIZE] {
        let mut out = [0u8; MESSAGE_SIZE];
        write_field(&mut out[..COMMAND_LEN], &self.command);
        write_field(&mut out[COMMAND_LEN..COMMAND_LEN + STATUS_LEN], &self.status);
        write_field(&mut out[COMMAND_LEN + STATUS_LEN..], &self.recovery);
        out
    }

    /// Arguments stored after the `recovery` marker line, if the `recovery`
    /// field starts with it. Blank lines are skipped.
    pub fn recovery_args(&self) -> Option<Vec<String>> {
        let mut lines = self.recovery.split('\n').filter(|l| !l.is_empty());
        if lines.next()? != RECOVERY_MARKER {
            return None;
        }
        Some(lines.map(str::to_string).collect())
    }

    /// Whether every field is empty.
    pub fn is_empty(&self) -> bool {
        self.command.is_empty() && self.status.is_empty() && self.recovery.is_empty()
    }
}

fn read_field(field: &[u8]) -> String {
    match field.first() {
        None | Some(0 | 0xff) => String::new(),
        Some(_) => {
            let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
            String::from_utf8_lossy(&field[..end]).into_owned()
        }
    }
}

fn write_field(field: &mut [u8], value: &str) {
    let n = value.len().min(field.len() - 1);
    field[..n].copy_from_slice(&value.as_bytes()[..n]);
}
