//! Whole-file package signature verification.
//!
//! A signed package is an ordinary ZIP archive whose archive comment ends
//! with an RSA signature and a 6-byte footer:
//!
//! ```text
//! ... end-of-central-directory (22 bytes) | comment ...
//!                                           ... signature (256) | footer (6)
//! footer = sig_start: u16le, 0xff, 0xff, comment_size: u16le
//! ```
//!
//! `sig_start` counts back from the end of the file to the signature. The
//! signature covers every byte of the file up to, but not including, the
//! 2-byte comment length field of the end-of-central-directory record.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use rsa::Pkcs1v15Sign;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::keys::{DigestKind, KeySet, RSANUMBYTES};
use crate::reporter::Reporter;

/// Size of the trailing footer.
pub const FOOTER_SIZE: usize = 6;

/// Size of an end-of-central-directory record without its comment.
pub const EOCD_HEADER_SIZE: usize = 22;

const EOCD_MAGIC: &[u8; 4] = b"PK\x05\x06";

// 1 MiB between progress updates.
const HASH_CHUNK: usize = 1 << 20;

/// Reasons a package fails verification.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// The package could not be opened or mapped.
    #[error("Can't open {}: {source}", path.display())]
    Open {
        /// Package path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file does not end in a signature footer.
    #[error("No signature in file (no footer)")]
    NoFooter,

    /// The footer leaves no room for a full signature.
    #[error("Signature is too short ({0} bytes)")]
    SignatureTooShort(usize),

    /// The declared comment is longer than the file.
    #[error("Archive comment ({0} bytes) runs past start of file")]
    Truncated(usize),

    /// The signature does not lie inside the archive comment.
    #[error("Signature start {0} is outside the archive comment")]
    SignatureOutOfRange(usize),

    /// No end-of-central-directory record where the footer says.
    #[error("Signature length doesn't match EOCD marker")]
    NoEocd,

    /// The comment itself contains an end-of-central-directory marker.
    #[error("EOCD marker occurs after start of EOCD")]
    AmbiguousEocd,

    /// There are no trusted keys.
    #[error("No keys to verify against")]
    NoKeys,

    /// No trusted key produced this signature.
    #[error("Failed to verify whole-file signature")]
    NoMatchingKey,
}

/// Location of the signed region and signature inside a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    signed_len: usize,
    signature: usize,
}

fn locate(data: &[u8]) -> Result<Layout, VerifyError> {
    let len = data.len();
    if len < FOOTER_SIZE {
        return Err(VerifyError::NoFooter);
    }
    let footer = &data[len - FOOTER_SIZE..];
    if footer[2] != 0xff || footer[3] != 0xff {
        return Err(VerifyError::NoFooter);
    }

    let sig_start = usize::from(u16::from_le_bytes([footer[0], footer[1]]));
    let comment_size = usize::from(u16::from_le_bytes([footer[4], footer[5]]));
    debug!("comment is {comment_size} bytes; signature {sig_start} bytes from end");

    if sig_start < FOOTER_SIZE + RSANUMBYTES {
        return Err(VerifyError::SignatureTooShort(
            sig_start.saturating_sub(FOOTER_SIZE),
        ));
    }

    let eocd_size = comment_size + EOCD_HEADER_SIZE;
    if eocd_size > len {
        return Err(VerifyError::Truncated(comment_size));
    }
    if sig_start > comment_size {
        return Err(VerifyError::SignatureOutOfRange(sig_start));
    }

    let eocd = &data[len - eocd_size..];
    if !eocd.starts_with(EOCD_MAGIC) {
        return Err(VerifyError::NoEocd);
    }
    if eocd[1..].windows(EOCD_MAGIC.len()).any(|w| w == EOCD_MAGIC) {
        return Err(VerifyError::AmbiguousEocd);
    }

    Ok(Layout {
        signed_len: len - eocd_size + EOCD_HEADER_SIZE - 2,
        signature: len - sig_start,
    })
}

struct Digests {
    sha1: Option<Sha1>,
    sha256: Option<Sha256>,
}

impl Digests {
    fn for_keys(keys: &KeySet) -> Self {
        let need = |kind: DigestKind| keys.iter().any(|k| k.version.digest() == kind);
        Self {
            sha1: need(DigestKind::Sha1).then(Sha1::new),
            sha256: need(DigestKind::Sha256).then(Sha256::new),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        if let Some(h) = &mut self.sha1 {
            h.update(chunk);
        }
        if let Some(h) = &mut self.sha256 {
            h.update(chunk);
        }
    }
}

/// Verify the package at `path` against every key in `keys`.
///
/// Returns the index of the first key that verifies the signature.
/// Progress through the signed region is reported with
/// [`Reporter::set_progress`].
///
/// # Errors
///
/// Returns a [`VerifyError`] describing why the package is not trusted.
#[allow(unsafe_code)]
pub fn verify_package(path: &Path, keys: &KeySet, reporter: &dyn Reporter) -> Result<usize, VerifyError> {
    if keys.is_empty() {
        return Err(VerifyError::NoKeys);
    }

    let open_err = |source| VerifyError::Open {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(open_err)?;
    let len = file.metadata().map_err(open_err)?.len();
    if len < FOOTER_SIZE as u64 {
        return Err(VerifyError::NoFooter);
    }

    // SAFETY: The map is read-only and dropped before returning. The package
    // lives on storage recovery controls and is not modified while verified.
    let map = unsafe { Mmap::map(&file) }.map_err(open_err)?;

    let layout = locate(&map)?;
    let signature = &map[layout.signature..layout.signature + RSANUMBYTES];

    let mut digests = Digests::for_keys(keys);
    let signed = &map[..layout.signed_len];
    let mut done = 0usize;
    for chunk in signed.chunks(HASH_CHUNK) {
        digests.update(chunk);
        done += chunk.len();
        reporter.set_progress(done as f32 / layout.signed_len as f32);
    }
    let sha1 = digests.sha1.map(|h| h.finalize().to_vec());
    let sha256 = digests.sha256.map(|h| h.finalize().to_vec());

    for (i, key) in keys.iter().enumerate() {
        let rsa = match key.to_rsa() {
            Ok(rsa) => rsa,
            Err(e) => {
                warn!("Skipping key {i}: {e}");
                continue;
            }
        };
        let (scheme, digest) = match key.version.digest() {
            DigestKind::Sha1 => (Pkcs1v15Sign::new::<Sha1>(), sha1.as_deref()),
            DigestKind::Sha256 => (Pkcs1v15Sign::new::<Sha256>(), sha256.as_deref()),
        };
        let Some(digest) = digest else { continue };
        if rsa.verify(scheme, digest, signature).is_ok() {
            info!("Whole-file signature verified against key {i}");
            return Ok(i);
        }
        debug!("Failed to verify against key {i}");
    }

    Err(VerifyError::NoMatchingKey)
}
