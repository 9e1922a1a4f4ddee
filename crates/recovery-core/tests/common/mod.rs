//! Shared fixtures: signing keys, signed packages and a recording reporter.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use recovery_core::keys::{KeyVersion, PublicKey, RSANUMBYTES};
use recovery_core::reporter::{Background, Reporter};
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use zip::write::SimpleFileOptions;

pub const TRUSTED: usize = 0;
pub const UNTRUSTED: usize = 1;

/// Process-wide test keys (e = 3). Generation is slow, so it happens once.
pub fn signing_key(slot: usize) -> &'static RsaPrivateKey {
    static KEYS: OnceLock<Vec<RsaPrivateKey>> = OnceLock::new();
    let keys = KEYS.get_or_init(|| {
        let mut rng = rand_core::OsRng;
        (0..2)
            .map(|_| RsaPrivateKey::new_with_exp(&mut rng, 2048, &BigUint::from(3u32)).unwrap())
            .collect()
    });
    &keys[slot]
}

pub fn public_key(slot: usize) -> PublicKey {
    PublicKey::from_rsa(&RsaPublicKey::from(signing_key(slot)), KeyVersion::V1).unwrap()
}

/// Write a key file trusting the given slots.
pub fn write_keys(path: &Path, slots: &[usize]) {
    let text = slots
        .iter()
        .map(|&s| public_key(s).to_string())
        .collect::<Vec<_>>()
        .join(",\n");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text + "\n").unwrap();
}

/// Build a ZIP archive with the given entries, stored uncompressed.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        let options = SimpleFileOptions::default().unix_permissions(0o755);
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Append a whole-file signature made with key `slot` to an archive.
pub fn sign(archive: &[u8], slot: usize) -> Vec<u8> {
    // An archive without comment ends with a zero comment length.
    assert_eq!(&archive[archive.len() - 2..], &[0, 0]);
    let mut signed = archive[..archive.len() - 2].to_vec();

    let digest = Sha1::digest(&signed);
    let sig = signing_key(slot)
        .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
        .unwrap();
    assert_eq!(sig.len(), RSANUMBYTES);

    let banner = b"signed by test\0";
    let comment_size = (banner.len() + sig.len() + 6) as u16;
    let sig_start = (sig.len() + 6) as u16;

    signed.extend_from_slice(&comment_size.to_le_bytes());
    signed.extend_from_slice(banner);
    signed.extend_from_slice(&sig);
    signed.extend_from_slice(&sig_start.to_le_bytes());
    signed.extend_from_slice(&[0xff, 0xff]);
    signed.extend_from_slice(&comment_size.to_le_bytes());
    signed
}

/// Write a package signed by `slot` to `path`.
pub fn write_package(path: &Path, entries: &[(&str, &[u8])], slot: usize) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, sign(&zip_bytes(entries), slot)).unwrap();
    path.to_path_buf()
}

/// Reporter that remembers what was printed and asked for.
#[derive(Default)]
pub struct Recorder {
    pub lines: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<(f32, u32)>>,
    pub backgrounds: Mutex<Vec<Background>>,
}

impl Recorder {
    pub fn printed(&self) -> String {
        self.lines.lock().unwrap().join("\n")
    }
}

impl Reporter for Recorder {
    fn print(&self, msg: &str) {
        self.lines.lock().unwrap().push(msg.to_string());
    }
    fn set_background(&self, background: Background) {
        self.backgrounds.lock().unwrap().push(background);
    }
    fn show_indeterminate_progress(&self) {}
    fn show_progress(&self, portion: f32, seconds: u32) {
        self.progress.lock().unwrap().push((portion, seconds));
    }
    fn set_progress(&self, _: f32) {}
    fn reset_progress(&self) {}
    fn text_visible(&self) -> bool {
        false
    }
}
