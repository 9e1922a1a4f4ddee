//! Public key store.
//!
//! The key file holds one or more RSA public keys written out as C struct
//! literals by the key dump tool:
//!
//! ```text
//! {64,0xc926ad21,{1795090719,...,-695002876},{-857949815,...,1175080310}}
//! ```
//!
//! i.e. `{len, n0inv, {n[0..len]}, {rr[0..len]}}` with the modulus `n` and
//! the Montgomery constant `rr = R² mod n` as little-endian 32-bit words,
//! and `n0inv = -1/n[0] mod 2³²`. Keys are separated by commas; the last
//! key must not be followed by one. A record may be prefixed with a version
//! tag (`v2 {...}`) selecting the public exponent and digest:
//!
//! | tag | exponent | digest |
//! |---|---|---|
//! | none / `v1` | 3 | SHA-1 |
//! | `v2` | 65537 | SHA-1 |
//! | `v3` | 3 | SHA-256 |
//! | `v4` | 65537 | SHA-256 |
//!
//! Parsing is all or nothing: one bad record rejects the whole file. A
//! record whose `n0inv` or `rr` was not derived from its `n` counts as bad.

use std::fmt;
use std::path::{Path, PathBuf};

use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use thiserror::Error;

/// Number of 32-bit words in a supported modulus (2048-bit keys).
pub const RSANUMWORDS: usize = 64;

/// Size in bytes of a supported modulus and of a raw signature.
pub const RSANUMBYTES: usize = RSANUMWORDS * 4;

/// Errors loading or converting public keys.
#[derive(Error, Debug)]
pub enum KeyError {
    /// The key file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Key file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A structural token was missing.
    #[error("expected {expected} at byte {offset}")]
    Syntax {
        /// Byte offset into the key file.
        offset: usize,
        /// Description of the expected token.
        expected: &'static str,
    },

    /// A numeric field could not be parsed or does not fit in 32 bits.
    #[error("invalid number at byte {offset}")]
    Number {
        /// Byte offset into the key file.
        offset: usize,
    },

    /// The declared word count is not [`RSANUMWORDS`].
    #[error("public key length ({0}) does not match expected size ({RSANUMWORDS})")]
    Length(i64),

    /// The record carries a version tag this build does not know.
    #[error("unsupported key version v{0}")]
    Version(u32),

    /// Something other than `,` or end of input follows a record.
    #[error("unexpected character {found:?} after key at byte {offset}")]
    Trailing {
        /// Byte offset into the key file.
        offset: usize,
        /// The offending character.
        found: char,
    },

    /// A stored Montgomery constant (`n0inv` or `rr`) does not belong to
    /// the record's modulus.
    #[error("key {field} does not match its modulus")]
    Montgomery {
        /// Name of the mismatched field.
        field: &'static str,
    },

    /// The key cannot be expressed in this format or used for RSA.
    #[error("invalid RSA key: {0}")]
    Invalid(String),
}

/// Digest algorithm paired with a key version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestKind {
    /// SHA-1 (20 bytes).
    Sha1,
    /// SHA-256 (32 bytes).
    Sha256,
}

/// Key format version, selecting public exponent and digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyVersion {
    /// e = 3, SHA-1. The untagged legacy format.
    #[default]
    V1,
    /// e = 65537, SHA-1.
    V2,
    /// e = 3, SHA-256.
    V3,
    /// e = 65537, SHA-256.
    V4,
}

impl KeyVersion {
    fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            4 => Some(Self::V4),
            _ => None,
        }
    }

    /// Numeric tag as written in the key file.
    pub fn tag(self) -> u32 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
            Self::V3 => 3,
            Self::V4 => 4,
        }
    }

    /// Public exponent.
    pub fn exponent(self) -> u32 {
        match self {
            Self::V1 | Self::V3 => 3,
            Self::V2 | Self::V4 => 65537,
        }
    }

    /// Digest the signature is computed over.
    pub fn digest(self) -> DigestKind {
        match self {
            Self::V1 | Self::V2 => DigestKind::Sha1,
            Self::V3 | Self::V4 => DigestKind::Sha256,
        }
    }
}

/// One RSA public key in Montgomery form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// Format version.
    pub version: KeyVersion,
    /// `-1 / n[0] mod 2^32`.
    pub n0inv: u32,
    /// Modulus, little-endian words.
    pub n: Vec<u32>,
    /// `R^2 mod n`, little-endian words.
    pub rr: Vec<u32>,
}

impl PublicKey {
    /// Derive the stored form of an RSA public key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Invalid`] if the modulus is larger than
    /// [`RSANUMBYTES`], is even, or the exponent does not match `version`.
    pub fn from_rsa(key: &RsaPublicKey, version: KeyVersion) -> Result<Self, KeyError> {
        if *key.e() != BigUint::from(version.exponent()) {
            return Err(KeyError::Invalid(format!(
                "exponent {} does not match key version v{}",
                key.e(),
                version.tag()
            )));
        }

        let n = to_words(key.n())?;
        let (n0inv, rr) = montgomery(&n)?;
        Ok(Self {
            version,
            n0inv,
            n,
            rr,
        })
    }

    /// Check that `n0inv` and `rr` are the constants derived from `n`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Invalid`] for an even modulus and
    /// [`KeyError::Montgomery`] naming the first field that differs.
    pub fn check_montgomery(&self) -> Result<(), KeyError> {
        let (n0inv, rr) = montgomery(&self.n)?;
        if n0inv != self.n0inv {
            return Err(KeyError::Montgomery { field: "n0inv" });
        }
        if rr != self.rr {
            return Err(KeyError::Montgomery { field: "rr" });
        }
        Ok(())
    }

    /// Build the RSA public key used for verification.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Invalid`] if the modulus/exponent pair is
    /// rejected by the RSA implementation.
    pub fn to_rsa(&self) -> Result<RsaPublicKey, KeyError> {
        RsaPublicKey::new(from_words(&self.n), BigUint::from(self.version.exponent()))
            .map_err(|e| KeyError::Invalid(e.to_string()))
    }
}

/// `(-1/n[0] mod 2^32, R^2 mod n)` with `R = 2^(32 * RSANUMWORDS)`.
fn montgomery(n: &[u32]) -> Result<(u32, Vec<u32>), KeyError> {
    let n0 = n.first().copied().unwrap_or(0);
    if n0 & 1 == 0 {
        return Err(KeyError::Invalid("modulus is even".to_string()));
    }

    // Newton iteration doubles the number of correct low bits each
    // round; n0 * n0 == 1 (mod 8) gives the first three.
    let mut inv = n0;
    for _ in 0..5 {
        inv = inv.wrapping_mul(2u32.wrapping_sub(n0.wrapping_mul(inv)));
    }

    let r_squared = BigUint::from(1u32) << (2 * RSANUMBYTES * 8);
    let rr = to_words(&(r_squared % from_words(n)))?;
    Ok((inv.wrapping_neg(), rr))
}

fn from_words(words: &[u32]) -> BigUint {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    BigUint::from_bytes_le(&bytes)
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version != KeyVersion::V1 {
            write!(f, "v{} ", self.version.tag())?;
        }
        write!(f, "{{{},0x{:x},{{", self.n.len(), self.n0inv)?;
        write_words(f, &self.n)?;
        f.write_str("},{")?;
        write_words(f, &self.rr)?;
        f.write_str("}}")
    }
}

fn write_words(f: &mut fmt::Formatter<'_>, words: &[u32]) -> fmt::Result {
    for (i, w) in words.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{w}")?;
    }
    Ok(())
}

fn to_words(value: &BigUint) -> Result<Vec<u32>, KeyError> {
    let mut bytes = value.to_bytes_le();
    if bytes.len() > RSANUMBYTES {
        return Err(KeyError::Invalid(format!(
            "modulus is {} bits, expected at most {}",
            value.bits(),
            RSANUMBYTES * 8
        )));
    }
    bytes.resize(RSANUMBYTES, 0);
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Ordered, immutable set of trusted keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<PublicKey>,
}

impl KeySet {
    /// Wrap an already parsed list of keys.
    pub fn new(keys: Vec<PublicKey>) -> Self {
        Self { keys }
    }

    /// Parse the textual key file format.
    ///
    /// # Errors
    ///
    /// Returns the first [`KeyError`] encountered; no keys are returned in
    /// that case.
    pub fn parse(text: &str) -> Result<Self, KeyError> {
        let mut scanner = Scanner::new(text);
        let mut keys = Vec::new();
        loop {
            keys.push(scanner.record()?);
            scanner.skip_ws();
            match scanner.bump() {
                Some(b',') => {}
                None => break,
                Some(other) => {
                    return Err(KeyError::Trailing {
                        offset: scanner.pos - 1,
                        found: char::from(other),
                    });
                }
            }
        }
        Ok(Self { keys })
    }

    /// Iterate over the keys in file order.
    pub fn iter(&self) -> std::slice::Iter<'_, PublicKey> {
        self.keys.iter()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a PublicKey;
    type IntoIter = std::slice::Iter<'a, PublicKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// Load the key file at `path`.
///
/// # Errors
///
/// Returns [`KeyError::Read`] if the file cannot be read, or any parse
/// error from [`KeySet::parse`].
pub fn load_keys(path: &Path) -> Result<KeySet, KeyError> {
    let text = std::fs::read_to_string(path).map_err(|source| KeyError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    KeySet::parse(&text)
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            src: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, token: u8, expected: &'static str) -> Result<(), KeyError> {
        self.skip_ws();
        if self.peek() == Some(token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(KeyError::Syntax {
                offset: self.pos,
                expected,
            })
        }
    }

    fn record(&mut self) -> Result<PublicKey, KeyError> {
        self.skip_ws();
        let version = if self.peek() == Some(b'v') {
            self.pos += 1;
            let offset = self.pos;
            let tag = self.digits(10).ok_or(KeyError::Number { offset })?;
            let tag = u32::try_from(tag).map_err(|_| KeyError::Number { offset })?;
            KeyVersion::from_tag(tag).ok_or(KeyError::Version(tag))?
        } else {
            KeyVersion::V1
        };

        self.expect(b'{', "'{'")?;
        let len = self.number()?;
        if usize::try_from(len).ok() != Some(RSANUMWORDS) {
            return Err(KeyError::Length(len));
        }
        self.expect(b',', "','")?;
        let n0inv = self.word()?;
        self.expect(b',', "','")?;
        let n = self.word_list()?;
        self.expect(b',', "','")?;
        let rr = self.word_list()?;
        self.expect(b'}', "'}'")?;

        let key = PublicKey {
            version,
            n0inv,
            n,
            rr,
        };
        key.check_montgomery()?;
        Ok(key)
    }

    fn word_list(&mut self) -> Result<Vec<u32>, KeyError> {
        self.expect(b'{', "'{'")?;
        let mut words = Vec::with_capacity(RSANUMWORDS);
        for i in 0..RSANUMWORDS {
            if i > 0 {
                self.expect(b',', "','")?;
            }
            words.push(self.word()?);
        }
        self.expect(b'}', "'}'")?;
        Ok(words)
    }

    fn word(&mut self) -> Result<u32, KeyError> {
        let offset = self.pos;
        let value = self.number()?;
        if (i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(&value) {
            // Negative values are two's complement words.
            u32::try_from(value.rem_euclid(1 << 32)).map_err(|_| KeyError::Number { offset })
        } else {
            Err(KeyError::Number { offset })
        }
    }

    /// Integer with C `%i` rules: optional sign, `0x` hex, leading-zero
    /// octal, otherwise decimal.
    fn number(&mut self) -> Result<i64, KeyError> {
        self.skip_ws();
        let offset = self.pos;
        let negative = match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                true
            }
            Some(b'+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };

        let hex_prefix = self.peek() == Some(b'0')
            && matches!(self.src.get(self.pos + 1), Some(b'x' | b'X'))
            && self.src.get(self.pos + 2).is_some_and(u8::is_ascii_hexdigit);
        let magnitude = if hex_prefix {
            self.pos += 2;
            self.digits(16)
        } else if self.peek() == Some(b'0') {
            self.digits(8)
        } else {
            self.digits(10)
        };

        let magnitude = magnitude.ok_or(KeyError::Number { offset })?;
        Ok(if negative { -magnitude } else { magnitude })
    }

    fn digits(&mut self, radix: u32) -> Option<i64> {
        let start = self.pos;
        let mut value: i64 = 0;
        while let Some(d) = self.peek().and_then(|b| char::from(b).to_digit(radix)) {
            value = value.checked_mul(i64::from(radix))?.checked_add(i64::from(d))?;
            self.pos += 1;
        }
        (self.pos > start).then_some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A well-formed record for an odd `seed`; not a real RSA modulus, but
    /// its Montgomery constants are consistent.
    fn key(seed: u32, version: KeyVersion) -> PublicKey {
        let n: Vec<u32> = (0..RSANUMWORDS as u32).map(|i| seed + 2 * i).collect();
        let (n0inv, rr) = montgomery(&n).unwrap();
        PublicKey {
            version,
            n0inv,
            n,
            rr,
        }
    }

    fn record(seed: u32) -> String {
        key(seed, KeyVersion::V1).to_string()
    }

    fn signed_words(words: &[u32]) -> String {
        words
            .iter()
            .map(|&w| (w as i32).to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    #[test]
    fn parses_records_in_file_order() {
        let text = format!("{},\n{} ,\t{}\n\n", record(11), record(21), record(31));
        let keys = KeySet::parse(&text).unwrap();
        assert_eq!(keys.len(), 3);
        let firsts: Vec<u32> = keys.iter().map(|k| k.n[0]).collect();
        assert_eq!(firsts, vec![11, 21, 31]);
        let first = keys.iter().next().unwrap();
        assert_eq!(first, &key(11, KeyVersion::V1));
        assert_eq!(first.version, KeyVersion::V1);
    }

    #[test]
    fn negative_words_are_twos_complement() {
        let expected = key(0x8000_0001, KeyVersion::V1);
        let text = format!(
            "{{64,{},{{{}}},{{{}}}}}",
            expected.n0inv as i32,
            signed_words(&expected.n),
            signed_words(&expected.rr)
        );
        assert!(text.contains('-'));
        let keys = KeySet::parse(&text).unwrap();
        assert_eq!(keys.iter().next(), Some(&expected));
    }

    #[test]
    fn wrong_length_rejects_whole_file() {
        let bad = record(5).replacen("{64,", "{32,", 1);
        let text = format!("{},{}", record(1), bad);
        assert!(matches!(KeySet::parse(&text), Err(KeyError::Length(32))));
    }

    #[test]
    fn tampered_rr_is_rejected() {
        let mut bad = key(11, KeyVersion::V1);
        bad.rr[0] ^= 1;
        assert!(matches!(
            bad.check_montgomery(),
            Err(KeyError::Montgomery { field: "rr" })
        ));
        let text = format!("{},{}", record(1), bad);
        assert!(matches!(
            KeySet::parse(&text),
            Err(KeyError::Montgomery { field: "rr" })
        ));
    }

    #[test]
    fn made_up_constants_are_rejected() {
        let mut bad = key(11, KeyVersion::V3);
        bad.n0inv = 0xdead_beef;
        bad.rr = vec![0; RSANUMWORDS];
        assert!(matches!(
            KeySet::parse(&bad.to_string()),
            Err(KeyError::Montgomery { field: "n0inv" })
        ));
    }

    #[test]
    fn even_modulus_is_rejected() {
        let mut bad = key(11, KeyVersion::V1);
        bad.n[0] = 12;
        assert!(matches!(
            KeySet::parse(&bad.to_string()),
            Err(KeyError::Invalid(_))
        ));
    }

    #[test]
    fn trailing_comma_is_rejected() {
        let text = format!("{},", record(1));
        assert!(matches!(
            KeySet::parse(&text),
            Err(KeyError::Syntax { .. })
        ));
    }

    #[test]
    fn junk_after_record_is_rejected() {
        let text = format!("{};", record(1));
        assert!(matches!(
            KeySet::parse(&text),
            Err(KeyError::Trailing { found: ';', .. })
        ));
    }

    #[test]
    fn short_word_list_is_rejected() {
        // With seed 1 the modulus ends in 127.
        let text = record(1).replacen(",127}", "}", 1);
        assert!(matches!(KeySet::parse(&text), Err(KeyError::Syntax { .. })));
    }

    #[test]
    fn unparsable_number_is_rejected() {
        let text = record(1).replacen("{64,0x", "{64,zz", 1);
        assert!(matches!(KeySet::parse(&text), Err(KeyError::Number { .. })));
    }

    #[test]
    fn empty_file_has_no_keys() {
        assert!(KeySet::parse("  \n").is_err());
    }

    #[test]
    fn c_integer_forms() {
        let mut scanner = Scanner::new(" 0x1F -12 017 +9 0");
        assert_eq!(scanner.number().unwrap(), 31);
        assert_eq!(scanner.number().unwrap(), -12);
        assert_eq!(scanner.number().unwrap(), 15);
        assert_eq!(scanner.number().unwrap(), 9);
        assert_eq!(scanner.number().unwrap(), 0);
    }

    #[test]
    fn words_outside_32_bits_are_rejected() {
        let mut scanner = Scanner::new("4294967296");
        assert!(scanner.word().is_err());
        let mut scanner = Scanner::new("-2147483648");
        assert_eq!(scanner.word().unwrap(), 0x8000_0000);
    }

    #[test]
    fn version_tags() {
        let text = format!("v2 {}, v4{}", record(1), record(3));
        let keys = KeySet::parse(&text).unwrap();
        let versions: Vec<KeyVersion> = keys.iter().map(|k| k.version).collect();
        assert_eq!(versions, vec![KeyVersion::V2, KeyVersion::V4]);
        assert_eq!(KeyVersion::V4.digest(), DigestKind::Sha256);
        assert_eq!(KeyVersion::V2.exponent(), 65537);

        let text = format!("v9 {}", record(1));
        assert!(matches!(KeySet::parse(&text), Err(KeyError::Version(9))));
    }

    #[test]
    fn display_output_parses_back() {
        let key = key(7, KeyVersion::V3);
        let again = KeySet::parse(&key.to_string()).unwrap();
        assert_eq!(again.iter().next(), Some(&key));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_keys(&dir.path().join("keys")).unwrap_err();
        assert!(matches!(err, KeyError::Read { .. }));
    }
}
