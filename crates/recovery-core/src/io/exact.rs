//! Full-length reads and writes.
//!
//! Raw devices and pipes may transfer fewer bytes than asked. These helpers
//! keep going until the whole buffer is transferred, and fail loudly when
//! the other side reports end of stream or an error first. A failed call
//! leaves the buffer contents untrustworthy.

use std::io::{self, Read, Write};

use thiserror::Error;

/// A read or write stopped before the full length was transferred.
#[derive(Error, Debug)]
#[error("transferred {actual} of {expected} bytes")]
pub struct ShortTransfer {
    /// Number of bytes requested.
    pub expected: usize,
    /// Number of bytes actually transferred.
    pub actual: usize,
    /// The I/O error that stopped the transfer, if it was not end of stream.
    #[source]
    pub source: Option<io::Error>,
}

impl From<ShortTransfer> for io::Error {
    fn from(err: ShortTransfer) -> Self {
        let kind = err
            .source
            .as_ref()
            .map_or(io::ErrorKind::UnexpectedEof, io::Error::kind);
        io::Error::new(kind, err)
    }
}

/// Fill `buf` completely from `reader`.
///
/// # Errors
///
/// Returns [`ShortTransfer`] if the reader hits end of stream or fails
/// before `buf.len()` bytes were read.
pub fn ensure_read<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<(), ShortTransfer> {
    let mut done = 0;
    while done < buf.len() {
        match reader.read(&mut buf[done..]) {
            Ok(0) => return Err(short(buf.len(), done, None)),
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(short(buf.len(), done, Some(e))),
        }
    }
    Ok(())
}

/// Write all of `buf` to `writer`.
///
/// # Errors
///
/// Returns [`ShortTransfer`] if the writer accepts zero bytes or fails
/// before `buf.len()` bytes were written.
pub fn ensure_write<W: Write + ?Sized>(writer: &mut W, buf: &[u8]) -> Result<(), ShortTransfer> {
    let mut done = 0;
    while done < buf.len() {
        match writer.write(&buf[done..]) {
            Ok(0) => return Err(short(buf.len(), done, None)),
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(short(buf.len(), done, Some(e))),
        }
    }
    Ok(())
}

fn short(expected: usize, actual: usize, source: Option<io::Error>) -> ShortTransfer {
    ShortTransfer {
        expected,
        actual,
        source,
    }
}
