//! Error kinds shared across the codec.

use std::{fmt, io};

/// Errors produced while encoding or decoding a seekable gzip stream.
///
/// The stream-facing APIs are the std I/O traits, so an `Error` usually
/// travels as the payload of an [`io::Error`]; the conversion below fixes
/// the [`io::ErrorKind`] each variant maps to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// A gzip member header was malformed.
    Header(&'static str),
    /// The CRC-32 or ISIZE trailer did not match the decoded payload.
    Checksum { expected: u32, found: u32 },
    /// The byte source ended in the middle of a member.
    UnexpectedEof,
    /// A seek resolved outside `0..=total_size`.
    InvalidSeek,
    /// The operation is not available on this reader.
    Unsupported,
    /// The compression level is outside the accepted `-2..=9` range.
    InvalidLevel(i32),
    /// The block size is zero.
    InvalidBlockSize,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Header(detail) => write!(f, "invalid gzip header: {detail}"),
            Error::Checksum { expected, found } => {
                write!(f, "checksum mismatch: expected {expected:#010x}, found {found:#010x}")
            }
            Error::UnexpectedEof => f.write_str("byte source ended inside a gzip member"),
            Error::InvalidSeek => f.write_str("seek target outside the uncompressed stream"),
            Error::Unsupported => f.write_str("operation not supported by this reader"),
            Error::InvalidLevel(level) => {
                write!(f, "compression level {level} outside accepted range -2..=9")
            }
            Error::InvalidBlockSize => f.write_str("block size must be positive"),
        }
    }
}

impl std::error::Error for Error {}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::Header(_) | Error::Checksum { .. } => io::ErrorKind::InvalidData,
            Error::UnexpectedEof => io::ErrorKind::UnexpectedEof,
            Error::InvalidSeek | Error::InvalidLevel(_) | Error::InvalidBlockSize => {
                io::ErrorKind::InvalidInput
            }
            Error::Unsupported => io::ErrorKind::Unsupported,
        };
        io::Error::new(kind, err)
    }
}

/// Error for an operation attempted after an earlier failure.
///
/// Carries the same [`io::ErrorKind`] class as the failure that poisoned
/// the reader or writer.
pub(crate) fn poisoned(kind: io::ErrorKind) -> io::Error {
    io::Error::new(kind, "poisoned by an earlier error")
}
