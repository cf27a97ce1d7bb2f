//! Reading and writing the RFC 1952 member framing.

use crate::error::Error;
use flate2::Crc;
use std::io::{self, Read, Write};

pub(crate) const MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;

const F_HCRC: u8 = 0b00_0010;
const F_EXTRA: u8 = 0b00_0100;
const F_NAME: u8 = 0b00_1000;
const F_COMMENT: u8 = 0b01_0000;
const F_RESERVED: u8 = 0b1110_0000;

/// OS byte for "unknown", the conventional value for portable streams.
pub const OS_UNKNOWN: u8 = 255;

/// XFL hint: the encoder used its slowest, best-compressing setting.
pub(crate) const XFL_BEST: u8 = 2;
/// XFL hint: the encoder used its fastest setting.
pub(crate) const XFL_FASTEST: u8 = 4;

/// Metadata carried in each gzip member header.
///
/// The writer repeats the same header in every member of a stream so
/// members stay deterministic and individually self-describing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Original file name, without NUL bytes.
    pub name: Option<String>,
    /// Modification time in seconds since the Unix epoch; 0 means unset.
    pub mtime: u32,
    /// Free-form comment, without NUL bytes.
    pub comment: Option<String>,
    /// Raw extra-field bytes, treated opaquely.
    pub extra: Option<Vec<u8>>,
    /// Originating operating system byte.
    pub os: u8,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            name: None,
            mtime: 0,
            comment: None,
            extra: None,
            os: OS_UNKNOWN,
        }
    }
}

impl Header {
    /// Rejects metadata that cannot be framed: NUL bytes in the
    /// NUL-terminated fields, or an extra field longer than its 16-bit
    /// length prefix allows.
    pub(crate) fn validate(&self) -> io::Result<()> {
        for field in [&self.name, &self.comment].into_iter().flatten() {
            if field.as_bytes().contains(&0) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "gzip header field contains a NUL byte",
                ));
            }
        }
        if let Some(ref extra) = self.extra {
            if u16::try_from(extra.len()).is_err() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "gzip extra field exceeds 65535 bytes",
                ));
            }
        }
        Ok(())
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.extra.is_some() {
            flags |= F_EXTRA;
        }
        if self.name.is_some() {
            flags |= F_NAME;
        }
        if self.comment.is_some() {
            flags |= F_COMMENT;
        }
        flags
    }

    pub(crate) fn write_to<W: Write>(&self, mut writer: W, xfl: u8) -> io::Result<()> {
        self.validate()?;
        writer.write_all(&MAGIC)?;
        writer.write_all(&[METHOD_DEFLATE, self.flags()])?;
        writer.write_all(&self.mtime.to_le_bytes())?;
        writer.write_all(&[xfl, self.os])?;
        if let Some(ref extra) = self.extra {
            writer.write_all(&(extra.len() as u16).to_le_bytes())?;
            writer.write_all(extra)?;
        }
        if let Some(ref name) = self.name {
            writer.write_all(name.as_bytes())?;
            writer.write_all(&[0])?;
        }
        if let Some(ref comment) = self.comment {
            writer.write_all(comment.as_bytes())?;
            writer.write_all(&[0])?;
        }
        Ok(())
    }

    /// Parses one member header.
    ///
    /// Malformed framing surfaces as [`Error::Header`]; a source that ends
    /// mid-header surfaces as `UnexpectedEof`. The caller decides whether
    /// an empty source is an error or a clean end of stream.
    pub(crate) fn read_from<R: Read>(mut reader: R) -> io::Result<Self> {
        // Raw header bytes are retained for the optional FHCRC check.
        let mut raw = Vec::with_capacity(10);
        let mut fixed = [0u8; 10];
        reader.read_exact(&mut fixed)?;
        raw.extend_from_slice(&fixed);

        if fixed[0..2] != MAGIC {
            return Err(Error::Header("bad magic bytes").into());
        }
        if fixed[2] != METHOD_DEFLATE {
            return Err(Error::Header("compression method is not deflate").into());
        }
        let flags = fixed[3];
        if flags & F_RESERVED != 0 {
            return Err(Error::Header("reserved flag bits set").into());
        }

        let mut this = Header {
            mtime: u32::from_le_bytes(fixed[4..8].try_into().unwrap()),
            os: fixed[9],
            ..Header::default()
        };
        if flags & F_EXTRA != 0 {
            let mut len_buf = [0u8; 2];
            reader.read_exact(&mut len_buf)?;
            raw.extend_from_slice(&len_buf);
            let mut extra = vec![0u8; u16::from_le_bytes(len_buf) as usize];
            reader.read_exact(&mut extra)?;
            raw.extend_from_slice(&extra);
            this.extra = Some(extra);
        }
        if flags & F_NAME != 0 {
            this.name = Some(read_nul_terminated(&mut reader, &mut raw)?);
        }
        if flags & F_COMMENT != 0 {
            this.comment = Some(read_nul_terminated(&mut reader, &mut raw)?);
        }
        if flags & F_HCRC != 0 {
            let mut crc_buf = [0u8; 2];
            reader.read_exact(&mut crc_buf)?;
            let mut crc = Crc::new();
            crc.update(&raw);
            if u16::from_le_bytes(crc_buf) != crc.sum() as u16 {
                return Err(Error::Header("header checksum mismatch").into());
            }
        }
        Ok(this)
    }
}

fn read_nul_terminated<R: Read>(reader: &mut R, raw: &mut Vec<u8>) -> io::Result<String> {
    let mut bytes = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        raw.push(byte[0]);
        if byte[0] == 0 {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        bytes.push(byte[0]);
    }
}

/// The 8-byte member trailer: CRC-32 of the uncompressed payload, then its
/// length mod 2^32, both little-endian.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Trailer {
    pub crc32: u32,
    pub isize: u32,
}

impl Trailer {
    pub fn read_from<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(Self {
            crc32: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            isize: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        })
    }

    pub fn write_to<W: Write>(self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.crc32.to_le_bytes())?;
        writer.write_all(&self.isize.to_le_bytes())?;
        Ok(())
    }
}
