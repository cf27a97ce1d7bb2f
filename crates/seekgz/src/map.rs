//! The block map: the side-channel index that makes a stream seekable.

use crate::num_blocks;
use std::{fmt, io};

/// The magic bytes that open a serialized block map.
pub const MAGIC: [u8; 4] = *b"gzbm";

/// Serialized size of the fixed fields (magic, block size, total size,
/// entry count).
const FIXED_LEN: usize = 4 + 4 + 8 + 4;

/// Per-stream index mapping block index to compressed member length.
///
/// Built by the writer while it emits members and finalized on
/// [`Writer::finish`](crate::writer::Writer::finish); immutable afterwards.
/// Decoders hold it behind an `Arc` so many readers can share one map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMap {
    block_size: u32,
    total_size: u64,
    block_lengths: Vec<u32>,
}

/// Where an uncompressed offset falls within the compressed stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Location {
    /// Index of the member holding the offset.
    pub block: u64,
    /// Compressed byte offset at which that member begins.
    pub compressed_offset: u64,
    /// Uncompressed bytes to discard inside the member to reach the offset.
    pub residue: u32,
}

impl BlockMap {
    /// Creates an empty map for a stream cut at `block_size` boundaries.
    ///
    /// The public constructors validate the block size before calling
    /// this; a zero value here is a crate bug.
    pub(crate) fn new(block_size: u32) -> Self {
        assert!(block_size > 0, "block_size must be > 0");
        Self {
            block_size,
            total_size: 0,
            block_lengths: Vec::new(),
        }
    }

    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Total uncompressed bytes across all blocks.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Compressed length of each member, in stream order.
    #[must_use]
    pub fn block_lengths(&self) -> &[u32] {
        &self.block_lengths
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.block_lengths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block_lengths.is_empty()
    }

    /// Sum of all member lengths: the compressed stream length.
    #[must_use]
    pub fn compressed_len(&self) -> u64 {
        self.block_lengths.iter().map(|&len| u64::from(len)).sum()
    }

    pub(crate) fn push_length(&mut self, len: u32) {
        self.block_lengths.push(len);
    }

    pub(crate) fn set_total_size(&mut self, total: u64) {
        self.total_size = total;
    }

    /// Translates an uncompressed offset into a member position.
    ///
    /// Returns `None` for offsets at or past `total_size` (end-of-stream
    /// positioning needs no member) and for maps whose length array is
    /// inconsistent with `total_size`.
    #[must_use]
    pub fn locate(&self, offset: u64) -> Option<Location> {
        if offset >= self.total_size {
            return None;
        }
        let block = offset / u64::from(self.block_size);
        let residue = (offset % u64::from(self.block_size)) as u32;
        let lengths = self.block_lengths.get(..usize::try_from(block).ok()?)?;
        let compressed_offset = lengths.iter().map(|&len| u64::from(len)).sum();
        Some(Location {
            block,
            compressed_offset,
            residue,
        })
    }

    /// Serializes the map: magic, then little-endian block size, total
    /// size, entry count, and the member lengths.
    ///
    /// The encoding is deterministic so persisted maps are portable.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(FIXED_LEN + self.block_lengths.len() * 4);
        result.extend_from_slice(&MAGIC);
        result.extend_from_slice(&self.block_size.to_le_bytes());
        result.extend_from_slice(&self.total_size.to_le_bytes());
        result.extend_from_slice(&(self.block_lengths.len() as u32).to_le_bytes());
        for &len in &self.block_lengths {
            result.extend_from_slice(&len.to_le_bytes());
        }
        result
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < FIXED_LEN {
            return Err(DecodeError::TooSmall);
        }
        let (fixed, rest) = data.split_at(FIXED_LEN);
        if fixed[0..4] != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let block_size = u32::from_le_bytes(fixed[4..8].try_into().unwrap());
        let total_size = u64::from_le_bytes(fixed[8..16].try_into().unwrap());
        let count = u32::from_le_bytes(fixed[16..20].try_into().unwrap());
        if block_size == 0 {
            return Err(DecodeError::Inconsistent);
        }
        if u64::from(count) != num_blocks(total_size, block_size) {
            return Err(DecodeError::Inconsistent);
        }
        if rest.len() != count as usize * 4 {
            return Err(DecodeError::Inconsistent);
        }
        let block_lengths = rest
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()))
            .collect();
        Ok(Self {
            block_size,
            total_size,
            block_lengths,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecodeError {
    TooSmall,
    BadMagic,
    Inconsistent,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            DecodeError::TooSmall => "block map too small to hold its fixed fields",
            DecodeError::BadMagic => "block map magic field has incorrect value",
            DecodeError::Inconsistent => "block map fields are mutually inconsistent",
        };
        f.write_str(s)
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for io::Error {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::TooSmall => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            DecodeError::BadMagic | DecodeError::Inconsistent => {
                io::Error::new(io::ErrorKind::InvalidData, err)
            }
        }
    }
}
