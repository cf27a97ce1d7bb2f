use crate::error::{poisoned, Error};
use crate::header::Header;
use crate::map::{BlockMap, Location};
use crate::reader::Reader;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

/// Residue inside a block is discarded through this reused scratch buffer.
const DISCARD_BUF_SIZE: usize = 8 * 1024;

/// Random-access reader over a seekable gzip stream and its block map.
///
/// Wraps a streaming [`Reader`]; the map translates uncompressed offsets
/// into member offsets, so a seek is one source reposition, one header
/// parse, and at most one partial block of discarded output. The map is
/// the sole source of truth for member boundaries: compressed bytes are
/// never scanned.
///
/// The map is shared read-only; open several `SeekReader`s over
/// independent source handles to read disjoint ranges concurrently.
pub struct SeekReader<R: Read + Seek> {
    inner: Reader<BufReader<R>>,
    map: Arc<BlockMap>,
    /// The user's multistream preference, restored after each seek.
    multistream: bool,
    pos: u64,
    /// Whether `inner` is positioned to deliver the byte at `pos`.
    ready: bool,
    discard: Vec<u8>,
    failed: Option<io::ErrorKind>,
}

impl<R: Read + Seek> SeekReader<R> {
    /// Prepares for random access over `src`. No byte is read and nothing
    /// is decoded until the first read or seek.
    ///
    /// `src` position 0 must be the first member's first byte; compressed
    /// offsets from the map are used as absolute source positions.
    pub fn new(src: R, map: Arc<BlockMap>) -> Self {
        Self {
            inner: Reader::idle(BufReader::new(src)),
            map,
            multistream: true,
            pos: 0,
            ready: false,
            discard: Vec::new(),
            failed: None,
        }
    }

    /// [`new`](Self::new), positioned at `offset`.
    pub fn new_at(src: R, map: Arc<BlockMap>, offset: u64) -> io::Result<Self> {
        let mut this = Self::new(src, map);
        this.seek(SeekFrom::Start(offset))?;
        Ok(this)
    }

    /// Current position in the uncompressed stream.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[must_use]
    pub fn block_map(&self) -> &BlockMap {
        &self.map
    }

    /// Metadata cached from the most recently parsed member header.
    #[must_use]
    pub fn header(&self) -> &Header {
        self.inner.header()
    }

    /// See [`Reader::multistream`]. The preference also survives seeks.
    pub fn multistream(&mut self, on: bool) {
        self.multistream = on;
        self.inner.multistream(on);
    }

    /// See [`Reader::reset`]: with multistream off, continues with the
    /// next member at the source's current position. The uncompressed
    /// position is unaffected; a seek-level poison is only cleared by a
    /// successful seek.
    pub fn reset(&mut self) -> io::Result<()> {
        self.inner.reset()
    }

    /// Releases the decoder state and returns the source without closing
    /// it.
    ///
    /// Internal read-ahead buffering can leave the source's cursor past
    /// the last byte the decoder consumed; the source is seeked back to
    /// the consumed position first, so it is handed back exactly where
    /// decoding left off.
    pub fn into_inner(mut self) -> io::Result<R> {
        self.inner.get_mut().seek(SeekFrom::Current(0))?;
        Ok(self.inner.into_inner().into_inner())
    }

    /// Drains decompressed bytes from the current position into `sink`.
    pub fn write_to<W: Write>(&mut self, mut sink: W) -> io::Result<u64> {
        let mut scratch = [0u8; 8 * 1024];
        let mut total = 0u64;
        loop {
            let n = self.read(&mut scratch)?;
            if n == 0 {
                return Ok(total);
            }
            sink.write_all(&scratch[..n])?;
            total += n as u64;
        }
    }

    /// Repositions the source and decoder to deliver the byte at `target`.
    ///
    /// `target` must be strictly inside the stream; end-of-stream
    /// positioning is handled without touching the source at all.
    #[tracing::instrument(skip(self), level = "debug")]
    fn seek_to(&mut self, target: u64) -> io::Result<()> {
        let location = self.map.locate(target).ok_or(Error::InvalidSeek)?;
        match self.reposition(location) {
            Ok(()) => {
                self.failed = None;
                Ok(())
            }
            Err(e) => {
                self.failed = Some(e.kind());
                self.ready = false;
                Err(e)
            }
        }
    }

    fn reposition(&mut self, location: Location) -> io::Result<()> {
        self.inner
            .get_mut()
            .seek(SeekFrom::Start(location.compressed_offset))?;
        // Keep the member in isolation while resolving the position, so a
        // residue landing exactly on the member end cannot slide into the
        // next header.
        self.inner.multistream(false);
        let resolved = self.resolve_in_member(location);
        self.inner.multistream(self.multistream);
        resolved
    }

    fn resolve_in_member(&mut self, location: Location) -> io::Result<()> {
        // Re-parses the member header at the mapped offset; a parse
        // failure here means the map does not describe this stream.
        self.inner.reset()?;
        if self.inner.is_terminated() {
            return Err(Error::UnexpectedEof.into());
        }
        let mut remaining = location.residue as usize;
        if remaining > 0 && self.discard.is_empty() {
            self.discard.resize(DISCARD_BUF_SIZE, 0);
        }
        while remaining > 0 {
            let want = remaining.min(self.discard.len());
            let n = self.inner.read(&mut self.discard[..want])?;
            if n == 0 {
                return Err(Error::UnexpectedEof.into());
            }
            remaining -= n;
        }
        Ok(())
    }
}

impl<R: Read + Seek> Read for SeekReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(kind) = self.failed {
            return Err(poisoned(kind));
        }
        if self.pos >= self.map.total_size() {
            return Ok(0);
        }
        if !self.ready {
            self.seek_to(self.pos)?;
            self.ready = true;
        }
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for SeekReader<R> {
    /// Seeks in the uncompressed stream.
    ///
    /// Targets outside `0..=total_size` fail with `InvalidSeek` before any
    /// I/O, leaving the current position untouched. Seeking to exactly
    /// `total_size` parks the reader at end of stream without decoding.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let total = self.map.total_size();
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => total.checked_add_signed(delta),
        };
        let target = match target.filter(|&t| t <= total) {
            Some(t) => t,
            None => return Err(Error::InvalidSeek.into()),
        };
        if target == self.pos && self.ready && self.failed.is_none() {
            return Ok(self.pos);
        }
        if target == total {
            // Logical EOF: no member to decode.
            self.failed = None;
            self.ready = false;
            self.pos = total;
            return Ok(total);
        }
        self.seek_to(target)?;
        self.pos = target;
        self.ready = true;
        Ok(target)
    }
}
