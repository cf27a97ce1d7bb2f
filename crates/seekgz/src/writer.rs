use crate::count::CountingWriter;
use crate::error::{poisoned, Error};
use crate::header::{Header, Trailer, XFL_BEST, XFL_FASTEST};
use crate::map::BlockMap;
use crate::DEFAULT_BLOCK_SIZE;
use flate2::{Compress, Compression, Crc, FlushCompress, Status};
use std::io::{self, Write};

/// Deflate output is drained through this scratch buffer; member emission
/// never allocates per block.
const OUT_BUF_SIZE: usize = 32 * 1024;

/// Compresses a byte stream into fixed-size, independently decodable gzip
/// members, recording each member's compressed length in a [`BlockMap`].
///
/// The deflate dictionary is reset at every block boundary. That costs
/// some ratio (no matches reach across blocks) and buys the whole point:
/// a reader can start decoding at any member the map points at.
pub struct Writer<W: Write> {
    sink: CountingWriter<W>,
    deflate: Compress,
    crc: Crc,
    header: Header,
    xfl: u8,
    block_size: u32,
    /// Staging buffer; holds strictly less than `block_size` bytes between
    /// calls.
    buf: Vec<u8>,
    out: Vec<u8>,
    map: BlockMap,
    total_in: u64,
    state: State,
}

#[derive(Copy, Clone)]
enum State {
    /// No member emitted yet; the header may still change.
    Fresh,
    Open,
    Poisoned(io::ErrorKind),
}

fn compression_for_level(level: i32) -> Result<Compression, Error> {
    match level {
        // Huffman-only: flate2 exposes no entropy-only strategy, so the
        // fastest setting stands in at the same end of the trade-off.
        -2 => Ok(Compression::fast()),
        -1 => Ok(Compression::default()),
        0..=9 => Ok(Compression::new(level as u32)),
        _ => Err(Error::InvalidLevel(level)),
    }
}

fn xfl_for(level: Compression) -> u8 {
    match level.level() {
        9 => XFL_BEST,
        1 => XFL_FASTEST,
        _ => 0,
    }
}

impl<W: Write> Writer<W> {
    /// Wraps `sink` with the default level and [`DEFAULT_BLOCK_SIZE`].
    pub fn new(sink: W) -> Self {
        Self::with_level(sink, -1).expect("default level is valid")
    }

    /// Wraps `sink`, forwarding `level` to the deflate encoder.
    ///
    /// Accepted levels are -2 (Huffman-only), -1 (default), 0 (stored),
    /// and 1..=9 (fastest..best); anything else fails here, before any
    /// byte is written.
    pub fn with_level(sink: W, level: i32) -> Result<Self, Error> {
        Self::with_level_and_block_size(sink, level, DEFAULT_BLOCK_SIZE)
    }

    /// Like [`with_level`](Self::with_level) with an explicit block size.
    ///
    /// A zero `block_size` fails construction, like an out-of-range level.
    pub fn with_level_and_block_size(
        sink: W,
        level: i32,
        block_size: u32,
    ) -> Result<Self, Error> {
        let compression = compression_for_level(level)?;
        if block_size == 0 {
            return Err(Error::InvalidBlockSize);
        }
        Ok(Self {
            sink: CountingWriter::new(sink),
            deflate: Compress::new(compression, false),
            crc: Crc::new(),
            header: Header::default(),
            xfl: xfl_for(compression),
            block_size,
            buf: Vec::with_capacity(block_size as usize),
            out: vec![0; OUT_BUF_SIZE],
            map: BlockMap::new(block_size),
            total_in: 0,
            state: State::Fresh,
        })
    }

    /// Sets the metadata emitted in every member header.
    ///
    /// Must be called before the first block is emitted; once a member is
    /// on the wire the header is fixed for the life of the stream.
    pub fn set_header(&mut self, header: Header) -> io::Result<()> {
        match self.state {
            State::Fresh => {
                header.validate()?;
                self.header = header;
                Ok(())
            }
            State::Open => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "header is fixed once the first member is emitted",
            )),
            State::Poisoned(kind) => Err(poisoned(kind)),
        }
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Uncompressed bytes accepted so far.
    #[must_use]
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    fn check_open(&self) -> io::Result<()> {
        match self.state {
            State::Fresh | State::Open => Ok(()),
            State::Poisoned(kind) => Err(poisoned(kind)),
        }
    }

    /// Emits the staged bytes as one self-contained gzip member and
    /// records its compressed length.
    fn emit_block(&mut self) -> io::Result<()> {
        let start = self.sink.written();
        self.header.write_to(&mut self.sink, self.xfl)?;

        // Fresh dictionary per member: this is what makes members
        // independently decodable.
        self.deflate.reset();
        self.crc.reset();
        self.crc.update(&self.buf);

        let mut pos = 0;
        loop {
            let consumed_before = self.deflate.total_in();
            let produced_before = self.deflate.total_out();
            let status = self
                .deflate
                .compress(&self.buf[pos..], &mut self.out, FlushCompress::Finish)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let consumed = (self.deflate.total_in() - consumed_before) as usize;
            let produced = (self.deflate.total_out() - produced_before) as usize;
            pos += consumed;
            self.sink.write_all(&self.out[..produced])?;
            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if consumed == 0 && produced == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::Other,
                            "deflate encoder made no progress",
                        ));
                    }
                }
            }
        }

        Trailer {
            crc32: self.crc.sum(),
            isize: self.buf.len() as u32,
        }
        .write_to(&mut self.sink)?;

        let member_len = self.sink.written() - start;
        let member_len = u32::try_from(member_len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "member exceeds u32 range"))?;
        self.map.push_length(member_len);
        self.total_in += self.buf.len() as u64;
        tracing::trace!(
            block = self.map.len() - 1,
            uncompressed = self.buf.len(),
            compressed = member_len,
            "emitted gzip member"
        );
        self.buf.clear();
        self.state = State::Open;
        Ok(())
    }

    fn poison(&mut self, err: &io::Error) {
        self.state = State::Poisoned(err.kind());
    }

    /// Flushes the trailing (possibly empty) block, finalizes the map, and
    /// returns the sink together with it.
    ///
    /// An empty stream still emits exactly one empty member, so the map is
    /// never empty. The sink is flushed but not closed.
    pub fn finish(mut self) -> io::Result<(W, BlockMap)> {
        self.check_open()?;
        if !self.buf.is_empty() || self.map.is_empty() {
            self.emit_block()?;
        }
        self.sink.flush()?;
        self.map.set_total_size(self.total_in);
        Ok((self.sink.into_inner(), self.map))
    }
}

impl<W: Write> Write for Writer<W> {
    /// Accepts any length, splitting exactly at block boundaries; a block
    /// never stages more than `block_size` bytes.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        let mut rest = buf;
        while !rest.is_empty() {
            let room = self.block_size as usize - self.buf.len();
            let (chunk, tail) = rest.split_at(room.min(rest.len()));
            self.buf.extend_from_slice(chunk);
            rest = tail;
            if self.buf.len() == self.block_size as usize {
                if let Err(e) = self.emit_block() {
                    self.poison(&e);
                    return Err(e);
                }
            }
        }
        Ok(buf.len())
    }

    /// Flushes the sink. Block boundaries are fixed by `block_size`; a
    /// flush never cuts a member early.
    fn flush(&mut self) -> io::Result<()> {
        self.check_open()?;
        if let Err(e) = self.sink.flush() {
            self.poison(&e);
            return Err(e);
        }
        Ok(())
    }
}
