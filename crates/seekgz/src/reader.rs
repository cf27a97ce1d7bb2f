use crate::error::{poisoned, Error};
use crate::header::{Header, Trailer};
use flate2::{Crc, Decompress, FlushDecompress, Status};
use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::mem;

/// Streaming gzip reader.
///
/// Parses the leading member header eagerly, then decodes the payload on
/// demand. With multistream mode on (the default) member boundaries are
/// crossed transparently; with it off, `read` reports end of stream at
/// each boundary and [`reset`](Reader::reset) continues with the next
/// member.
///
/// The deflate state survives [`reset`](Reader::reset), so a single
/// reader can be repointed at many members without reallocating the
/// sliding window.
pub struct Reader<R> {
    src: R,
    inflate: Decompress,
    crc: Crc,
    multistream: bool,
    state: State,
    /// File name from the most recent member header.
    pub name: Option<String>,
    /// Modification time from the most recent member header; 0 = unset.
    pub mtime: u32,
    /// Comment from the most recent member header.
    pub comment: Option<String>,
    header: Header,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    /// Decoding the deflate payload of the current member.
    Payload,
    /// Member complete and multistream is off; reads report EOF until the
    /// next `reset`.
    Boundary,
    /// The source is cleanly exhausted.
    Eof,
    /// A decode error occurred; reads keep failing with this kind until a
    /// successful `reset`.
    Failed(io::ErrorKind),
}

impl<R: BufRead> Reader<R> {
    /// Wraps `src` and parses the first member header.
    ///
    /// An empty source is `UnexpectedEof`: a gzip stream has at least one
    /// member.
    pub fn new(src: R) -> io::Result<Self> {
        let mut this = Self::idle(src);
        this.begin_member()?;
        if this.state == State::Eof {
            return Err(Error::UnexpectedEof.into());
        }
        Ok(this)
    }

    /// A reader in the terminated state, performing no I/O until `reset`.
    pub(crate) fn idle(src: R) -> Self {
        Self {
            src,
            inflate: Decompress::new(false),
            crc: Crc::new(),
            multistream: true,
            state: State::Eof,
            name: None,
            mtime: 0,
            comment: None,
            header: Header::default(),
        }
    }

    /// When off, `read` returns 0 at each member boundary instead of
    /// continuing into the next member. Defaults to on.
    pub fn multistream(&mut self, on: bool) {
        self.multistream = on;
    }

    /// Metadata cached from the most recent member header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn get_ref(&self) -> &R {
        &self.src
    }

    /// Mutable access to the source. Repositioning it mid-member leaves
    /// the decoder out of sync until the next `reset`.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.src
    }

    /// Releases the decoder state and returns the source without closing
    /// it.
    pub fn into_inner(self) -> R {
        self.src
    }

    /// Discards all decode state and parses a member header at the
    /// source's current position, reusing the deflate allocation.
    ///
    /// A source already at EOF leaves the reader reporting a clean end of
    /// stream rather than an error.
    pub fn reset(&mut self) -> io::Result<()> {
        match self.begin_member() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = State::Failed(e.kind());
                Err(e)
            }
        }
    }

    /// Swaps in a new source, then [`reset`](Reader::reset)s against it.
    ///
    /// Returns the previous source; if the new source fails to parse, the
    /// previous source is dropped, the error is returned, and the reader
    /// stays poisoned until a later successful reset.
    pub fn reset_source(&mut self, src: R) -> io::Result<R> {
        let old = mem::replace(&mut self.src, src);
        self.reset()?;
        Ok(old)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.state == State::Eof
    }

    /// Parses the next member header, or records clean EOF if the source
    /// is exhausted.
    fn begin_member(&mut self) -> io::Result<()> {
        if self.src.fill_buf()?.is_empty() {
            self.state = State::Eof;
            return Ok(());
        }
        let header = Header::read_from(&mut self.src)?;
        self.name = header.name.clone();
        self.mtime = header.mtime;
        self.comment = header.comment.clone();
        self.header = header;
        self.inflate.reset(false);
        self.crc.reset();
        self.state = State::Payload;
        Ok(())
    }

    /// Runs the inflater until it produces output or the member ends.
    /// Returns the bytes written into `buf` (0 only at a member end).
    fn read_payload(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let input = self.src.fill_buf()?;
            let at_eof = input.is_empty();
            let consumed_before = self.inflate.total_in();
            let produced_before = self.inflate.total_out();
            let status = self
                .inflate
                .decompress(input, buf, FlushDecompress::None)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let consumed = (self.inflate.total_in() - consumed_before) as usize;
            let produced = (self.inflate.total_out() - produced_before) as usize;
            self.src.consume(consumed);
            self.crc.update(&buf[..produced]);

            match status {
                Status::StreamEnd => {
                    self.finish_member()?;
                    return Ok(produced);
                }
                Status::Ok | Status::BufError => {
                    if produced > 0 {
                        return Ok(produced);
                    }
                    if at_eof {
                        return Err(Error::UnexpectedEof.into());
                    }
                    if consumed == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "deflate decoder made no progress",
                        ));
                    }
                }
            }
        }
    }

    /// Validates the member trailer against the decoded payload, then
    /// either continues into the next member or stops at the boundary.
    fn finish_member(&mut self) -> io::Result<()> {
        let trailer = Trailer::read_from(&mut self.src)?;
        if trailer.crc32 != self.crc.sum() {
            return Err(Error::Checksum {
                expected: trailer.crc32,
                found: self.crc.sum(),
            }
            .into());
        }
        if trailer.isize != self.crc.amount() {
            return Err(Error::Checksum {
                expected: trailer.isize,
                found: self.crc.amount(),
            }
            .into());
        }
        tracing::trace!(len = self.crc.amount(), "gzip member validated");
        if self.multistream {
            self.begin_member()
        } else {
            self.state = State::Boundary;
            Ok(())
        }
    }

    /// Drains the remaining decompressed bytes into `sink`.
    ///
    /// Observably identical to calling `read` in a loop: stops at a member
    /// boundary when multistream is off, at clean end of stream otherwise.
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
}

impl<R: BufRead> Read for Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.state {
                State::Eof | State::Boundary => return Ok(0),
                State::Failed(kind) => return Err(poisoned(kind)),
                State::Payload => {}
            }
            match self.read_payload(buf) {
                Ok(0) => {
                    // Member ended without filling the caller's buffer;
                    // loop to pick up the next member or report EOF.
                }
                Ok(n) => return Ok(n),
                Err(e) => {
                    self.state = State::Failed(e.kind());
                    return Err(e);
                }
            }
        }
    }
}

/// This reader decodes forward only; a random-access variant needs a block
/// map, see [`SeekReader`](crate::seek::SeekReader).
impl<R: BufRead> Seek for Reader<R> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(Error::Unsupported.into())
    }
}
