use std::io::{self, Write};

/// A write-only wrapper that counts the bytes accepted by the inner sink.
///
/// The block compressor brackets each member emission with a counter
/// snapshot to learn the member's compressed length without seeking.
pub struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Bytes forwarded to the inner sink since construction or the last
    /// [`reset_written`](Self::reset_written).
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn reset_written(&mut self) {
        self.written = 0;
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
