//! Sequential streaming reader and writer.
//!
//! # Reader
//! [`XzReader`] pulls raw chunks from any byte source and feeds them
//! through a [`Decompressor`].  When one stream ends with bytes left
//! over, a fresh driver (same options) is seeded from `unused_data`,
//! so multiple concatenated compressed streams read back as one
//! continuous byte sequence.  A source that dries up mid-stream is a
//! [`XzError::PrematureEnd`].
//!
//! # Writer
//! [`XzWriter`] feeds a [`Compressor`] and forwards its output.  The
//! stream trailer is emitted by `finish`; dropping an unfinished
//! writer performs a best-effort finish.

use std::io::{self, BufRead, Read, Write};

use crate::codec::{CompressOptions, Compressor, DecompressOptions, Decompressor};
use crate::container::Check;
use crate::error::{Result, XzError};

/// Raw bytes pulled from the source per refill.
pub(crate) const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode {
    Reading,
    Exhausted,
    Closed,
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Decompressing reader over a sequential byte source.
///
/// `Read::read` returns whatever is buffered without forcing extra
/// pulls from the source; `read_to_end`/`read_exact` loop as usual.
/// `BufRead::fill_buf` doubles as peek.
pub struct XzReader<R: Read> {
    inner: R,
    options: DecompressOptions,
    codec: Decompressor,
    buffer: Vec<u8>,
    buffer_pos: usize,
    mode: ReadMode,
    position: u64,
}

impl<R: Read> XzReader<R> {
    /// Reader with format auto-detection and no memory limit.
    pub fn new(inner: R) -> Result<XzReader<R>> {
        Self::with_options(inner, DecompressOptions::new())
    }

    pub fn with_options(inner: R, options: DecompressOptions) -> Result<XzReader<R>> {
        let codec = Decompressor::new(&options)?;
        Ok(XzReader {
            inner,
            options,
            codec,
            buffer: Vec::new(),
            buffer_pos: 0,
            mode: ReadMode::Reading,
            position: 0,
        })
    }

    /// Uncompressed bytes delivered so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Integrity-check kind of the stream currently being read.
    pub fn check(&self) -> Check {
        self.codec.check()
    }

    /// Buffered decompressed bytes without advancing the position.
    /// Empty only at end of data.
    pub fn peek(&mut self) -> Result<&[u8]> {
        self.fill_buffer()?;
        Ok(&self.buffer[self.buffer_pos..])
    }

    /// Close the reader.  Idempotent; any later read fails with
    /// `ClosedHandle`.
    pub fn close(&mut self) {
        self.mode = ReadMode::Closed;
        self.buffer = Vec::new();
        self.buffer_pos = 0;
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Refill the readahead buffer.  `false` means end of data.
    fn fill_buffer(&mut self) -> Result<bool> {
        loop {
            if self.buffer_pos < self.buffer.len() {
                return Ok(true);
            }
            match self.mode {
                ReadMode::Closed => return Err(XzError::ClosedHandle),
                ReadMode::Exhausted => return Ok(false),
                ReadMode::Reading => {}
            }

            // Leftover bytes from a finished stream are consumed
            // before the source is touched again.
            let raw = if self.codec.unused_data().is_empty() {
                let mut chunk = vec![0u8; READ_CHUNK];
                let n = read_some(&mut self.inner, &mut chunk)?;
                chunk.truncate(n);
                chunk
            } else {
                self.codec.take_unused_data()
            };

            if raw.is_empty() {
                if self.codec.eof() {
                    self.mode = ReadMode::Exhausted;
                    return Ok(false);
                }
                return Err(XzError::PrematureEnd);
            }

            // Continue into the next concatenated stream.
            if self.codec.eof() {
                self.codec = Decompressor::new(&self.options)?;
            }

            self.buffer = self.codec.decompress(&raw)?;
            self.buffer_pos = 0;
        }
    }
}

impl<R: Read> Read for XzReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.fill_buffer()? {
            return Ok(0);
        }
        let avail = &self.buffer[self.buffer_pos..];
        let n = avail.len().min(buf.len());
        buf[..n].copy_from_slice(&avail[..n]);
        self.buffer_pos += n;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read> BufRead for XzReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.fill_buffer()?;
        Ok(&self.buffer[self.buffer_pos..])
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.buffer.len() - self.buffer_pos);
        self.buffer_pos += amt;
        self.position += amt as u64;
    }
}

/// `read` that retries on interruption and treats any progress as
/// success, so a short pull never masquerades as end of source.
fn read_some<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Compressing writer over any byte sink.
pub struct XzWriter<W: Write> {
    inner: Option<W>,
    codec: Compressor,
    position: u64,
    finished: bool,
}

impl<W: Write> XzWriter<W> {
    /// Writer producing an XZ stream with the default preset and
    /// CRC64 check.
    pub fn new(inner: W) -> Result<XzWriter<W>> {
        Self::with_options(inner, &CompressOptions::new())
    }

    pub fn with_options(inner: W, options: &CompressOptions) -> Result<XzWriter<W>> {
        Ok(XzWriter {
            inner: Some(inner),
            codec: Compressor::new(options)?,
            position: 0,
            finished: false,
        })
    }

    /// Uncompressed bytes accepted so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Emit the stream trailer.  Exactly once; a second call is a
    /// `UseAfterFinish` error.
    pub fn try_finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(XzError::UseAfterFinish("writer"));
        }
        self.finished = true;
        let tail = self.codec.flush()?;
        let inner = self.inner.as_mut().ok_or(XzError::ClosedHandle)?;
        inner.write_all(&tail)?;
        inner.flush()?;
        Ok(())
    }

    /// Finish the stream and hand back the sink.
    pub fn finish(mut self) -> Result<W> {
        self.try_finish()?;
        self.inner.take().ok_or(XzError::ClosedHandle)
    }
}

impl<W: Write> Write for XzWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(XzError::UseAfterFinish("writer").into());
        }
        let out = self.codec.compress(buf)?;
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::from(XzError::ClosedHandle))?;
        inner.write_all(&out)?;
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Err(io::Error::from(XzError::ClosedHandle)),
        }
    }
}

impl<W: Write> Drop for XzWriter<W> {
    fn drop(&mut self) {
        if !self.finished && self.inner.is_some() {
            let _ = self.try_finish();
        }
    }
}
