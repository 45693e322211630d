//! Random-access reader over an indexed container.
//!
//! # Block entry
//! The engine binding only exposes whole-stream decoding, so each block
//! is entered by seeding a fresh stream decoder with a synthesized
//! 12-byte stream header carrying the owning stream's flags.  The
//! decoder then parses the block's own header and verifies its
//! integrity check as usual; this reader merely feeds it exactly the
//! block's on-disk bytes and compares the output length against the
//! index record.
//!
//! # Seeking
//! A forward seek inside the current block decodes and discards; any
//! other target drops the cursor and re-enters the owning block from
//! its start.  Targets are clamped to `[0, uncompressed_size]`.

use std::io::{self, BufRead, Read, Seek, SeekFrom};

use crate::codec::{DecompressOptions, Decompressor, Format};
use crate::container::encode_stream_header;
use crate::container::index::{BlockInfo, ContainerIndex};
use crate::container::StreamFlags;
use crate::error::{Result, XzError};
use crate::io_stream::READ_CHUNK;

/// Decompressing reader with O(block) random access.
///
/// Construction parses the container index from the tail of the
/// source; reading then decodes one block at a time.
pub struct SeekableXzReader<R: Read + Seek> {
    inner: R,
    index: ContainerIndex,
    memlimit: Option<u64>,
    cursor: Option<BlockCursor>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    /// Uncompressed offset of the next byte to deliver.
    position: u64,
    closed: bool,
}

/// Decoding state for the block currently being read.
struct BlockCursor {
    codec: Decompressor,
    /// On-disk bytes of the block not yet fed to the decoder.
    budget: u64,
    /// Uncompressed bytes the decoder has emitted for this block.
    produced: u64,
    /// Uncompressed size the index recorded for this block.
    expected: u64,
    /// Absolute uncompressed offset one past the block's last byte.
    block_end: u64,
}

impl<R: Read + Seek> SeekableXzReader<R> {
    pub fn new(inner: R) -> Result<SeekableXzReader<R>> {
        Self::with_memlimit(inner, None)
    }

    /// The limit applies to each per-block decoder separately.
    pub fn with_memlimit(mut inner: R, memlimit: Option<u64>) -> Result<SeekableXzReader<R>> {
        let index = ContainerIndex::build(&mut inner)?;
        Ok(SeekableXzReader {
            inner,
            index,
            memlimit,
            cursor: None,
            buffer: Vec::new(),
            buffer_pos: 0,
            position: 0,
            closed: false,
        })
    }

    /// Total uncompressed size, known up front from the index.
    pub fn uncompressed_size(&self) -> u64 {
        self.index.uncompressed_size()
    }

    /// Current uncompressed read offset.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn index(&self) -> &ContainerIndex {
        &self.index
    }

    /// Buffered decompressed bytes without advancing the position.
    /// Empty only at end of data.
    pub fn peek(&mut self) -> Result<&[u8]> {
        self.fill_buffer()?;
        Ok(&self.buffer[self.buffer_pos..])
    }

    /// Close the reader.  Idempotent; any later read or seek fails
    /// with `ClosedHandle`.
    pub fn close(&mut self) {
        self.closed = true;
        self.cursor = None;
        self.buffer = Vec::new();
        self.buffer_pos = 0;
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Start decoding the block containing `offset`; the read position
    /// rewinds to the block's first byte.
    fn open_block_at(&mut self, offset: u64) -> Result<()> {
        let (flags, block) = {
            let (stream, block) = self
                .index
                .locate(offset)
                .ok_or(XzError::Internal("block lookup past end of data"))?;
            (stream.flags, *block)
        };
        let cursor = self.enter_block(flags, &block)?;
        self.cursor = Some(cursor);
        self.buffer = Vec::new();
        self.buffer_pos = 0;
        self.position = block.uncompressed_file_offset;
        Ok(())
    }

    fn enter_block(&mut self, flags: StreamFlags, block: &BlockInfo) -> Result<BlockCursor> {
        let mut options = DecompressOptions::new().format(Format::Xz);
        if let Some(limit) = self.memlimit {
            options = options.memlimit(limit);
        }
        let mut codec = Decompressor::new(&options)?;
        // A stream header alone produces no output.
        let fed = codec.decompress(&encode_stream_header(flags))?;
        debug_assert!(fed.is_empty());
        self.inner.seek(SeekFrom::Start(block.compressed_file_offset))?;
        Ok(BlockCursor {
            codec,
            budget: block.total_size(),
            produced: 0,
            expected: block.uncompressed_size,
            block_end: block.uncompressed_end(),
        })
    }

    /// Refill the readahead buffer.  `false` means end of data.
    fn fill_buffer(&mut self) -> Result<bool> {
        if self.closed {
            return Err(XzError::ClosedHandle);
        }
        loop {
            if self.buffer_pos < self.buffer.len() {
                return Ok(true);
            }
            let Some(cursor) = self.cursor.as_mut() else {
                if self.position >= self.index.uncompressed_size() {
                    return Ok(false);
                }
                self.open_block_at(self.position)?;
                continue;
            };

            if cursor.budget == 0 {
                // The whole block has been fed; the emitted length must
                // agree with the index record.
                if cursor.produced != cursor.expected {
                    return Err(XzError::CorruptData);
                }
                self.cursor = None;
                continue;
            }

            let want = cursor.budget.min(READ_CHUNK as u64) as usize;
            let mut chunk = vec![0u8; want];
            self.inner.read_exact(&mut chunk).map_err(|err| {
                if err.kind() == io::ErrorKind::UnexpectedEof {
                    XzError::TruncatedContainer
                } else {
                    XzError::Io(err)
                }
            })?;
            cursor.budget -= want as u64;

            let out = cursor.codec.decompress(&chunk)?;
            cursor.produced += out.len() as u64;
            if cursor.produced > cursor.expected {
                return Err(XzError::CorruptData);
            }
            self.buffer = out;
            self.buffer_pos = 0;
        }
    }

    /// Reposition to `target`, which must already be clamped.
    fn seek_to(&mut self, target: u64) -> Result<()> {
        if self.closed {
            return Err(XzError::ClosedHandle);
        }
        let within_block = match &self.cursor {
            Some(cursor) => target >= self.position && target < cursor.block_end,
            None => false,
        };
        if !within_block {
            self.cursor = None;
            self.buffer = Vec::new();
            self.buffer_pos = 0;
            self.position = target;
            if target >= self.index.uncompressed_size() {
                return Ok(());
            }
            self.open_block_at(target)?;
        }
        self.discard_until(target)
    }

    /// Decode and throw away bytes up to `target`.
    fn discard_until(&mut self, target: u64) -> Result<()> {
        while self.position < target {
            if !self.fill_buffer()? {
                return Err(XzError::Internal("seek target past decoded data"));
            }
            let avail = self.buffer.len() - self.buffer_pos;
            let skip = (target - self.position).min(avail as u64) as usize;
            self.buffer_pos += skip;
            self.position += skip as u64;
        }
        Ok(())
    }
}

impl<R: Read + Seek> Read for SeekableXzReader<R> {
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

impl<R: Read + Seek> BufRead for SeekableXzReader<R> {
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

impl<R: Read + Seek> Seek for SeekableXzReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let size = self.index.uncompressed_size();
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::End(n) => i128::from(size) + i128::from(n),
            SeekFrom::Current(n) => i128::from(self.position) + i128::from(n),
        };
        let target = target.clamp(0, i128::from(size)) as u64;
        self.seek_to(target)?;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CompressOptions, Compressor};
    use crate::container::Check;
    use std::io::Cursor;

    fn pack_with(data: &[u8], check: Check) -> Vec<u8> {
        let mut comp = Compressor::new(&CompressOptions::new().preset(1).check(check)).unwrap();
        let mut out = comp.compress(data).unwrap();
        out.extend(comp.flush().unwrap());
        out
    }

    /// Three concatenated streams: three blocks in the merged index.
    fn multi_block_container() -> (Vec<u8>, Vec<u8>) {
        let parts = [
            b"alpha segment ".repeat(100),
            b"beta segment ".repeat(200),
            b"gamma segment ".repeat(50),
        ];
        let mut plain = Vec::new();
        let mut packed = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            plain.extend_from_slice(part);
            let check = if i == 1 { Check::Crc32 } else { Check::Crc64 };
            packed.extend(pack_with(part, check));
        }
        (plain, packed)
    }

    #[test]
    fn sequential_read_matches_plain() {
        let (plain, packed) = multi_block_container();
        let mut reader = SeekableXzReader::new(Cursor::new(packed)).unwrap();
        assert_eq!(reader.uncompressed_size(), plain.len() as u64);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn seek_lands_on_exact_bytes() {
        let (plain, packed) = multi_block_container();
        let mut reader = SeekableXzReader::new(Cursor::new(packed)).unwrap();

        // Forward, backward, cross-block and same-block targets.
        let targets = [
            plain.len() as u64 - 1,
            0,
            plain.len() as u64 / 2,
            plain.len() as u64 / 2 + 7,
            17,
        ];
        for &target in &targets {
            let landed = reader.seek(SeekFrom::Start(target)).unwrap();
            assert_eq!(landed, target);
            let mut byte = [0u8; 1];
            reader.read_exact(&mut byte).unwrap();
            assert_eq!(byte[0], plain[target as usize], "offset {target}");
        }
    }

    #[test]
    fn seek_clamps_to_bounds() {
        let (plain, packed) = multi_block_container();
        let mut reader = SeekableXzReader::new(Cursor::new(packed)).unwrap();

        let landed = reader.seek(SeekFrom::Current(-100)).unwrap();
        assert_eq!(landed, 0);
        let landed = reader.seek(SeekFrom::End(1_000_000)).unwrap();
        assert_eq!(landed, plain.len() as u64);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn relative_and_end_seeks() {
        let (plain, packed) = multi_block_container();
        let mut reader = SeekableXzReader::new(Cursor::new(packed)).unwrap();

        reader.seek(SeekFrom::Start(100)).unwrap();
        let landed = reader.seek(SeekFrom::Current(50)).unwrap();
        assert_eq!(landed, 150);
        let landed = reader.seek(SeekFrom::End(-10)).unwrap();
        assert_eq!(landed, plain.len() as u64 - 10);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, &plain[plain.len() - 10..]);
    }

    #[test]
    fn corrupt_block_payload_fails_on_read_not_open() {
        let (_, mut packed) = multi_block_container();
        // Flip a byte inside the first block's compressed data; the
        // index at the tail stays intact so opening succeeds.
        packed[20] ^= 0xFF;
        let mut reader = SeekableXzReader::new(Cursor::new(packed)).unwrap();
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
    }

    #[test]
    fn closed_reader_rejects_everything() {
        let (_, packed) = multi_block_container();
        let mut reader = SeekableXzReader::new(Cursor::new(packed)).unwrap();
        reader.close();
        let mut buf = [0u8; 1];
        assert!(reader.read(&mut buf).is_err());
        assert!(reader.seek(SeekFrom::Start(0)).is_err());
    }
}
