//! Container index: per-stream block tables and the merged seek index.
//!
//! The authoritative metadata of an .xz file sits at its tail, so the
//! index is built strictly backward: footer, then the index structure
//! the footer points at, then a `blocks_size` hop over the block
//! payloads to the stream header.  Every backward step is bounds
//! checked against the start of the file; nothing is ever read from a
//! position derived from unvalidated arithmetic.
//!
//! The merged [`ContainerIndex`] is immutable after construction and is
//! owned by the seekable reader for the lifetime of the open file.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};

use crate::container::{
    ceil4, crc32, decode_stream_footer, decode_stream_header, decode_vli, StreamFlags,
    STREAM_HEADER_SIZE,
};
use crate::error::{Result, XzError};

/// One record of a decoded index structure: the sizes of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    /// Compressed size without end-of-block padding (header + data +
    /// check), as used for integrity accounting.
    pub unpadded_size: u64,
    pub uncompressed_size: u64,
}

/// A decoded per-stream index, before file offsets are assigned.
#[derive(Debug, Clone)]
pub struct RawIndex {
    pub records: Vec<IndexRecord>,
    /// Total on-disk bytes spanned by the blocks (padding included);
    /// the backward hop from the index to the stream header.
    pub blocks_size: u64,
    /// Sum of the records' uncompressed sizes.
    pub uncompressed_size: u64,
}

/// Decode a complete index structure.  `buf` must be exactly the
/// `backward_size` bytes the stream footer declared.
pub fn decode_index(buf: &[u8]) -> Result<RawIndex> {
    // Indicator, at least one count byte, padding to 4, CRC32.
    if buf.len() < 8 || buf.len() % 4 != 0 {
        return Err(XzError::EmptyOrCorruptContainer("index size is misaligned"));
    }
    if buf[0] != 0x00 {
        return Err(XzError::EmptyOrCorruptContainer("bad index indicator"));
    }
    let mut pos = 1usize;

    let (count, used) = decode_vli(&buf[pos..])?;
    pos += used;
    if count > buf.len() as u64 {
        // Each record needs at least two bytes; an honest count can
        // never exceed the encoded size.
        return Err(XzError::EmptyOrCorruptContainer("index record count too large"));
    }

    let mut records = Vec::with_capacity(count as usize);
    let mut blocks_size: u64 = 0;
    let mut uncompressed_size: u64 = 0;
    for _ in 0..count {
        let (unpadded_size, used) = decode_vli(&buf[pos..])?;
        pos += used;
        let (block_uncompressed, used) = decode_vli(&buf[pos..])?;
        pos += used;
        if unpadded_size == 0 {
            return Err(XzError::EmptyOrCorruptContainer("zero-sized block record"));
        }
        blocks_size = blocks_size
            .checked_add(ceil4(unpadded_size))
            .ok_or(XzError::EmptyOrCorruptContainer("block sizes overflow"))?;
        uncompressed_size = uncompressed_size
            .checked_add(block_uncompressed)
            .ok_or(XzError::EmptyOrCorruptContainer("uncompressed sizes overflow"))?;
        records.push(IndexRecord {
            unpadded_size,
            uncompressed_size: block_uncompressed,
        });
    }

    // Zero padding up to 4-byte alignment, then CRC32 over everything
    // before it.
    while pos % 4 != 0 {
        if pos >= buf.len() || buf[pos] != 0 {
            return Err(XzError::EmptyOrCorruptContainer("bad index padding"));
        }
        pos += 1;
    }
    if pos + 4 != buf.len() {
        return Err(XzError::EmptyOrCorruptContainer(
            "index size disagrees with footer",
        ));
    }
    if LittleEndian::read_u32(&buf[pos..pos + 4]) != crc32(&buf[..pos]) {
        return Err(XzError::EmptyOrCorruptContainer("index CRC mismatch"));
    }

    Ok(RawIndex {
        records,
        blocks_size,
        uncompressed_size,
    })
}

// ── Merged seek index ────────────────────────────────────────────────────────

/// One independently decodable block, with absolute positions in both
/// the compressed file and the logical uncompressed byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// File offset of the block's own header.
    pub compressed_file_offset: u64,
    /// Absolute offset of the block's first uncompressed byte.
    pub uncompressed_file_offset: u64,
    pub unpadded_size: u64,
    pub uncompressed_size: u64,
}

impl BlockInfo {
    /// On-disk size including end-of-block padding.
    pub fn total_size(&self) -> u64 {
        ceil4(self.unpadded_size)
    }

    pub fn uncompressed_end(&self) -> u64 {
        self.uncompressed_file_offset + self.uncompressed_size
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.uncompressed_file_offset && offset < self.uncompressed_end()
    }
}

/// One stream of the container, blocks in file order with absolute
/// offsets already assigned.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub flags: StreamFlags,
    /// File offset of the stream header.
    pub header_offset: u64,
    /// Absolute uncompressed offset of the stream's first byte.
    pub uncompressed_start: u64,
    pub uncompressed_size: u64,
    pub blocks: Vec<BlockInfo>,
}

impl StreamEntry {
    fn uncompressed_end(&self) -> u64 {
        self.uncompressed_start + self.uncompressed_size
    }
}

/// The merged index of every stream in the container, in file order.
#[derive(Debug, Clone)]
pub struct ContainerIndex {
    streams: Vec<StreamEntry>,
    uncompressed_size: u64,
}

impl ContainerIndex {
    /// Parse the whole container backward from end of file.
    ///
    /// Leaves the source position unspecified.
    pub fn build<R: Read + Seek>(source: &mut R) -> Result<ContainerIndex> {
        let file_size = source.seek(SeekFrom::End(0))?;
        if file_size == 0 {
            return Err(XzError::EmptyOrCorruptContainer("file is empty"));
        }

        let header_len = STREAM_HEADER_SIZE as u64;
        let mut pos = file_size;
        let mut streams: Vec<StreamEntry> = Vec::new();

        while pos > 0 {
            if pos < 2 * header_len {
                return Err(XzError::TruncatedContainer);
            }

            // Step backward over 4-byte-aligned zero padding between
            // streams.
            loop {
                let mut pad = [0u8; 4];
                read_exact_at(source, pos - 4, &mut pad)?;
                if pad != [0u8; 4] {
                    break;
                }
                pos -= 4;
                if pos < 2 * header_len {
                    return Err(XzError::EmptyOrCorruptContainer(
                        "only padding before start of file",
                    ));
                }
            }

            let footer_offset = pos - header_len;
            let mut buf = [0u8; STREAM_HEADER_SIZE];
            read_exact_at(source, footer_offset, &mut buf)?;
            let footer = decode_stream_footer(&buf)?;

            let index_offset = footer_offset
                .checked_sub(footer.backward_size)
                .filter(|&off| off >= header_len)
                .ok_or(XzError::EmptyOrCorruptContainer(
                    "index reaches past start of file",
                ))?;
            let mut index_buf = vec![0u8; footer.backward_size as usize];
            read_exact_at(source, index_offset, &mut index_buf)?;
            let raw = decode_index(&index_buf)?;

            let header_offset = index_offset
                .checked_sub(raw.blocks_size)
                .and_then(|off| off.checked_sub(header_len))
                .ok_or(XzError::EmptyOrCorruptContainer(
                    "blocks reach past start of file",
                ))?;
            read_exact_at(source, header_offset, &mut buf)?;
            let header_flags = decode_stream_header(&buf).map_err(|err| match err {
                XzError::FormatError => {
                    XzError::EmptyOrCorruptContainer("stream header magic mismatch")
                }
                other => other,
            })?;

            if header_flags != footer.flags {
                return Err(XzError::HeaderFooterMismatch);
            }

            // Assign offsets in forward order within the stream;
            // stream-global uncompressed offsets are fixed up once all
            // streams are known.
            let mut blocks = Vec::with_capacity(raw.records.len());
            let mut compressed = header_offset + header_len;
            let mut uncompressed = 0u64;
            for record in &raw.records {
                blocks.push(BlockInfo {
                    compressed_file_offset: compressed,
                    uncompressed_file_offset: uncompressed,
                    unpadded_size: record.unpadded_size,
                    uncompressed_size: record.uncompressed_size,
                });
                compressed += ceil4(record.unpadded_size);
                uncompressed += record.uncompressed_size;
            }

            streams.push(StreamEntry {
                flags: footer.flags,
                header_offset,
                uncompressed_start: 0,
                uncompressed_size: raw.uncompressed_size,
                blocks,
            });
            pos = header_offset;
        }

        // Parsing runs back to front; flip into file order and
        // accumulate the global uncompressed offsets.
        streams.reverse();
        let mut total = 0u64;
        for stream in &mut streams {
            stream.uncompressed_start = total;
            for block in &mut stream.blocks {
                block.uncompressed_file_offset += total;
            }
            total += stream.uncompressed_size;
        }

        Ok(ContainerIndex {
            streams,
            uncompressed_size: total,
        })
    }

    /// Total uncompressed size of the whole container.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    pub fn streams(&self) -> &[StreamEntry] {
        &self.streams
    }

    /// Map an absolute uncompressed offset to its stream and block.
    /// `None` means past end of file.
    pub fn locate(&self, offset: u64) -> Option<(&StreamEntry, &BlockInfo)> {
        if offset >= self.uncompressed_size {
            return None;
        }
        let si = self
            .streams
            .partition_point(|s| s.uncompressed_end() <= offset);
        let stream = self.streams.get(si)?;
        let bi = stream
            .blocks
            .partition_point(|b| b.uncompressed_end() <= offset);
        let block = stream.blocks.get(bi)?;
        debug_assert!(block.contains(offset));
        Some((stream, block))
    }
}

fn read_exact_at<R: Read + Seek>(source: &mut R, offset: u64, buf: &mut [u8]) -> Result<()> {
    source.seek(SeekFrom::Start(offset))?;
    source.read_exact(buf)?;
    Ok(())
}
