//! Streaming .xz compression and decompression with random access.
//!
//! The crate drives liblzma through incremental codec handles and adds
//! the container-level machinery the engine itself does not provide:
//! sequential readers and writers over any byte stream, a backward
//! parser for the container's tail-end index, and a seekable reader
//! that decodes single blocks on demand.
//!
//! # One-shot
//! ```
//! use xzseek::{compress, decompress, CompressOptions, DecompressOptions};
//!
//! let packed = compress(b"hello", &CompressOptions::new())?;
//! let plain = decompress(&packed, &DecompressOptions::new())?;
//! assert_eq!(plain, b"hello");
//! # Ok::<(), xzseek::XzError>(())
//! ```
//!
//! # Streaming and random access
//! [`XzReader`] and [`XzWriter`] wrap any `Read`/`Write`;
//! [`SeekableXzReader`] wraps a `Read + Seek` source and implements
//! `Seek` over the uncompressed byte sequence.  [`XzFile`] ties both
//! to a filesystem path and picks the strategy from the file's magic.

pub mod codec;
pub mod container;
pub mod error;
pub mod file;
pub mod filter;
pub mod io_stream;
pub mod seek;

pub use codec::{CompressOptions, Compressor, DecompressOptions, Decompressor, Format};
pub use container::index::{BlockInfo, ContainerIndex, StreamEntry};
pub use container::Check;
pub use error::{Result, XzError};
pub use file::XzFile;
pub use filter::{
    Filter, FilterChain, LzmaFilterOptions, MatchFinder, Mode, FILTERS_MAX, PRESET_DEFAULT,
    PRESET_EXTREME,
};
pub use io_stream::{XzReader, XzWriter};
pub use seek::SeekableXzReader;

/// Compress `data` into a single complete stream.
pub fn compress(data: &[u8], options: &CompressOptions) -> Result<Vec<u8>> {
    let mut comp = Compressor::new(options)?;
    let mut out = comp.compress(data)?;
    out.extend(comp.flush()?);
    Ok(out)
}

/// Decompress a buffer holding one or more concatenated streams.
///
/// Every stream must be complete; data that ends before an
/// end-of-stream marker is a [`XzError::PrematureEnd`].
pub fn decompress(data: &[u8], options: &DecompressOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut remaining = data.to_vec();
    loop {
        let mut decomp = Decompressor::new(options)?;
        out.extend(decomp.decompress(&remaining)?);
        if !decomp.eof() {
            return Err(XzError::PrematureEnd);
        }
        remaining = decomp.take_unused_data();
        if remaining.is_empty() {
            return Ok(out);
        }
    }
}
