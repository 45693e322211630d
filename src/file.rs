//! Path-based compressed file handle.
//!
//! [`XzFile`] picks its read strategy when the file is opened: the
//! first bytes are sniffed, and only a file that starts with the .xz
//! magic is opened through the seek index.  Anything else (the legacy
//! alone format, raw streams) is read sequentially, so no index parse
//! is ever attempted against a container that cannot have one.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::codec::{CompressOptions, DecompressOptions, Format};
use crate::container::XZ_MAGIC;
use crate::error::{Result, XzError};
use crate::io_stream::{XzReader, XzWriter};
use crate::seek::SeekableXzReader;

enum Backend {
    Seekable(SeekableXzReader<File>),
    Sequential(XzReader<File>),
    Writer(XzWriter<File>),
    Closed,
}

/// A compressed file opened for reading or writing.
///
/// Reading an .xz file gives random access through [`Seek`]; other
/// formats read front to back and refuse to seek.
pub struct XzFile {
    backend: Backend,
}

impl XzFile {
    /// Open for reading with format auto-detection.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<XzFile> {
        Self::open_with(path, DecompressOptions::new())
    }

    /// Open for reading with explicit options.
    ///
    /// The seek index is only consulted when the file carries the .xz
    /// magic and `options` allow the xz format; a corrupt index is an
    /// error here rather than a silent downgrade to sequential access.
    pub fn open_with<P: AsRef<Path>>(path: P, options: DecompressOptions) -> Result<XzFile> {
        let mut file = File::open(path)?;
        let xz_format = matches!(options.format, Format::Auto | Format::Xz);
        let backend = if xz_format && detect_xz(&mut file)? {
            Backend::Seekable(SeekableXzReader::with_memlimit(file, options.memlimit)?)
        } else {
            Backend::Sequential(XzReader::with_options(file, options)?)
        };
        Ok(XzFile { backend })
    }

    /// Open for reading without the seek index, whatever the format.
    pub fn open_sequential<P: AsRef<Path>>(path: P, options: DecompressOptions) -> Result<XzFile> {
        let file = File::open(path)?;
        Ok(XzFile {
            backend: Backend::Sequential(XzReader::with_options(file, options)?),
        })
    }

    /// Create (or truncate) a file and compress into it with the
    /// default preset and check.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<XzFile> {
        Self::create_with(path, &CompressOptions::new())
    }

    pub fn create_with<P: AsRef<Path>>(path: P, options: &CompressOptions) -> Result<XzFile> {
        let file = File::create(path)?;
        Ok(XzFile {
            backend: Backend::Writer(XzWriter::with_options(file, options)?),
        })
    }

    /// Whether this handle supports [`Seek`].
    pub fn is_seekable(&self) -> bool {
        matches!(self.backend, Backend::Seekable(_))
    }

    /// Current uncompressed offset, for readers and writers alike.
    pub fn position(&self) -> u64 {
        match &self.backend {
            Backend::Seekable(r) => r.position(),
            Backend::Sequential(r) => r.position(),
            Backend::Writer(w) => w.position(),
            Backend::Closed => 0,
        }
    }

    /// Total uncompressed size; only known for indexed reads.
    pub fn uncompressed_size(&self) -> Option<u64> {
        match &self.backend {
            Backend::Seekable(r) => Some(r.uncompressed_size()),
            _ => None,
        }
    }

    /// Buffered decompressed bytes without advancing the position.
    pub fn peek(&mut self) -> Result<&[u8]> {
        match &mut self.backend {
            Backend::Seekable(r) => r.peek(),
            Backend::Sequential(r) => r.peek(),
            Backend::Writer(_) => Err(XzError::UnsupportedOperation(
                "peek on a file open for writing",
            )),
            Backend::Closed => Err(XzError::ClosedHandle),
        }
    }

    /// Close the handle.  A writer emits its stream trailer first.
    /// Idempotent.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.backend, Backend::Closed) {
            Backend::Writer(mut writer) => writer.try_finish(),
            _ => Ok(()),
        }
    }
}

impl Read for XzFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.backend {
            Backend::Seekable(r) => r.read(buf),
            Backend::Sequential(r) => r.read(buf),
            Backend::Writer(_) => Err(io::Error::from(XzError::UnsupportedOperation(
                "file is open for writing",
            ))),
            Backend::Closed => Err(io::Error::from(XzError::ClosedHandle)),
        }
    }
}

impl Write for XzFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.backend {
            Backend::Writer(w) => w.write(buf),
            Backend::Closed => Err(io::Error::from(XzError::ClosedHandle)),
            _ => Err(io::Error::from(XzError::UnsupportedOperation(
                "file is open for reading",
            ))),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.backend {
            Backend::Writer(w) => w.flush(),
            Backend::Closed => Err(io::Error::from(XzError::ClosedHandle)),
            _ => Ok(()),
        }
    }
}

impl Seek for XzFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.backend {
            Backend::Seekable(r) => r.seek(pos),
            Backend::Closed => Err(io::Error::from(XzError::ClosedHandle)),
            _ => Err(io::Error::from(XzError::NotSeekable)),
        }
    }
}

/// True when the file starts with the .xz stream magic.  Leaves the
/// file positioned at its start.
fn detect_xz(file: &mut File) -> Result<bool> {
    let mut magic = [0u8; XZ_MAGIC.len()];
    let mut filled = 0;
    while filled < magic.len() {
        let n = file.read(&mut magic[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    file.seek(SeekFrom::Start(0))?;
    Ok(filled == magic.len() && magic == XZ_MAGIC)
}
