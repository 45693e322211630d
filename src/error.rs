//! Crate-wide error taxonomy.
//!
//! Every non-success status reported by the liblzma engine maps to
//! exactly one variant here and aborts the call that produced it;
//! there is no partial-success recovery and no retry at this layer.
//! Index-construction failures (`TruncatedContainer`,
//! `EmptyOrCorruptContainer`, `HeaderFooterMismatch`) abort the whole
//! open operation.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, XzError>;

#[derive(Error, Debug)]
pub enum XzError {
    /// The engine reported corrupt compressed data (includes failed
    /// integrity checks).
    #[error("corrupt compressed data")]
    CorruptData,

    /// The stream declares an integrity check this build of the engine
    /// cannot verify.
    #[error("integrity check type is not supported")]
    UnsupportedCheck,

    /// Decoding would exceed the configured memory usage limit.
    #[error("memory usage limit exceeded")]
    MemLimitExceeded,

    /// The engine failed to allocate memory.
    #[error("memory allocation failed")]
    MemoryError,

    /// The input is not in the expected container format.
    #[error("input format not recognized")]
    FormatError,

    /// Bad preset, filter chain or option combination. Raised eagerly,
    /// before an engine handle is created, wherever possible.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The byte source ran out before the stream's end marker.
    #[error("compressed data ended before the end-of-stream marker was reached")]
    PrematureEnd,

    /// The file is too small to hold even one stream header and footer.
    #[error("file too small to be an xz container")]
    TruncatedContainer,

    /// Backward container parsing failed structurally.
    #[error("empty or corrupt container: {0}")]
    EmptyOrCorruptContainer(&'static str),

    /// Stream header flags and stream footer flags disagree.
    #[error("stream header and stream footer do not match")]
    HeaderFooterMismatch,

    /// Operation on a driver that already reached its terminal state
    /// (decompressor past end-of-stream, compressor already flushed).
    #[error("{0} already finished")]
    UseAfterFinish(&'static str),

    /// Operation on a closed file handle. `close` itself is idempotent.
    #[error("I/O operation on closed file")]
    ClosedHandle,

    /// Seek requested on a source or format without random access.
    #[error("underlying stream or format does not support seeking")]
    NotSeekable,

    /// Operation not supported by the handle's open mode.
    #[error("operation not supported: {0}")]
    UnsupportedOperation(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Engine-internal failure that indicates a bug, not bad input.
    #[error("internal engine error: {0}")]
    Internal(&'static str),
}

impl From<xz2::stream::Error> for XzError {
    fn from(err: xz2::stream::Error) -> Self {
        use xz2::stream::Error;
        match err {
            Error::Data => XzError::CorruptData,
            Error::UnsupportedCheck | Error::NoCheck => XzError::UnsupportedCheck,
            Error::MemLimit => XzError::MemLimitExceeded,
            Error::Mem => XzError::MemoryError,
            Error::Format => XzError::FormatError,
            Error::Options => XzError::InvalidOptions("rejected by the engine".into()),
            Error::Program => XzError::Internal("engine reported a programming error"),
        }
    }
}

impl From<XzError> for io::Error {
    fn from(err: XzError) -> Self {
        match err {
            XzError::Io(e) => e,
            XzError::PrematureEnd => io::Error::new(io::ErrorKind::UnexpectedEof, err.to_string()),
            XzError::CorruptData
            | XzError::FormatError
            | XzError::TruncatedContainer
            | XzError::EmptyOrCorruptContainer(_)
            | XzError::HeaderFooterMismatch => {
                io::Error::new(io::ErrorKind::InvalidData, err.to_string())
            }
            XzError::NotSeekable | XzError::UnsupportedOperation(_) => {
                io::Error::new(io::ErrorKind::Unsupported, err.to_string())
            }
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}
