//! Incremental (de)compression drivers over the liblzma engine.
//!
//! # Drive loop
//! The engine consumes a bounded input slice and writes into a bounded
//! output buffer; how much output a given input produces is
//! unpredictable in both directions.  [`Compressor`] and
//! [`Decompressor`] therefore drive the engine against a growable
//! output `Vec`: 8 KiB up front, then 512-byte reservations each time
//! the engine fills the buffer without finishing, so a tiny tail never
//! forces another large allocation.
//!
//! # Terminal states
//! A decompressor that has seen the end-of-stream marker and a
//! compressor that has been flushed are finished for good; further
//! calls are caller bugs and fail with `UseAfterFinish`.  Input bytes
//! left over after the end marker belong to a following concatenated
//! stream and are kept verbatim in `unused_data`.
//!
//! Each driver exclusively owns its engine handle; `&mut self`
//! receivers make concurrent reentry impossible and `Drop` releases
//! the handle exactly once on every exit path.

use xz2::stream::{Action, Status, Stream};

use crate::container::{decode_stream_header, Check, STREAM_HEADER_SIZE, XZ_MAGIC};
use crate::error::{Result, XzError};
use crate::filter::{validate_preset, FilterChain, LzmaFilterOptions, PRESET_DEFAULT};

/// Initial output buffer capacity per drive call.
const INITIAL_BUFSIZE: usize = 8 * 1024;
/// Growth step once the initial buffer is exhausted.
const GROW_BUFSIZE: usize = 512;

/// Container format selector.
///
/// `Auto` sniffs XZ vs. legacy alone format and is decode-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Auto,
    Xz,
    Alone,
}

// ── Options ──────────────────────────────────────────────────────────────────

/// Compressor configuration.  Validated eagerly on driver construction.
#[derive(Debug, Clone, Default)]
pub struct CompressOptions {
    pub format: Option<Format>,
    pub check: Option<Check>,
    pub preset: Option<u32>,
    pub filters: Option<FilterChain>,
}

impl CompressOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.check = Some(check);
        self
    }

    pub fn preset(mut self, preset: u32) -> Self {
        self.preset = Some(preset);
        self
    }

    pub fn filters(mut self, filters: FilterChain) -> Self {
        self.filters = Some(filters);
        self
    }

    fn build_engine(&self) -> Result<Stream> {
        let format = self.format.unwrap_or(Format::Xz);
        if self.preset.is_some() && self.filters.is_some() {
            return Err(XzError::InvalidOptions(
                "cannot specify both a preset and a filter chain".into(),
            ));
        }
        if format != Format::Xz && !matches!(self.check, None | Some(Check::None)) {
            return Err(XzError::InvalidOptions(
                "integrity checks are only supported by the xz format".into(),
            ));
        }
        match format {
            Format::Auto => Err(XzError::InvalidOptions(
                "auto format is only meaningful for decompression".into(),
            )),
            Format::Xz => {
                let check = self
                    .check
                    .unwrap_or(Check::Crc64)
                    .to_engine()
                    .ok_or_else(|| {
                        XzError::InvalidOptions("cannot encode an unknown check kind".into())
                    })?;
                if let Some(chain) = &self.filters {
                    Ok(Stream::new_stream_encoder(&chain.to_engine()?, check)?)
                } else {
                    let preset = self.preset.unwrap_or(PRESET_DEFAULT);
                    validate_preset(preset)?;
                    Ok(Stream::new_easy_encoder(preset, check)?)
                }
            }
            Format::Alone => {
                if self.filters.is_some() {
                    return Err(XzError::InvalidOptions(
                        "the alone format does not take a filter chain".into(),
                    ));
                }
                let preset = self.preset.unwrap_or(PRESET_DEFAULT);
                validate_preset(preset)?;
                let opts = LzmaFilterOptions::new(preset).engine_options()?;
                Ok(Stream::new_lzma_encoder(&opts)?)
            }
        }
    }
}

/// Decompressor configuration.  `Clone` so a sequential reader can
/// spin up a fresh driver for every concatenated stream.
#[derive(Debug, Clone, Default)]
pub struct DecompressOptions {
    pub format: Format,
    pub memlimit: Option<u64>,
}

impl DecompressOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn memlimit(mut self, limit: u64) -> Self {
        self.memlimit = Some(limit);
        self
    }

    fn build_engine(&self) -> Result<Stream> {
        let memlimit = self.memlimit.unwrap_or(u64::MAX);
        match self.format {
            Format::Auto => Ok(Stream::new_auto_decoder(memlimit, 0)?),
            Format::Xz => Ok(Stream::new_stream_decoder(memlimit, 0)?),
            Format::Alone => Ok(Stream::new_lzma_decoder(memlimit)?),
        }
    }
}

// ── Drive loop ───────────────────────────────────────────────────────────────

struct Driven {
    output: Vec<u8>,
    consumed: usize,
    stream_end: bool,
}

/// Push `data` through the engine until it is fully consumed (RUN) or
/// the stream ends (FINISH), growing the output buffer as needed.
fn drive(engine: &mut Stream, data: &[u8], finish: bool) -> Result<Driven> {
    let mut output = Vec::with_capacity(INITIAL_BUFSIZE);
    let mut input = data;
    let mut stream_end = false;

    loop {
        if output.len() == output.capacity() {
            output.reserve(GROW_BUFSIZE);
        }
        let action = if finish { Action::Finish } else { Action::Run };
        let before = engine.total_in();
        let status = engine.process_vec(input, &mut output, action)?;
        input = &input[(engine.total_in() - before) as usize..];

        match status {
            Status::StreamEnd => {
                stream_end = true;
                break;
            }
            Status::MemNeeded if input.is_empty() && output.len() < output.capacity() => {
                // Output space is available, so the engine is stalled
                // on input it will never get.
                if finish {
                    return Err(XzError::PrematureEnd);
                }
                break;
            }
            _ => {}
        }
        if !finish && input.is_empty() && output.len() < output.capacity() {
            // RUN: everything consumed and no output is pending.
            break;
        }
    }

    Ok(Driven {
        consumed: data.len() - input.len(),
        output,
        stream_end,
    })
}

// ── Compressor ───────────────────────────────────────────────────────────────

/// Incremental compressor.  Feed chunks with [`compress`], then call
/// [`flush`] exactly once to emit the stream trailer.
///
/// [`compress`]: Compressor::compress
/// [`flush`]: Compressor::flush
pub struct Compressor {
    engine: Stream,
    flushed: bool,
}

impl Compressor {
    pub fn new(options: &CompressOptions) -> Result<Compressor> {
        Ok(Compressor {
            engine: options.build_engine()?,
            flushed: false,
        })
    }

    /// Compress a chunk, returning whatever output the engine produced
    /// for it (possibly empty; the engine buffers freely).
    pub fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if self.flushed {
            return Err(XzError::UseAfterFinish("compressor"));
        }
        let driven = drive(&mut self.engine, data, false)?;
        debug_assert_eq!(driven.consumed, data.len());
        Ok(driven.output)
    }

    /// Finish the stream and return all remaining output.  May be
    /// called exactly once; the compressor is unusable afterwards.
    pub fn flush(&mut self) -> Result<Vec<u8>> {
        if self.flushed {
            return Err(XzError::UseAfterFinish("compressor"));
        }
        self.flushed = true;
        let driven = drive(&mut self.engine, &[], true)?;
        debug_assert!(driven.stream_end);
        Ok(driven.output)
    }
}

// ── Decompressor ─────────────────────────────────────────────────────────────

/// Incremental decompressor for one stream.
///
/// After [`eof`] turns true the driver is finished; bytes that were
/// fed but belong to a following concatenated stream sit in
/// [`unused_data`].
///
/// [`eof`]: Decompressor::eof
/// [`unused_data`]: Decompressor::unused_data
pub struct Decompressor {
    engine: Stream,
    eof: bool,
    unused_data: Vec<u8>,
    check: Check,
    sniff: Option<Vec<u8>>,
}

impl Decompressor {
    pub fn new(options: &DecompressOptions) -> Result<Decompressor> {
        let engine = options.build_engine()?;
        // The check kind is declared in the stream header; formats
        // without one report it immediately.
        let (check, sniff) = match options.format {
            Format::Auto | Format::Xz => {
                (Check::Unknown, Some(Vec::with_capacity(STREAM_HEADER_SIZE)))
            }
            Format::Alone => (Check::None, None),
        };
        Ok(Decompressor {
            engine,
            eof: false,
            unused_data: Vec::new(),
            check,
            sniff,
        })
    }

    /// Decompress a chunk.  All of `data` is consumed unless the
    /// stream's end marker is reached first.
    pub fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if self.eof {
            return Err(XzError::UseAfterFinish("decompressor"));
        }
        self.sniff_check(data);
        let driven = drive(&mut self.engine, data, false)?;
        if driven.stream_end {
            self.eof = true;
            self.unused_data = data[driven.consumed..].to_vec();
        }
        Ok(driven.output)
    }

    /// True once the end-of-stream marker has been decoded.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Bytes fed past the end of the stream, verbatim.  They are the
    /// head of the next concatenated stream or trailing garbage; the
    /// caller decides which.
    pub fn unused_data(&self) -> &[u8] {
        &self.unused_data
    }

    /// Take ownership of the leftover bytes, leaving them empty.
    pub(crate) fn take_unused_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.unused_data)
    }

    /// The stream's integrity-check kind, `Unknown` until enough
    /// header bytes have been processed to tell.
    pub fn check(&self) -> Check {
        self.check
    }

    /// The engine binding exposes no check query, so the kind is read
    /// from the same 12 header bytes the engine parses.
    fn sniff_check(&mut self, data: &[u8]) {
        let Some(header) = &mut self.sniff else {
            return;
        };
        let need = STREAM_HEADER_SIZE - header.len();
        header.extend_from_slice(&data[..need.min(data.len())]);
        if header.len() < STREAM_HEADER_SIZE {
            return;
        }
        if header[..6] == XZ_MAGIC {
            if let Ok(flags) = decode_stream_header(header) {
                self.check = flags.check();
            }
        } else {
            // Auto format fell through to the legacy alone decoder,
            // which carries no integrity check.
            self.check = Check::None;
        }
        self.sniff = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xz_options() -> CompressOptions {
        CompressOptions::new().preset(1)
    }

    #[test]
    fn incremental_roundtrip() {
        let data = b"incremental codec driver roundtrip payload".repeat(64);

        let mut comp = Compressor::new(&xz_options()).unwrap();
        let mut packed = Vec::new();
        for chunk in data.chunks(97) {
            packed.extend(comp.compress(chunk).unwrap());
        }
        packed.extend(comp.flush().unwrap());

        let mut decomp = Decompressor::new(&DecompressOptions::new()).unwrap();
        let out = decomp.decompress(&packed).unwrap();
        assert_eq!(out, data);
        assert!(decomp.eof());
        assert!(decomp.unused_data().is_empty());
    }

    #[test]
    fn flush_twice_is_use_after_finish() {
        let mut comp = Compressor::new(&xz_options()).unwrap();
        comp.flush().unwrap();
        assert!(matches!(comp.flush(), Err(XzError::UseAfterFinish(_))));
        assert!(matches!(
            comp.compress(b"late"),
            Err(XzError::UseAfterFinish(_))
        ));
    }

    #[test]
    fn decompress_after_eof_is_use_after_finish() {
        let packed = {
            let mut comp = Compressor::new(&xz_options()).unwrap();
            let mut out = comp.compress(b"x").unwrap();
            out.extend(comp.flush().unwrap());
            out
        };
        let mut decomp = Decompressor::new(&DecompressOptions::new()).unwrap();
        decomp.decompress(&packed).unwrap();
        assert!(decomp.eof());
        assert!(matches!(
            decomp.decompress(b"more"),
            Err(XzError::UseAfterFinish(_))
        ));
    }

    #[test]
    fn trailing_bytes_land_in_unused_data() {
        let mut comp = Compressor::new(&xz_options()).unwrap();
        let mut packed = comp.compress(b"payload").unwrap();
        packed.extend(comp.flush().unwrap());
        let trailer = b"NOT-XZ-DATA";
        packed.extend_from_slice(trailer);

        let mut decomp = Decompressor::new(&DecompressOptions::new()).unwrap();
        let out = decomp.decompress(&packed).unwrap();
        assert_eq!(out, b"payload");
        assert!(decomp.eof());
        assert_eq!(decomp.unused_data(), trailer);
    }

    #[test]
    fn check_kind_is_sniffed_from_header() {
        let mut comp = Compressor::new(&xz_options().check(Check::Crc32)).unwrap();
        let mut packed = comp.compress(b"checked").unwrap();
        packed.extend(comp.flush().unwrap());

        let mut decomp = Decompressor::new(&DecompressOptions::new()).unwrap();
        assert_eq!(decomp.check(), Check::Unknown);
        // Feed byte by byte: the kind must appear once the 12-byte
        // header has been seen, well before eof.
        for (i, byte) in packed.iter().enumerate() {
            decomp.decompress(std::slice::from_ref(byte)).unwrap();
            if i + 1 >= STREAM_HEADER_SIZE {
                assert_eq!(decomp.check(), Check::Crc32);
            }
        }
        assert!(decomp.eof());
    }

    #[test]
    fn option_conflicts_are_rejected_eagerly() {
        let both = CompressOptions::new()
            .preset(3)
            .filters(crate::filter::FilterChain::new());
        assert!(matches!(
            Compressor::new(&both),
            Err(XzError::InvalidOptions(_))
        ));

        let alone_checked = CompressOptions::new()
            .format(Format::Alone)
            .check(Check::Crc64);
        assert!(matches!(
            Compressor::new(&alone_checked),
            Err(XzError::InvalidOptions(_))
        ));

        let alone_filtered = CompressOptions::new()
            .format(Format::Alone)
            .filters(crate::filter::FilterChain::new());
        assert!(matches!(
            Compressor::new(&alone_filtered),
            Err(XzError::InvalidOptions(_))
        ));
    }
}
