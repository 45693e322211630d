//! On-disk .xz container structures.
//!
//! # Layout
//! A container file is one or more concatenated streams, each laid out
//! as `header | block… | index | footer`, optionally separated by
//! 4-byte-aligned runs of zero padding.  Header and footer are both
//! `STREAM_HEADER_SIZE` (12) bytes and carry the same stream flags; the
//! footer additionally records the encoded size of the index so a
//! reader can walk the file backward from its end.
//!
//! # Endianness
//! All multi-byte integer fields are little-endian.  Sizes inside the
//! index use the format's variable-length integer encoding instead
//! (7 bits per byte, high bit set on continuation bytes).
//!
//! Everything here is pure byte-level parsing; no engine handle is ever
//! involved.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, XzError};

pub mod index;

/// Magic bytes opening every .xz stream.
pub const XZ_MAGIC: [u8; 6] = [0xFD, b'7', b'z', b'X', b'Z', 0x00];
/// Magic bytes closing every stream footer.
pub const FOOTER_MAGIC: [u8; 2] = [b'Y', b'Z'];
/// Size of both the stream header and the stream footer.
pub const STREAM_HEADER_SIZE: usize = 12;

// ── Integrity check kinds ────────────────────────────────────────────────────

/// Check id range reserved by the format.
pub const CHECK_ID_MAX: u8 = 15;

/// Integrity-check algorithm declared in the stream flags.
///
/// `Unknown` covers two cases: a decoder that has not yet seen the
/// stream header, and reserved check ids this crate cannot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    None,
    Crc32,
    Crc64,
    Sha256,
    Unknown,
}

impl Check {
    pub fn from_id(id: u8) -> Check {
        match id {
            0 => Check::None,
            1 => Check::Crc32,
            4 => Check::Crc64,
            10 => Check::Sha256,
            _ => Check::Unknown,
        }
    }

    /// Whether this build of the engine can verify the check.
    pub fn is_supported(self) -> bool {
        match self.to_engine() {
            Some(check) => check.is_supported(),
            None => false,
        }
    }

    pub(crate) fn to_engine(self) -> Option<xz2::stream::Check> {
        match self {
            Check::None => Some(xz2::stream::Check::None),
            Check::Crc32 => Some(xz2::stream::Check::Crc32),
            Check::Crc64 => Some(xz2::stream::Check::Crc64),
            Check::Sha256 => Some(xz2::stream::Check::Sha256),
            Check::Unknown => None,
        }
    }
}

/// On-disk size of the check field for every reserved check id.
/// Ids 2..=3, 5..=9 and 11..=15 are reserved but their field sizes are
/// fixed by the format so unknown checks can still be skipped over.
pub(crate) fn check_size(check_id: u8) -> u64 {
    const SIZES: [u64; 16] = [0, 4, 4, 4, 8, 8, 8, 16, 16, 16, 32, 32, 32, 64, 64, 64];
    SIZES[(check_id & 0x0F) as usize]
}

// ── Stream flags, header and footer ──────────────────────────────────────────

/// The two stream-flags bytes shared by header and footer.
///
/// Byte 0 is reserved and must be zero; byte 1 carries the check id in
/// its low nibble, high nibble reserved.  Structural equality of the
/// header and footer copies is a validity requirement for the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFlags {
    pub check_id: u8,
}

impl StreamFlags {
    pub fn check(self) -> Check {
        Check::from_id(self.check_id)
    }

    pub(crate) fn check_size(self) -> u64 {
        check_size(self.check_id)
    }

    fn decode(bytes: [u8; 2]) -> Result<StreamFlags> {
        if bytes[0] != 0 || bytes[1] & 0xF0 != 0 {
            return Err(XzError::EmptyOrCorruptContainer(
                "reserved stream flag bits are set",
            ));
        }
        Ok(StreamFlags {
            check_id: bytes[1] & 0x0F,
        })
    }

    fn encode(self) -> [u8; 2] {
        [0, self.check_id & 0x0F]
    }
}

/// Decoded stream footer: the flags plus the encoded length of the
/// index structure that precedes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFooter {
    pub flags: StreamFlags,
    /// Real byte length of the index, already decoded from the stored
    /// `(len / 4) - 1` form.  Always a nonzero multiple of 4.
    pub backward_size: u64,
}

/// Decode a 12-byte stream header, validating magic and flag CRC32.
pub fn decode_stream_header(buf: &[u8]) -> Result<StreamFlags> {
    if buf.len() != STREAM_HEADER_SIZE {
        return Err(XzError::EmptyOrCorruptContainer("stream header size"));
    }
    if buf[..6] != XZ_MAGIC {
        return Err(XzError::FormatError);
    }
    let stored = LittleEndian::read_u32(&buf[8..12]);
    if stored != crc32(&buf[6..8]) {
        return Err(XzError::EmptyOrCorruptContainer("stream header CRC mismatch"));
    }
    StreamFlags::decode([buf[6], buf[7]])
}

/// Decode a 12-byte stream footer ending at the current parse position.
pub fn decode_stream_footer(buf: &[u8]) -> Result<StreamFooter> {
    if buf.len() != STREAM_HEADER_SIZE {
        return Err(XzError::EmptyOrCorruptContainer("stream footer size"));
    }
    if buf[10..12] != FOOTER_MAGIC {
        return Err(XzError::EmptyOrCorruptContainer("stream footer magic mismatch"));
    }
    let stored = LittleEndian::read_u32(&buf[0..4]);
    if stored != crc32(&buf[4..10]) {
        return Err(XzError::EmptyOrCorruptContainer("stream footer CRC mismatch"));
    }
    let flags = StreamFlags::decode([buf[8], buf[9]])?;
    let backward_size = (u64::from(LittleEndian::read_u32(&buf[4..8])) + 1) * 4;
    Ok(StreamFooter {
        flags,
        backward_size,
    })
}

/// Encode the 12-byte stream header for the given flags.
///
/// Used to seed a fresh stream decoder when entering a block through
/// the seek index, so the engine negotiates the same check kind the
/// original stream declared.
pub fn encode_stream_header(flags: StreamFlags) -> [u8; STREAM_HEADER_SIZE] {
    let mut out = [0u8; STREAM_HEADER_SIZE];
    out[..6].copy_from_slice(&XZ_MAGIC);
    let flag_bytes = flags.encode();
    out[6..8].copy_from_slice(&flag_bytes);
    LittleEndian::write_u32(&mut out[8..12], crc32(&flag_bytes));
    out
}

// ── Block header probe ───────────────────────────────────────────────────────

/// Real encoded size of a block header whose first byte is `encoded`.
/// Zero is the index indicator, never a block header.
pub fn block_header_size(encoded: u8) -> Result<usize> {
    if encoded == 0 {
        return Err(XzError::EmptyOrCorruptContainer(
            "index indicator where a block header was expected",
        ));
    }
    Ok((usize::from(encoded) + 1) * 4)
}

// ── Variable-length integers ─────────────────────────────────────────────────

/// Largest value the VLI encoding can carry (63 bits).
pub(crate) const VLI_MAX: u64 = u64::MAX / 2;
const VLI_BYTES_MAX: usize = 9;

/// Decode one VLI from the front of `buf`, returning the value and the
/// number of bytes consumed.  Rejects non-canonical encodings (a
/// continuation followed by a zero byte) and values above `VLI_MAX`.
pub(crate) fn decode_vli(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in buf.iter().take(VLI_BYTES_MAX).enumerate() {
        if i > 0 && byte == 0 {
            return Err(XzError::EmptyOrCorruptContainer("non-canonical integer"));
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            if value > VLI_MAX {
                return Err(XzError::EmptyOrCorruptContainer("integer overflow"));
            }
            return Ok((value, i + 1));
        }
    }
    Err(XzError::EmptyOrCorruptContainer("truncated integer"))
}

/// Round up to the next multiple of 4 (block padding granularity).
pub(crate) fn ceil4(n: u64) -> u64 {
    (n + 3) & !3
}

pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
pub(crate) fn encode_vli(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let flags = StreamFlags { check_id: 4 };
        let encoded = encode_stream_header(flags);
        assert_eq!(decode_stream_header(&encoded).unwrap(), flags);
    }

    #[test]
    fn header_rejects_bad_magic_and_crc() {
        let mut encoded = encode_stream_header(StreamFlags { check_id: 1 });
        encoded[0] ^= 0xFF;
        assert!(matches!(
            decode_stream_header(&encoded),
            Err(XzError::FormatError)
        ));

        let mut encoded = encode_stream_header(StreamFlags { check_id: 1 });
        encoded[9] ^= 0x01;
        assert!(decode_stream_header(&encoded).is_err());
    }

    #[test]
    fn footer_decodes_backward_size() {
        // backward_size 8 is stored as 1; flags declare CRC32.
        let mut footer = [0u8; STREAM_HEADER_SIZE];
        LittleEndian::write_u32(&mut footer[4..8], 1);
        footer[8] = 0;
        footer[9] = 1;
        let crc = crc32(&footer[4..10]);
        LittleEndian::write_u32(&mut footer[0..4], crc);
        footer[10..12].copy_from_slice(&FOOTER_MAGIC);

        let decoded = decode_stream_footer(&footer).unwrap();
        assert_eq!(decoded.backward_size, 8);
        assert_eq!(decoded.flags.check(), Check::Crc32);
    }

    #[test]
    fn footer_rejects_flipped_bytes() {
        let mut footer = [0u8; STREAM_HEADER_SIZE];
        LittleEndian::write_u32(&mut footer[4..8], 1);
        footer[9] = 1;
        let crc = crc32(&footer[4..10]);
        LittleEndian::write_u32(&mut footer[0..4], crc);
        footer[10..12].copy_from_slice(&FOOTER_MAGIC);

        for i in 0..STREAM_HEADER_SIZE {
            let mut bad = footer;
            bad[i] ^= 0x10;
            assert!(decode_stream_footer(&bad).is_err(), "byte {i} undetected");
        }
    }

    #[test]
    fn vli_roundtrip() {
        for value in [0u64, 1, 127, 128, 16383, 16384, VLI_MAX] {
            let mut buf = Vec::new();
            encode_vli(value, &mut buf);
            let (decoded, used) = decode_vli(&buf).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(used, buf.len());
        }
    }

    #[test]
    fn vli_rejects_truncation_and_padding() {
        assert!(decode_vli(&[0x80]).is_err());
        // 0x80 0x00 decodes to 0 but wastes a byte: non-canonical.
        assert!(decode_vli(&[0x80, 0x00]).is_err());
    }

    #[test]
    fn check_sizes_cover_reserved_ids() {
        assert_eq!(check_size(0), 0);
        assert_eq!(check_size(1), 4);
        assert_eq!(check_size(4), 8);
        assert_eq!(check_size(10), 32);
        assert_eq!(check_size(15), 64);
    }

    #[test]
    fn block_header_size_probe() {
        assert_eq!(block_header_size(1).unwrap(), 8);
        assert_eq!(block_header_size(0xFF).unwrap(), 1024);
        assert!(block_header_size(0).is_err());
    }
}
