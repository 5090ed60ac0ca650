//! Binary resource format.
//!
//! ```text
//! resource  := MAGIC version:u8 flags:u8 frame(header) frame(record)* [sha256]
//! header    := classes roots object_count:varint
//! classes   := count:varint (name:string features)*
//! features  := count:varint (name:string kind:u8 multiplicity:u8 unique:bool)*
//! roots     := count:varint uuid*
//! record    := uuid class:varint slot*            (one slot per class feature)
//! slot      := 0x00                               unset
//!            | 0x01 value                         single value
//!            | 0x02 count:varint value*           list
//!            | 0x03 count:varint (key:string value)*  map
//! value     := 0x00 bool | 0x01 zigzag-varint | 0x02 f64-le
//!            | 0x03 string | 0x04 bytes | 0x05 uuid (object reference)
//! frame(x)  := len:varint x
//! ```
//!
//! Records are written in containment pre-order. References are written as
//! UUIDs; a reference to an object that has not been read yet becomes a proxy
//! and is resolved once all records are in.
//!
//! The compressed form is `MAGIC_COMPRESSED uncompressed_len:varint zstd(resource)`.
//! Decoders detect both forms from the magic bytes.

mod decode;
mod encode;

pub use decode::BinaryDecoder;
pub use encode::BinaryEncoder;

use std::io::Read;

use crate::codec::primitives::{Reader, Writer};
use crate::codec::{Codec, CodecOptions, Decoder, Encoder};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{
    FLAG_CHECKSUM, FORMAT_VERSION, MAGIC, MAGIC_COMPRESSED, MAX_RESOURCE_SIZE, MIN_FORMAT_VERSION,
    RESERVED_FLAGS,
};
use crate::model::Resource;

/// File extension of uncompressed binary resources.
pub const EXTENSION: &str = "emb";

/// File extension of compressed binary resources.
pub const COMPRESSED_EXTENSION: &str = "embz";

/// URI protocol served by the binary codec.
pub const PROTOCOL: &str = "emb";

pub(crate) const SLOT_UNSET: u8 = 0;
pub(crate) const SLOT_SINGLE: u8 = 1;
pub(crate) const SLOT_LIST: u8 = 2;
pub(crate) const SLOT_MAP: u8 = 3;

pub(crate) const VALUE_BOOL: u8 = 0;
pub(crate) const VALUE_INT: u8 = 1;
pub(crate) const VALUE_FLOAT: u8 = 2;
pub(crate) const VALUE_STRING: u8 = 3;
pub(crate) const VALUE_BYTES: u8 = 4;
pub(crate) const VALUE_REF: u8 = 5;

/// Codec for the binary format. Supports both directions, sync and streaming.
///
/// Encoder options:
/// - `compress` (bool): zstd-compress the output. Defaults to true for
///   resources whose URI ends in `.embz`.
/// - `compression_level` (int): zstd level, default 3.
/// - `checksum` (bool): append a SHA-256 trailer, default false.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn new_encoder(&self, resource: &Resource, options: &CodecOptions) -> Option<Box<dyn Encoder>> {
        Some(Box::new(BinaryEncoder::new(resource, options)))
    }

    fn new_decoder(&self, _resource: &Resource, _options: &CodecOptions) -> Option<Box<dyn Decoder>> {
        Some(Box::new(BinaryDecoder::new()))
    }
}

/// Checks the magic bytes. Returns true for the compressed form.
pub(crate) fn check_magic(magic: &[u8]) -> Result<bool, DecodeError> {
    if magic == MAGIC {
        return Ok(false);
    }
    if magic == MAGIC_COMPRESSED {
        return Ok(true);
    }
    let mut found = [0u8; 4];
    let n = magic.len().min(4);
    found[..n].copy_from_slice(&magic[..n]);
    Err(DecodeError::InvalidMagic { found })
}

/// Checks version and flags. Returns true if a checksum trailer is present.
pub(crate) fn check_version_and_flags(version: u8, flags: u8) -> Result<bool, DecodeError> {
    if !(MIN_FORMAT_VERSION..=FORMAT_VERSION).contains(&version) {
        return Err(DecodeError::UnsupportedVersion { version });
    }
    if flags & RESERVED_FLAGS != 0 {
        return Err(DecodeError::ReservedBitsSet { context: "flags" });
    }
    Ok(flags & FLAG_CHECKSUM != 0)
}

/// Decompresses a compressed resource, returning the uncompressed bytes.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if input.len() < 4 {
        return Err(DecodeError::UnexpectedEof { context: "magic" });
    }
    if &input[0..4] != MAGIC_COMPRESSED {
        let mut found = [0u8; 4];
        found.copy_from_slice(&input[0..4]);
        return Err(DecodeError::InvalidMagic { found });
    }

    let mut reader = Reader::new(&input[4..]);
    let declared_size = reader.read_varint("uncompressed_size")? as usize;
    if declared_size > MAX_RESOURCE_SIZE {
        return Err(DecodeError::LengthExceedsLimit {
            field: "uncompressed_size",
            len: declared_size,
            max: MAX_RESOURCE_SIZE,
        });
    }

    let mut decoder = zstd::Decoder::new(reader.remaining())
        .map_err(|e| DecodeError::DecompressionFailed(e.to_string()))?;

    let mut decompressed = Vec::with_capacity(declared_size);
    decoder
        .take(MAX_RESOURCE_SIZE as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| DecodeError::DecompressionFailed(e.to_string()))?;

    if decompressed.len() != declared_size {
        return Err(DecodeError::UncompressedSizeMismatch {
            declared: declared_size,
            actual: decompressed.len(),
        });
    }

    Ok(decompressed)
}

/// Wraps an uncompressed resource in the compressed container.
pub(crate) fn compress(uncompressed: &[u8], level: i32) -> Result<Vec<u8>, EncodeError> {
    let compressed = zstd::encode_all(uncompressed, level)
        .map_err(|e| EncodeError::CompressionFailed(e.to_string()))?;

    let mut writer = Writer::with_capacity(4 + 10 + compressed.len());
    writer.write_bytes(MAGIC_COMPRESSED);
    writer.write_varint(uncompressed.len() as u64);
    writer.write_bytes(&compressed);
    Ok(writer.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_detection() {
        assert_eq!(check_magic(b"EMOB"), Ok(false));
        assert_eq!(check_magic(b"EMOZ"), Ok(true));
        assert_eq!(
            check_magic(b"GRC2"),
            Err(DecodeError::InvalidMagic { found: *b"GRC2" })
        );
    }

    #[test]
    fn test_version_and_flags() {
        assert_eq!(check_version_and_flags(FORMAT_VERSION, 0), Ok(false));
        assert_eq!(check_version_and_flags(FORMAT_VERSION, FLAG_CHECKSUM), Ok(true));
        assert_eq!(
            check_version_and_flags(FORMAT_VERSION + 1, 0),
            Err(DecodeError::UnsupportedVersion {
                version: FORMAT_VERSION + 1
            })
        );
        assert_eq!(
            check_version_and_flags(FORMAT_VERSION, 0x80),
            Err(DecodeError::ReservedBitsSet { context: "flags" })
        );
    }

    #[test]
    fn test_compression_container() {
        let payload = b"EMOB\x01\x00 some payload some payload some payload".to_vec();
        let compressed = compress(&payload, 3).unwrap();
        assert_eq!(&compressed[0..4], MAGIC_COMPRESSED);
        assert_eq!(decompress(&compressed).unwrap(), payload);
    }

    #[test]
    fn test_declared_size_mismatch() {
        let payload = b"abcdef".to_vec();
        let mut compressed = compress(&payload, 3).unwrap();
        compressed[4] = 2;
        assert_eq!(
            decompress(&compressed),
            Err(DecodeError::UncompressedSizeMismatch {
                declared: 2,
                actual: 6
            })
        );
    }
}
