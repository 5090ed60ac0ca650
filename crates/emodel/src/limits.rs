//! Wire constants and decoder safety limits for the binary codec.
//!
//! Every length read from untrusted input is checked against one of these
//! before anything is allocated.

/// Magic bytes of an uncompressed binary resource.
pub const MAGIC: &[u8; 4] = b"EMOB";

/// Magic bytes of a zstd-compressed binary resource.
pub const MAGIC_COMPRESSED: &[u8; 4] = b"EMOZ";

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

/// Oldest format version the decoder accepts.
pub const MIN_FORMAT_VERSION: u8 = 1;

/// Flag bit: a SHA-256 trailer follows the last record.
pub const FLAG_CHECKSUM: u8 = 0x01;

/// Bits of the flags byte that must be zero.
pub const RESERVED_FLAGS: u8 = !FLAG_CHECKSUM;

/// Length of the SHA-256 trailer.
pub const CHECKSUM_LEN: usize = 32;

/// Maximum bytes in a LEB128 varint.
pub const MAX_VARINT_BYTES: usize = 10;

/// Maximum length of any string (names, URIs, string values).
pub const MAX_STRING_LEN: usize = 16 * 1024 * 1024;

/// Maximum length of a byte-array value.
pub const MAX_BYTES_LEN: usize = 64 * 1024 * 1024;

/// Maximum number of classes in the class dictionary.
pub const MAX_CLASSES: usize = 65_536;

/// Maximum number of features per class.
pub const MAX_FEATURES_PER_CLASS: usize = 4_096;

/// Maximum number of root objects.
pub const MAX_ROOTS: usize = 1_000_000;

/// Maximum number of objects in one resource.
pub const MAX_OBJECTS: usize = 10_000_000;

/// Maximum number of elements in a single list or map slot.
pub const MAX_ELEMENTS: usize = 10_000_000;

/// Maximum size of one framed record (header or object).
pub const MAX_RECORD_SIZE: usize = 256 * 1024 * 1024;

/// Maximum size of a whole (decompressed) resource.
pub const MAX_RESOURCE_SIZE: usize = 1024 * 1024 * 1024;

/// Listener failures a channel retains until drained; older ones are dropped.
pub const MAX_RETAINED_FAILURES: usize = 64;

/// Default zstd level when compression is requested without a level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;
