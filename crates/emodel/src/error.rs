//! Error types for containers, the object model, notification delivery and codecs.

use thiserror::Error;
use uuid::Uuid;

use crate::model::ObjectId;

/// Error codes carried by [`DecodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Invalid magic/version
    InvalidMagicOrVersion,
    /// E002: Index out of bounds
    IndexOutOfBounds,
    /// E003: Checksum mismatch
    ChecksumMismatch,
    /// E004: Invalid UTF-8 encoding
    InvalidUtf8,
    /// E005: Malformed varint/length/tag/encoding
    MalformedEncoding,
    /// E006: Object identity or reference resolution failure
    UnresolvedReference,
    /// E007: Underlying stream failure
    Io,
    /// E008: Decoder used outside its lifecycle
    InvalidState,
}

impl ErrorCode {
    /// Returns the error code string (e.g., "E001").
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::InvalidMagicOrVersion => "E001",
            ErrorCode::IndexOutOfBounds => "E002",
            ErrorCode::ChecksumMismatch => "E003",
            ErrorCode::InvalidUtf8 => "E004",
            ErrorCode::MalformedEncoding => "E005",
            ErrorCode::UnresolvedReference => "E006",
            ErrorCode::Io => "E007",
            ErrorCode::InvalidState => "E008",
        }
    }
}

/// Error raised by [`EList`](crate::collections::EList) and
/// [`EMap`](crate::collections::EMap) operations.
///
/// Container operations are all-or-nothing: when one of these is returned the
/// container is unchanged and no notification was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("index {index} out of range (size: {size})")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("element not found")]
    NotFound,

    #[error("duplicate element (already present at index {index})")]
    DuplicateElement { index: usize },

    #[error("key {key} not found")]
    KeyNotFound { key: String },

    #[error("key {key} already present")]
    DuplicateKey { key: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Error raised by reflective access to objects and resources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("class {class} has no feature named {feature}")]
    UnknownFeature { class: String, feature: String },

    #[error("feature {feature} is not single-valued")]
    NotSingleValued { feature: String },

    #[error("feature {feature} is not a list")]
    NotMany { feature: String },

    #[error("feature {feature} is not a map")]
    NotMap { feature: String },

    #[error("object {0:?} does not exist in this resource")]
    UnknownObject(ObjectId),

    #[error("an object with uuid {0} already exists in this resource")]
    DuplicateUuid(Uuid),

    #[error("object {object} has an unresolved proxy to {target} in feature {feature}")]
    UnresolvedProxy {
        object: Uuid,
        feature: String,
        target: Uuid,
    },

    #[error(transparent)]
    Container(#[from] ListError),
}

/// Error returned by a [`Listener`](crate::notify::Listener).
///
/// Listener errors never abort the mutation that triggered them; the channel
/// records them and keeps delivering to the remaining listeners.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("listener failed: {message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error during encoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("object {0:?} does not exist in the resource being encoded")]
    UnknownObject(ObjectId),

    #[error("object {object} references an object outside the resource via {feature}")]
    DanglingReference { object: Uuid, feature: String },

    #[error("object {object} is contained more than once (second container feature: {feature})")]
    MultipleContainers { object: Uuid, feature: String },

    #[error("containment feature {feature} of object {object} holds a non-object value")]
    InvalidContainment { object: Uuid, feature: String },

    #[error("resource contents entry {index} is not an object")]
    InvalidRoot { index: usize },

    #[error("object {object} contains an unresolved proxy to {target} via {feature}")]
    UnresolvedProxy {
        object: Uuid,
        feature: String,
        target: Uuid,
    },

    #[error("zstd compression failed: {0}")]
    CompressionFailed(String),

    #[error("unsupported value {value} for option {key}")]
    UnsupportedOption { key: String, value: String },

    #[error("write failed: {0}")]
    Io(String),
}

/// Error during decoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    // === E001: Invalid magic/version ===
    #[error("[E001] invalid magic bytes: expected EMOB or EMOZ, found {found:?}")]
    InvalidMagic { found: [u8; 4] },

    #[error("[E001] unsupported version: {version}")]
    UnsupportedVersion { version: u8 },

    // === E002: Index out of bounds ===
    #[error("[E002] {dict} index {index} out of bounds (size: {size})")]
    IndexOutOfBounds {
        dict: &'static str,
        index: usize,
        size: usize,
    },

    // === E003: Checksum ===
    #[error("[E003] SHA-256 trailer does not match content")]
    ChecksumMismatch,

    // === E004: Invalid UTF-8 ===
    #[error("[E004] invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    // === E005: Malformed encoding ===
    #[error("[E005] unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("[E005] varint exceeds maximum length (10 bytes)")]
    VarintTooLong,

    #[error("[E005] varint overflow (value exceeds u64)")]
    VarintOverflow,

    #[error("[E005] {field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("[E005] invalid {context} tag: {tag}")]
    InvalidTag { context: &'static str, tag: u8 },

    #[error("[E005] invalid bool value: {value} (expected 0x00 or 0x01)")]
    InvalidBool { value: u8 },

    #[error("[E005] reserved bits are non-zero in {context}")]
    ReservedBitsSet { context: &'static str },

    #[error("[E005] slot encoding does not match multiplicity of feature {feature}")]
    SlotMismatch { feature: String },

    #[error("[E005] {count} trailing bytes after {context}")]
    TrailingBytes { context: &'static str, count: usize },

    #[error("[E005] expected {expected} root objects, found {actual}")]
    RootCountMismatch { expected: usize, actual: usize },

    #[error("[E005] malformed encoding: {context}")]
    MalformedEncoding { context: &'static str },

    #[error("[E005] model rejected decoded content: {0}")]
    Model(ModelError),

    #[error("[E005] zstd decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("[E005] decompressed size {actual} doesn't match declared {declared}")]
    UncompressedSizeMismatch { declared: usize, actual: usize },

    // === E006: Reference resolution ===
    #[error("[E006] object {object} references unknown object {uuid} via {feature}")]
    UnresolvedReference {
        uuid: Uuid,
        object: Uuid,
        feature: String,
    },

    #[error("[E006] object {uuid} is already present in the target resource")]
    DuplicateObject { uuid: Uuid },

    #[error("[E006] root {uuid} was not decoded")]
    UnknownRoot { uuid: Uuid },

    // === E007: I/O ===
    #[error("[E007] read failed: {0}")]
    Io(String),

    // === E008: Lifecycle ===
    #[error("[E008] decoder already used (state: {state})")]
    DecoderConsumed { state: &'static str },
}

impl DecodeError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DecodeError::InvalidMagic { .. } | DecodeError::UnsupportedVersion { .. } => {
                ErrorCode::InvalidMagicOrVersion
            }
            DecodeError::IndexOutOfBounds { .. } => ErrorCode::IndexOutOfBounds,
            DecodeError::ChecksumMismatch => ErrorCode::ChecksumMismatch,
            DecodeError::InvalidUtf8 { .. } => ErrorCode::InvalidUtf8,
            DecodeError::UnresolvedReference { .. }
            | DecodeError::DuplicateObject { .. }
            | DecodeError::UnknownRoot { .. } => ErrorCode::UnresolvedReference,
            DecodeError::Io(_) => ErrorCode::Io,
            DecodeError::DecoderConsumed { .. } => ErrorCode::InvalidState,
            _ => ErrorCode::MalformedEncoding,
        }
    }
}

impl From<ModelError> for DecodeError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::DuplicateUuid(uuid) => DecodeError::DuplicateObject { uuid },
            ModelError::UnresolvedProxy {
                object,
                feature,
                target,
            } => DecodeError::UnresolvedReference {
                uuid: target,
                object,
                feature,
            },
            other => DecodeError::Model(other),
        }
    }
}

impl From<ListError> for DecodeError {
    fn from(err: ListError) -> Self {
        DecodeError::Model(ModelError::Container(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_codes() {
        assert_eq!(DecodeError::ChecksumMismatch.code().code(), "E003");
        assert_eq!(
            DecodeError::UnsupportedVersion { version: 9 }.code(),
            ErrorCode::InvalidMagicOrVersion
        );
        assert_eq!(
            DecodeError::DecoderConsumed { state: "complete" }.code(),
            ErrorCode::InvalidState
        );
        assert_eq!(DecodeError::VarintTooLong.code(), ErrorCode::MalformedEncoding);
    }

    #[test]
    fn test_model_error_maps_to_resolution_codes() {
        let uuid = Uuid::from_bytes([7u8; 16]);
        let err: DecodeError = ModelError::DuplicateUuid(uuid).into();
        assert_eq!(err, DecodeError::DuplicateObject { uuid });
        assert_eq!(err.code(), ErrorCode::UnresolvedReference);

        let err: DecodeError = ListError::NotFound.into();
        assert_eq!(err.code(), ErrorCode::MalformedEncoding);
    }

    #[test]
    fn test_error_messages_carry_codes() {
        let err = DecodeError::InvalidMagic { found: *b"XXXX" };
        assert!(err.to_string().starts_with("[E001]"));
        let err = ListError::IndexOutOfRange { index: 3, size: 2 };
        assert_eq!(err.to_string(), "index 3 out of range (size: 2)");
    }
}
