//! Codecs: pluggable encoders and decoders for resources.
//!
//! A [`Codec`] is a stateless factory. For a given resource and
//! [`CodecOptions`] it produces an [`Encoder`] and/or a [`Decoder`]; a codec
//! that only supports one direction returns `None` for the other, and the
//! [`NoopCodec`] returns `None` for both.
//!
//! Codecs are looked up through a [`CodecRegistry`] by URI protocol first,
//! then by file extension, falling back to the no-op codec.
//!
//! ```rust
//! use emodel::codec::{CodecOptions, CodecRegistry};
//! use emodel::model::{EClass, Resource, Value};
//!
//! let registry = CodecRegistry::with_builtin_codecs();
//! let class = EClass::builder("Node").attribute("name").build();
//!
//! let mut resource = Resource::new("models/a.emb");
//! let root = resource.create(&class);
//! resource.object_mut(root).unwrap().set("name", "root").unwrap();
//! resource.add_root(root).unwrap();
//!
//! let codec = registry.get_codec(resource.uri());
//! let options = CodecOptions::new();
//! let bytes = codec.new_encoder(&resource, &options).unwrap().encode(&resource).unwrap();
//!
//! let mut copy = Resource::new("models/a.emb");
//! let roots = codec.new_decoder(&copy, &options).unwrap().decode(&bytes, &mut copy).unwrap();
//! assert_eq!(copy.object(roots[0]).unwrap().get("name").unwrap(), Some(&Value::from("root")));
//! assert!(resource.graph_eq(&copy));
//! ```

pub mod binary;
pub mod json;
pub mod noop;
pub mod options;
pub mod primitives;
pub mod registry;
pub(crate) mod stream;
pub(crate) mod walk;

use std::fmt;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DecodeError, EncodeError};
use crate::limits::MAX_RESOURCE_SIZE;
use crate::model::{ObjectId, Resource};

pub use binary::BinaryCodec;
pub use json::JsonCodec;
pub use noop::NoopCodec;
pub use options::CodecOptions;
pub use primitives::{Reader, Writer, zigzag_decode, zigzag_encode};
pub use registry::CodecRegistry;

/// Factory for encoders and decoders of one external representation.
pub trait Codec: Send + Sync + fmt::Debug {
    /// Short identifier, e.g. `"binary"`.
    fn name(&self) -> &'static str;

    /// Creates an encoder bound to `resource`. No I/O happens here.
    ///
    /// Returns `None` if this codec cannot encode.
    fn new_encoder(&self, resource: &Resource, options: &CodecOptions) -> Option<Box<dyn Encoder>>;

    /// Creates a decoder that will populate `resource`. No I/O happens here.
    ///
    /// Returns `None` if this codec cannot decode.
    fn new_decoder(&self, resource: &Resource, options: &CodecOptions) -> Option<Box<dyn Decoder>>;
}

/// Turns a resource, or one object and its containment subtree, into bytes.
///
/// The synchronous methods never produce partial output: they return either
/// the complete encoding or an error.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Encodes every root of `resource` and everything they contain.
    fn encode(&self, resource: &Resource) -> Result<Vec<u8>, EncodeError>;

    /// Encodes `object` and its containment subtree.
    fn encode_object(&self, resource: &Resource, object: ObjectId) -> Result<Vec<u8>, EncodeError>;

    /// Writes the encoding of `resource` to `sink` and returns the bytes
    /// written.
    ///
    /// On error the content already written to `sink` is undefined.
    async fn encode_async(
        &self,
        resource: &Resource,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<Vec<u8>, EncodeError> {
        let bytes = self.encode(resource)?;
        write_all(sink, &bytes).await?;
        Ok(bytes)
    }

    /// Writes the encoding of `object` and its subtree to `sink`.
    async fn encode_object_async(
        &self,
        resource: &Resource,
        object: ObjectId,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<Vec<u8>, EncodeError> {
        let bytes = self.encode_object(resource, object)?;
        write_all(sink, &bytes).await?;
        Ok(bytes)
    }
}

/// Lifecycle of a decoder.
///
/// `Idle -> Reading -> [Resolving ->] Complete`, or `Failed` from any
/// non-terminal state. A decoder decodes exactly once; any call after it
/// reached `Complete` or `Failed` returns [`DecodeError::DecoderConsumed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeState {
    Idle,
    Reading,
    /// Replacing proxies for forward references (streaming decode).
    Resolving,
    Complete,
    Failed,
}

impl DecodeState {
    pub fn name(&self) -> &'static str {
        match self {
            DecodeState::Idle => "idle",
            DecodeState::Reading => "reading",
            DecodeState::Resolving => "resolving",
            DecodeState::Complete => "complete",
            DecodeState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DecodeState::Complete | DecodeState::Failed)
    }
}

impl fmt::Display for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Materialises objects from bytes into a resource.
///
/// The graph returned by a successful decode contains no proxies. When a
/// decode fails, objects created before the failure stay in the resource and
/// the caller should discard it.
#[async_trait]
pub trait Decoder: Send {
    fn state(&self) -> DecodeState;

    /// Decodes a whole resource from `input`, appending its roots to
    /// `resource.contents()`. Returns the decoded roots.
    fn decode(&mut self, input: &[u8], resource: &mut Resource) -> Result<Vec<ObjectId>, DecodeError>;

    /// Decodes a single object (and its subtree) encoded by
    /// [`Encoder::encode_object`]. The object is not added to the contents.
    fn decode_object(&mut self, input: &[u8], resource: &mut Resource) -> Result<ObjectId, DecodeError>;

    /// Streaming variant of [`Decoder::decode`].
    async fn decode_async(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        resource: &mut Resource,
    ) -> Result<Vec<ObjectId>, DecodeError> {
        let bytes = read_all(source).await?;
        self.decode(&bytes, resource)
    }

    /// Streaming variant of [`Decoder::decode_object`].
    async fn decode_object_async(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        resource: &mut Resource,
    ) -> Result<ObjectId, DecodeError> {
        let bytes = read_all(source).await?;
        self.decode_object(&bytes, resource)
    }
}

pub(crate) async fn write_all(
    sink: &mut (dyn AsyncWrite + Unpin + Send),
    bytes: &[u8],
) -> Result<(), EncodeError> {
    sink.write_all(bytes)
        .await
        .map_err(|e| EncodeError::Io(e.to_string()))?;
    sink.flush().await.map_err(|e| EncodeError::Io(e.to_string()))
}

/// Reads a source to its end, bounded by [`MAX_RESOURCE_SIZE`].
pub(crate) async fn read_all(
    source: &mut (dyn AsyncRead + Unpin + Send),
) -> Result<Vec<u8>, DecodeError> {
    let mut bytes = Vec::new();
    source
        .take(MAX_RESOURCE_SIZE as u64 + 1)
        .read_to_end(&mut bytes)
        .await
        .map_err(|e| DecodeError::Io(e.to_string()))?;
    if bytes.len() > MAX_RESOURCE_SIZE {
        return Err(DecodeError::LengthExceedsLimit {
            field: "resource",
            len: bytes.len(),
            max: MAX_RESOURCE_SIZE,
        });
    }
    Ok(bytes)
}
