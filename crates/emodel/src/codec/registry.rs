//! Codec lookup by URI.

use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::codec::{BinaryCodec, Codec, JsonCodec, NoopCodec, binary, json};
use crate::model::Uri;

lazy_static! {
    static ref GLOBAL: CodecRegistry = CodecRegistry::with_builtin_codecs();
}

/// Maps URI protocols and file extensions to codecs.
///
/// [`get_codec`](Self::get_codec) tries the protocol first, then the
/// extension, and otherwise returns the fallback codec. Lookups never fail.
///
/// Registries are plain values: construct one, register codecs during
/// startup and pass it to the code that needs it. [`CodecRegistry::global`]
/// exists for application entry points.
pub struct CodecRegistry {
    protocols: RwLock<FxHashMap<String, Arc<dyn Codec>>>,
    extensions: RwLock<FxHashMap<String, Arc<dyn Codec>>>,
    fallback: Arc<dyn Codec>,
}

impl CodecRegistry {
    /// Creates a registry with no mappings. Every lookup yields the fallback.
    pub fn new() -> Self {
        Self::with_fallback(Arc::new(NoopCodec))
    }

    pub fn with_fallback(fallback: Arc<dyn Codec>) -> Self {
        Self {
            protocols: RwLock::new(FxHashMap::default()),
            extensions: RwLock::new(FxHashMap::default()),
            fallback,
        }
    }

    /// Creates a registry holding the built-in codecs.
    pub fn with_builtin_codecs() -> Self {
        let registry = Self::new();
        registry.register_builtin_codecs();
        registry
    }

    /// Registers the binary codec for `emb`/`embz` and the `emb` protocol,
    /// and the JSON codec for `json`.
    pub fn register_builtin_codecs(&self) {
        let binary: Arc<dyn Codec> = Arc::new(BinaryCodec);
        self.register_protocol(binary::PROTOCOL, binary.clone());
        self.register_extension(binary::EXTENSION, binary.clone());
        self.register_extension(binary::COMPRESSED_EXTENSION, binary);
        self.register_extension(json::EXTENSION, Arc::new(JsonCodec));
    }

    /// Process-wide registry with the built-in codecs, created on first use.
    pub fn global() -> &'static CodecRegistry {
        &GLOBAL
    }

    /// Maps `protocol` to `codec`, returning the codec it replaces.
    pub fn register_protocol(&self, protocol: impl Into<String>, codec: Arc<dyn Codec>) -> Option<Arc<dyn Codec>> {
        let protocol = protocol.into();
        tracing::debug!(protocol = %protocol, codec = codec.name(), "codec registered");
        self.protocols.write().insert(protocol, codec)
    }

    /// Maps the file extension `extension` (without the dot) to `codec`,
    /// returning the codec it replaces.
    pub fn register_extension(&self, extension: impl Into<String>, codec: Arc<dyn Codec>) -> Option<Arc<dyn Codec>> {
        let extension = extension.into();
        tracing::debug!(extension = %extension, codec = codec.name(), "codec registered");
        self.extensions.write().insert(extension, codec)
    }

    pub fn unregister_protocol(&self, protocol: &str) -> Option<Arc<dyn Codec>> {
        self.protocols.write().remove(protocol)
    }

    pub fn unregister_extension(&self, extension: &str) -> Option<Arc<dyn Codec>> {
        self.extensions.write().remove(extension)
    }

    /// Resolves the codec for `uri`.
    pub fn get_codec(&self, uri: impl Into<Uri>) -> Arc<dyn Codec> {
        let uri = uri.into();

        if let Some(protocol) = uri.protocol() {
            if let Some(codec) = self.protocols.read().get(protocol) {
                tracing::debug!(uri = %uri, protocol, codec = codec.name(), "codec resolved by protocol");
                return codec.clone();
            }
        }
        if let Some(extension) = uri.extension() {
            if let Some(codec) = self.extensions.read().get(extension) {
                tracing::debug!(uri = %uri, extension, codec = codec.name(), "codec resolved by extension");
                return codec.clone();
            }
        }

        tracing::debug!(uri = %uri, codec = self.fallback.name(), "no codec registered, using fallback");
        self.fallback.clone()
    }

    pub fn fallback(&self) -> &Arc<dyn Codec> {
        &self.fallback
    }

    /// Returns true if `codec` is this registry's fallback.
    pub fn is_fallback(&self, codec: &Arc<dyn Codec>) -> bool {
        Arc::ptr_eq(codec, &self.fallback)
    }

    pub fn protocols(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.protocols.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn extensions(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.extensions.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("protocols", &self.protocols())
            .field("extensions", &self.extensions())
            .field("fallback", &self.fallback.name())
            .finish()
    }
}
