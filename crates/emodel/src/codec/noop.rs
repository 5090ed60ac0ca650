//! Codec that supports nothing.

use crate::codec::{Codec, CodecOptions, Decoder, Encoder};
use crate::model::Resource;

/// Fallback returned by the registry when no codec matches a URI.
///
/// Both factories return `None`, so "no codec available" is visible to the
/// caller without an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCodec;

impl Codec for NoopCodec {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn new_encoder(&self, _resource: &Resource, _options: &CodecOptions) -> Option<Box<dyn Encoder>> {
        None
    }

    fn new_decoder(&self, _resource: &Resource, _options: &CodecOptions) -> Option<Box<dyn Decoder>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_yields_nothing() {
        let resource = Resource::new("anything");
        let options = CodecOptions::new().with("compress", true);
        assert!(NoopCodec.new_encoder(&resource, &options).is_none());
        assert!(NoopCodec.new_decoder(&resource, &options).is_none());
        assert_eq!(NoopCodec.name(), "noop");
    }
}
