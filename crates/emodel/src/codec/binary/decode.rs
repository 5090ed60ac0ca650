//! Binary decoder.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use sha2::{Digest, Sha256};
use tokio::io::AsyncRead;
use uuid::Uuid;

use super::{
    SLOT_LIST, SLOT_MAP, SLOT_SINGLE, SLOT_UNSET, VALUE_BOOL, VALUE_BYTES, VALUE_FLOAT, VALUE_INT,
    VALUE_REF, VALUE_STRING, check_magic, check_version_and_flags, decompress,
};
use crate::codec::primitives::Reader;
use crate::codec::stream::StreamReader;
use crate::codec::{DecodeState, Decoder, read_all};
use crate::error::DecodeError;
use crate::limits::{
    CHECKSUM_LEN, MAX_BYTES_LEN, MAX_CLASSES, MAX_ELEMENTS, MAX_FEATURES_PER_CLASS, MAX_OBJECTS,
    MAX_ROOTS, MAX_STRING_LEN,
};
use crate::model::{EClass, EFeature, FeatureKind, Multiplicity, ObjectId, Resource, Slot, Value};

/// What a decode call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// All roots, appended to the resource contents.
    Resource,
    /// Exactly one root, left outside the contents.
    Object,
}

/// Decoder for the binary format. Single use.
#[derive(Debug)]
pub struct BinaryDecoder {
    state: DecodeState,
}

impl BinaryDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Idle,
        }
    }

    fn begin(&mut self) -> Result<(), DecodeError> {
        if self.state != DecodeState::Idle {
            return Err(DecodeError::DecoderConsumed {
                state: self.state.name(),
            });
        }
        self.transition(DecodeState::Reading);
        Ok(())
    }

    fn transition(&mut self, next: DecodeState) {
        tracing::trace!(from = %self.state, to = %next, "decoder state");
        self.state = next;
    }

    fn finish<T>(&mut self, result: Result<T, DecodeError>) -> Result<T, DecodeError> {
        match &result {
            Ok(_) => self.transition(DecodeState::Complete),
            Err(err) => {
                tracing::debug!(error = %err, "binary decode failed");
                self.transition(DecodeState::Failed);
            }
        }
        result
    }

    fn run(&mut self, input: &[u8], resource: &mut Resource, target: Target) -> Result<Vec<ObjectId>, DecodeError> {
        self.begin()?;
        let result = decode_buffer(input, resource, target, &mut self.state);
        self.finish(result)
    }

    async fn run_async(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        resource: &mut Resource,
        target: Target,
    ) -> Result<Vec<ObjectId>, DecodeError> {
        self.begin()?;
        let result = decode_stream(source, resource, target, &mut self.state).await;
        self.finish(result)
    }
}

impl Default for BinaryDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn single_root(roots: Vec<ObjectId>) -> Result<ObjectId, DecodeError> {
    match roots.as_slice() {
        [root] => Ok(*root),
        _ => Err(DecodeError::RootCountMismatch {
            expected: 1,
            actual: roots.len(),
        }),
    }
}

#[async_trait]
impl Decoder for BinaryDecoder {
    fn state(&self) -> DecodeState {
        self.state
    }

    fn decode(&mut self, input: &[u8], resource: &mut Resource) -> Result<Vec<ObjectId>, DecodeError> {
        self.run(input, resource, Target::Resource)
    }

    fn decode_object(&mut self, input: &[u8], resource: &mut Resource) -> Result<ObjectId, DecodeError> {
        single_root(self.run(input, resource, Target::Object)?)
    }

    async fn decode_async(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        resource: &mut Resource,
    ) -> Result<Vec<ObjectId>, DecodeError> {
        self.run_async(source, resource, Target::Resource).await
    }

    async fn decode_object_async(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        resource: &mut Resource,
    ) -> Result<ObjectId, DecodeError> {
        single_root(self.run_async(source, resource, Target::Object).await?)
    }
}

fn decode_buffer(
    input: &[u8],
    resource: &mut Resource,
    target: Target,
    state: &mut DecodeState,
) -> Result<Vec<ObjectId>, DecodeError> {
    if input.len() < 4 {
        return Err(DecodeError::UnexpectedEof { context: "magic" });
    }
    if check_magic(&input[0..4])? {
        let plain = decompress(input)?;
        return decode_plain(&plain, resource, target, state);
    }
    decode_plain(input, resource, target, state)
}

/// Moves to `Resolving` once every record has been applied.
fn enter_resolving(state: &mut DecodeState) {
    let previous = *state;
    tracing::trace!(from = %previous, to = %DecodeState::Resolving, "decoder state");
    *state = DecodeState::Resolving;
}

/// Decodes an uncompressed resource held in memory.
fn decode_plain(
    input: &[u8],
    resource: &mut Resource,
    target: Target,
    state: &mut DecodeState,
) -> Result<Vec<ObjectId>, DecodeError> {
    let mut reader = Reader::new(input);
    let magic = reader.read_bytes(4, "magic")?;
    if check_magic(magic)? {
        return Err(DecodeError::MalformedEncoding {
            context: "nested compressed container",
        });
    }
    let version = reader.read_byte("version")?;
    let flags = reader.read_byte("flags")?;
    let body_end = if check_version_and_flags(version, flags)? {
        if input.len() < reader.position() + CHECKSUM_LEN {
            return Err(DecodeError::UnexpectedEof { context: "checksum" });
        }
        let (content, trailer) = input.split_at(input.len() - CHECKSUM_LEN);
        if Sha256::digest(content).as_slice() != trailer {
            return Err(DecodeError::ChecksumMismatch);
        }
        content.len()
    } else {
        input.len()
    };

    let mut reader = Reader::new(&input[reader.position()..body_end]);
    let header = decode_header(reader.read_frame("header")?, target)?;
    let mut builder = GraphBuilder::new(resource, header);
    for _ in 0..builder.object_count() {
        builder.apply_record(reader.read_frame("object record")?)?;
    }
    if !reader.is_empty() {
        return Err(DecodeError::TrailingBytes {
            context: "last object record",
            count: reader.remaining_len(),
        });
    }

    enter_resolving(state);
    builder.resolve()?;
    builder.finish(target)
}

/// Decodes from a stream, one record at a time. The stream is read up to the
/// end of the resource and no further.
async fn decode_stream(
    source: &mut (dyn AsyncRead + Unpin + Send),
    resource: &mut Resource,
    target: Target,
    state: &mut DecodeState,
) -> Result<Vec<ObjectId>, DecodeError> {
    let mut stream = StreamReader::new(source);
    let mut magic = stream.read_exact(4, "magic").await?;
    if check_magic(&magic)? {
        // The container declares the uncompressed size but not the compressed
        // one, so the rest of the stream belongs to it.
        magic.extend(read_all(stream.inner()).await?);
        let plain = decompress(&magic)?;
        return decode_plain(&plain, resource, target, state);
    }

    let version = stream.read_byte("version").await?;
    let flags = stream.read_byte("flags").await?;
    if check_version_and_flags(version, flags)? {
        let mut preamble = magic;
        preamble.extend_from_slice(&[version, flags]);
        stream.start_hashing(&preamble);
    }

    let header = decode_header(&stream.read_frame("header").await?, target)?;
    let mut builder = GraphBuilder::new(resource, header);
    for index in 0..builder.object_count() {
        let record = stream.read_frame("object record").await?;
        let id = builder.apply_record(&record)?;
        tracing::trace!(index, object = ?id, consumed = stream.consumed(), "record decoded");
    }

    if let Some(digest) = stream.finish_hashing() {
        let trailer = stream.read_exact(CHECKSUM_LEN, "checksum").await?;
        if trailer != digest {
            return Err(DecodeError::ChecksumMismatch);
        }
    }

    enter_resolving(state);
    let resolved = builder.resolve()?;
    tracing::debug!(
        objects = builder.object_count(),
        resolved,
        bytes = stream.consumed(),
        "streamed binary resource decoded"
    );
    builder.finish(target)
}

struct Header {
    classes: Vec<Arc<EClass>>,
    roots: Vec<Uuid>,
    object_count: usize,
}

fn decode_header(bytes: &[u8], target: Target) -> Result<Header, DecodeError> {
    let mut reader = Reader::new(bytes);

    let class_count = reader.read_count(MAX_CLASSES, "class count")?;
    let mut classes = Vec::with_capacity(class_count.min(1024));
    for _ in 0..class_count {
        let name = reader.read_string(MAX_STRING_LEN, "class name")?;
        let feature_count = reader.read_count(MAX_FEATURES_PER_CLASS, "feature count")?;
        let mut features = Vec::with_capacity(feature_count.min(1024));
        for _ in 0..feature_count {
            let feature_name = reader.read_string(MAX_STRING_LEN, "feature name")?;
            let tag = reader.read_byte("feature kind")?;
            let kind = FeatureKind::from_u8(tag).ok_or(DecodeError::InvalidTag {
                context: "feature kind",
                tag,
            })?;
            let tag = reader.read_byte("multiplicity")?;
            let multiplicity = Multiplicity::from_u8(tag).ok_or(DecodeError::InvalidTag {
                context: "multiplicity",
                tag,
            })?;
            let unique = reader.read_bool("unique flag")?;
            features.push(EFeature::new(feature_name, kind, multiplicity).with_unique(unique));
        }
        classes.push(Arc::new(EClass::new(name, features)));
    }

    let root_count = reader.read_count(MAX_ROOTS, "root count")?;
    let mut roots = Vec::with_capacity(root_count.min(1024));
    for _ in 0..root_count {
        roots.push(reader.read_uuid("root")?);
    }

    let object_count = reader.read_count(MAX_OBJECTS, "object count")?;
    if !reader.is_empty() {
        return Err(DecodeError::TrailingBytes {
            context: "header",
            count: reader.remaining_len(),
        });
    }
    if target == Target::Object && roots.len() != 1 {
        return Err(DecodeError::RootCountMismatch {
            expected: 1,
            actual: roots.len(),
        });
    }

    Ok(Header {
        classes,
        roots,
        object_count,
    })
}

/// Materialises records into a resource through the regular mutators, so the
/// resource's listeners observe the decode.
struct GraphBuilder<'r> {
    resource: &'r mut Resource,
    header: Header,
    created: Vec<ObjectId>,
    decoded: FxHashSet<Uuid>,
}

impl<'r> GraphBuilder<'r> {
    fn new(resource: &'r mut Resource, header: Header) -> Self {
        Self {
            resource,
            created: Vec::with_capacity(header.object_count.min(1024)),
            decoded: FxHashSet::default(),
            header,
        }
    }

    fn object_count(&self) -> usize {
        self.header.object_count
    }

    fn apply_record(&mut self, bytes: &[u8]) -> Result<ObjectId, DecodeError> {
        let mut reader = Reader::new(bytes);
        let uuid = reader.read_uuid("object uuid")?;
        let class_index = reader.read_varint("class index")? as usize;
        let class = self
            .header
            .classes
            .get(class_index)
            .cloned()
            .ok_or(DecodeError::IndexOutOfBounds {
                dict: "class",
                index: class_index,
                size: self.header.classes.len(),
            })?;

        let id = self.resource.create_with_uuid(&class, uuid)?;
        self.created.push(id);
        self.decoded.insert(uuid);

        for (index, feature) in class.features().iter().enumerate() {
            let tag = reader.read_byte("slot tag")?;
            let mismatch = || DecodeError::SlotMismatch {
                feature: feature.name().to_string(),
            };
            match (tag, feature.multiplicity()) {
                (SLOT_UNSET, _) => {}
                (SLOT_SINGLE, Multiplicity::One) => {
                    let value = self.read_value(&mut reader)?;
                    self.resource.object_mut(id)?.set_at(index, value)?;
                }
                (SLOT_LIST, Multiplicity::Many) => {
                    let count = reader.read_count(MAX_ELEMENTS, "list length")?;
                    let mut values = Vec::with_capacity(count.min(1024));
                    for _ in 0..count {
                        values.push(self.read_value(&mut reader)?);
                    }
                    match self.resource.object_mut(id)?.slot_mut(index) {
                        Some(Slot::List(list)) => {
                            list.add_all(values)?;
                        }
                        _ => return Err(mismatch()),
                    }
                }
                (SLOT_MAP, Multiplicity::Map) => {
                    let count = reader.read_count(MAX_ELEMENTS, "map length")?;
                    let mut entries = Vec::with_capacity(count.min(1024));
                    for _ in 0..count {
                        let key = reader.read_string(MAX_STRING_LEN, "map key")?;
                        entries.push((key, self.read_value(&mut reader)?));
                    }
                    match self.resource.object_mut(id)?.slot_mut(index) {
                        Some(Slot::Map(map)) => {
                            map.insert_all_unique(entries)?;
                        }
                        _ => return Err(mismatch()),
                    }
                }
                (SLOT_SINGLE..=SLOT_MAP, _) => return Err(mismatch()),
                (tag, _) => return Err(DecodeError::InvalidTag { context: "slot", tag }),
            }
        }

        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes {
                context: "object record",
                count: reader.remaining_len(),
            });
        }
        Ok(id)
    }

    /// Reads one value. References to objects not materialised yet become
    /// proxies.
    fn read_value(&self, reader: &mut Reader<'_>) -> Result<Value, DecodeError> {
        let tag = reader.read_byte("value tag")?;
        let value = match tag {
            VALUE_BOOL => Value::Bool(reader.read_bool("bool value")?),
            VALUE_INT => Value::Int(reader.read_signed_varint("int value")?),
            VALUE_FLOAT => Value::Float(reader.read_f64("float value")?),
            VALUE_STRING => Value::String(reader.read_string(MAX_STRING_LEN, "string value")?),
            VALUE_BYTES => Value::Bytes(reader.read_bytes_prefixed(MAX_BYTES_LEN, "bytes value")?),
            VALUE_REF => {
                let uuid = reader.read_uuid("reference")?;
                match self.resource.find(&uuid) {
                    Some(id) => Value::Object(id),
                    None => Value::Proxy(uuid),
                }
            }
            tag => return Err(DecodeError::InvalidTag { context: "value", tag }),
        };
        Ok(value)
    }

    /// Replaces every proxy in the decoded objects. Emits RESOLVE for each.
    fn resolve(&mut self) -> Result<usize, DecodeError> {
        Ok(self.resource.resolve_proxies(&self.created)?)
    }

    fn finish(self, target: Target) -> Result<Vec<ObjectId>, DecodeError> {
        let mut roots = Vec::with_capacity(self.header.roots.len());
        for uuid in &self.header.roots {
            let id = match self.resource.find(uuid) {
                Some(id) if self.decoded.contains(uuid) => id,
                _ => return Err(DecodeError::UnknownRoot { uuid: *uuid }),
            };
            roots.push(id);
        }
        if target == Target::Resource {
            for &root in &roots {
                self.resource.add_root(root)?;
            }
        }
        tracing::debug!(
            objects = self.created.len(),
            roots = roots.len(),
            "binary resource decoded"
        );
        Ok(roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::binary::BinaryEncoder;
    use crate::codec::{CodecOptions, Encoder};
    use crate::error::{ErrorCode, ListenerError};
    use crate::limits::{FORMAT_VERSION, MAGIC};
    use crate::notify::{EventType, Notification, Payload};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use proptest::sample::Index;

    fn class() -> Arc<EClass> {
        EClass::builder("Node")
            .attribute("name")
            .attribute("weight")
            .attribute("blob")
            .attribute_many("aliases")
            .containment_many("children")
            .reference("buddy")
            .reference_many("links")
            .map("tags")
            .build()
    }

    /// root(children: [a, b]); a.buddy -> b (forward reference);
    /// b.links -> [root, a]
    fn sample() -> Resource {
        let class = class();
        let mut r = Resource::new("memory:sample.emb");
        let root = r.create(&class);
        let a = r.create(&class);
        let b = r.create(&class);
        r.add_root(root).unwrap();

        let obj = r.object_mut(root).unwrap();
        obj.set("name", "root").unwrap();
        obj.set("weight", 1.5).unwrap();
        obj.set("blob", vec![0u8, 1, 2]).unwrap();
        obj.list_mut("aliases").unwrap().add_all(vec![Value::from("r"), Value::from("r")]).unwrap();
        obj.list_mut("children").unwrap().add_all(vec![Value::Object(a), Value::Object(b)]).unwrap();
        let tags = obj.map_mut("tags").unwrap();
        tags.put("z".to_string(), Value::from(-3));
        tags.put("a".to_string(), Value::from(true));

        r.object_mut(a).unwrap().set("buddy", Value::Object(b)).unwrap();
        r.object_mut(b)
            .unwrap()
            .list_mut("links")
            .unwrap()
            .add_all(vec![Value::Object(root), Value::Object(a)])
            .unwrap();
        r
    }

    fn encode(resource: &Resource, options: &CodecOptions) -> Vec<u8> {
        BinaryEncoder::new(resource, options).encode(resource).unwrap()
    }

    #[test]
    fn test_resource_roundtrip() {
        let original = sample();
        let bytes = encode(&original, &CodecOptions::new());

        let mut copy = Resource::new("memory:copy.emb");
        let mut decoder = BinaryDecoder::new();
        let roots = decoder.decode(&bytes, &mut copy).unwrap();

        assert_eq!(decoder.state(), DecodeState::Complete);
        assert_eq!(roots, copy.roots());
        assert_eq!(copy.object_count(), 3);
        assert!(original.graph_eq(&copy));
        assert!(copy.objects().all(|o| !o.has_proxies()));
    }

    #[test]
    fn test_roundtrip_compressed_with_checksum() {
        let original = sample();
        let options = CodecOptions::new().with("compress", true).with("checksum", true);
        let bytes = encode(&original, &options);

        let mut copy = Resource::new("memory:copy.emb");
        BinaryDecoder::new().decode(&bytes, &mut copy).unwrap();
        assert!(original.graph_eq(&copy));
    }

    #[test]
    fn test_decode_emits_resolve_for_forward_references() {
        let bytes = encode(&sample(), &CodecOptions::new());
        let mut copy = Resource::new("memory:copy.emb");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        copy.attach(Arc::new(
            move |n: &Notification| -> Result<(), ListenerError> {
                sink.lock().push((n.kind(), n.feature().map(str::to_string)));
                Ok(())
            },
        ));

        BinaryDecoder::new().decode(&bytes, &mut copy).unwrap();

        let seen = seen.lock();
        let resolved: Vec<Option<String>> = seen
            .iter()
            .filter(|(kind, _)| *kind == EventType::Resolve)
            .map(|(_, feature)| feature.clone())
            .collect();
        // children a and b, and a.buddy -> b, are forward references.
        assert_eq!(
            resolved,
            vec![
                Some("children".to_string()),
                Some("children".to_string()),
                Some("buddy".to_string()),
            ]
        );
        assert_eq!(
            seen.last(),
            Some(&(EventType::Add, Some("contents".to_string())))
        );
    }

    #[test]
    fn test_decoder_is_single_use() {
        let bytes = encode(&sample(), &CodecOptions::new());
        let mut decoder = BinaryDecoder::new();
        decoder.decode(&bytes, &mut Resource::new("memory:1")).unwrap();
        assert_eq!(
            decoder.decode(&bytes, &mut Resource::new("memory:2")),
            Err(DecodeError::DecoderConsumed { state: "complete" })
        );

        let mut failed = BinaryDecoder::new();
        assert!(failed.decode(b"nope", &mut Resource::new("memory:3")).is_err());
        assert_eq!(failed.state(), DecodeState::Failed);
        assert_eq!(
            failed.decode(&bytes, &mut Resource::new("memory:4")),
            Err(DecodeError::DecoderConsumed { state: "failed" })
        );
    }

    #[test]
    fn test_object_roundtrip_resolves_against_target() {
        let original = sample();
        let root = original.roots()[0];
        let a = original.object(root).unwrap().list("children").unwrap().get(0).unwrap().as_object().unwrap();
        let b_uuid = original.object(a).unwrap().get("buddy").unwrap().and_then(Value::as_object)
            .map(|b| original.object(b).unwrap().uuid())
            .unwrap();

        let bytes = BinaryEncoder::new(&original, &CodecOptions::new())
            .encode_object(&original, a)
            .unwrap();

        // a.buddy points outside the subtree: unresolved in an empty resource.
        let mut empty = Resource::new("memory:empty");
        assert_eq!(
            BinaryDecoder::new().decode_object(&bytes, &mut empty).map_err(|e| e.code()),
            Err(ErrorCode::UnresolvedReference)
        );

        // Resolved once the target resource already holds b.
        let mut target = Resource::new("memory:target");
        let node = class();
        let b = target.create_with_uuid(&node, b_uuid).unwrap();
        let decoded = BinaryDecoder::new().decode_object(&bytes, &mut target).unwrap();
        assert!(target.contents().is_empty());
        assert_eq!(
            target.object(decoded).unwrap().get("buddy").unwrap(),
            Some(&Value::Object(b))
        );
    }

    #[test]
    fn test_decode_object_rejects_multiple_roots() {
        let mut original = sample();
        let class = class();
        let extra = original.create(&class);
        original.add_root(extra).unwrap();
        let bytes = encode(&original, &CodecOptions::new());
        assert_eq!(
            BinaryDecoder::new().decode_object(&bytes, &mut Resource::new("memory:x")),
            Err(DecodeError::RootCountMismatch {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn test_corruption_is_detected() {
        let original = sample();
        let options = CodecOptions::new().with("checksum", true);
        let mut bytes = encode(&original, &options);
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0xFF;
        assert_eq!(
            BinaryDecoder::new().decode(&bytes, &mut Resource::new("memory:x")),
            Err(DecodeError::ChecksumMismatch)
        );

        let mut bytes = encode(&original, &CodecOptions::new());
        bytes.push(0);
        assert!(matches!(
            BinaryDecoder::new().decode(&bytes, &mut Resource::new("memory:x")),
            Err(DecodeError::TrailingBytes { .. })
        ));

        let bytes = encode(&original, &CodecOptions::new());
        assert!(matches!(
            BinaryDecoder::new().decode(&bytes[..bytes.len() - 3], &mut Resource::new("memory:x")),
            Err(DecodeError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_duplicate_object_in_target() {
        let original = sample();
        let bytes = encode(&original, &CodecOptions::new());
        let mut target = Resource::new("memory:x");
        BinaryDecoder::new().decode(&bytes, &mut target).unwrap();
        let err = BinaryDecoder::new().decode(&bytes, &mut target).unwrap_err();
        assert!(matches!(err, DecodeError::DuplicateObject { .. }));
        assert_eq!(err.code(), ErrorCode::UnresolvedReference);
    }

    #[test]
    fn test_header_errors() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[FORMAT_VERSION, 0]);
        // header: one class with an invalid feature kind
        let header = [1u8, 1, b'N', 1, 1, b'x', 9, 0, 0, 0, 0];
        bytes.push(header.len() as u8);
        bytes.extend_from_slice(&header);
        assert_eq!(
            BinaryDecoder::new().decode(&bytes, &mut Resource::new("memory:x")),
            Err(DecodeError::InvalidTag {
                context: "feature kind",
                tag: 9
            })
        );
    }

    #[tokio::test]
    async fn test_streaming_roundtrip() {
        let original = sample();
        let options = CodecOptions::new().with("checksum", true);
        let encoder = BinaryEncoder::new(&original, &options);

        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = async {
            let bytes = encoder.encode_async(&original, &mut client).await;
            drop(client);
            bytes
        };
        let mut copy = Resource::new("memory:copy.emb");
        let mut decoder = BinaryDecoder::new();
        let reader = decoder.decode_async(&mut server, &mut copy);
        let (written, roots) = tokio::join!(writer, reader);

        assert!(written.is_ok());
        assert_eq!(roots.unwrap().len(), 1);
        assert_eq!(decoder.state(), DecodeState::Complete);
        assert!(original.graph_eq(&copy));
    }

    #[tokio::test]
    async fn test_streaming_stops_at_end_of_resource() {
        let original = sample();
        let mut bytes = encode(&original, &CodecOptions::new());
        bytes.extend_from_slice(b"next");

        let mut source: &[u8] = &bytes;
        let mut copy = Resource::new("memory:copy.emb");
        BinaryDecoder::new().decode_async(&mut source, &mut copy).await.unwrap();
        assert_eq!(source, b"next");
        assert!(original.graph_eq(&copy));
    }

    #[tokio::test]
    async fn test_streaming_compressed() {
        let original = sample();
        let options = CodecOptions::new().with("compress", true);
        let bytes = encode(&original, &options);

        let mut source: &[u8] = &bytes;
        let mut copy = Resource::new("memory:copy.emb");
        let mut decoder = BinaryDecoder::new();
        decoder.decode_async(&mut source, &mut copy).await.unwrap();
        assert_eq!(decoder.state(), DecodeState::Complete);
        assert!(original.graph_eq(&copy));
    }

    #[tokio::test]
    async fn test_streaming_compressed_corrupt_body_fails() {
        let original = sample();
        let options = CodecOptions::new().with("compress", true);
        let bytes = encode(&original, &options);

        let mut source: &[u8] = &bytes[..bytes.len() - 4];
        let mut decoder = BinaryDecoder::new();
        let result = decoder
            .decode_async(&mut source, &mut Resource::new("memory:copy.emb"))
            .await;
        assert!(result.is_err());
        assert_eq!(decoder.state(), DecodeState::Failed);
    }

    #[test]
    fn test_decoded_map_reported_as_one_batch() {
        let bytes = encode(&sample(), &CodecOptions::new());
        let mut copy = Resource::new("memory:copy.emb");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        copy.attach(Arc::new(
            move |n: &Notification| -> Result<(), ListenerError> {
                if n.feature() == Some("tags") {
                    sink.lock().push(n.clone());
                }
                Ok(())
            },
        ));

        BinaryDecoder::new().decode(&bytes, &mut copy).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind(), EventType::AddMany);
        assert_eq!(
            seen[0].new_value(),
            &Payload::Entries(vec![
                (Value::from("z"), Value::from(-3)),
                (Value::from("a"), Value::from(true)),
            ])
        );
    }

    #[test]
    fn test_special_floats_roundtrip() {
        let class = class();
        let mut original = Resource::new("memory:floats.emb");
        let root = original.create(&class);
        original.add_root(root).unwrap();
        let obj = original.object_mut(root).unwrap();
        obj.set("weight", f64::NAN).unwrap();
        obj.list_mut("aliases")
            .unwrap()
            .add_all(vec![
                Value::Float(-0.0),
                Value::Float(f64::NEG_INFINITY),
                Value::Int(i64::MIN),
            ])
            .unwrap();
        obj.map_mut("tags").unwrap().put("nan".to_string(), Value::Float(f64::NAN));

        let bytes = encode(&original, &CodecOptions::new());
        let mut copy = Resource::new("memory:copy.emb");
        BinaryDecoder::new().decode(&bytes, &mut copy).unwrap();

        assert!(original.graph_eq(&original));
        assert!(original.graph_eq(&copy));
        let weight = copy.object(copy.roots()[0]).unwrap().get("weight").unwrap();
        assert!(matches!(weight, Some(Value::Float(f)) if f.is_nan()));
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            prop_oneof![Just(i64::MIN), Just(i64::MAX), Just(0), any::<i64>()].prop_map(Value::Int),
            prop_oneof![Just(f64::NAN), Just(-0.0), Just(f64::INFINITY), any::<f64>()]
                .prop_map(Value::Float),
            ".{0,8}".prop_map(Value::String),
            prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
        ]
    }

    /// One object of a random graph. Indices pick the parent among earlier
    /// objects and reference targets among all objects.
    #[derive(Debug, Clone)]
    struct NodeShape {
        parent: Index,
        name: Option<Value>,
        aliases: Vec<Value>,
        buddy: Option<Index>,
        links: Vec<Index>,
        tags: Vec<(String, Value)>,
    }

    fn node_strategy() -> impl Strategy<Value = NodeShape> {
        (
            any::<Index>(),
            prop::option::of(value_strategy()),
            prop::collection::vec(value_strategy(), 0..3),
            prop::option::of(any::<Index>()),
            prop::collection::vec(any::<Index>(), 0..3),
            prop::collection::vec(("[a-z]{0,3}", value_strategy()), 0..4),
        )
            .prop_map(|(parent, name, aliases, buddy, links, tags)| NodeShape {
                parent,
                name,
                aliases,
                buddy,
                links,
                tags,
            })
    }

    fn build_graph(nodes: &[NodeShape]) -> Resource {
        let class = class();
        let mut r = Resource::new("memory:random.emb");
        let ids: Vec<ObjectId> = nodes.iter().map(|_| r.create(&class)).collect();
        r.add_root(ids[0]).unwrap();

        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                let parent = ids[node.parent.index(i)];
                r.object_mut(parent)
                    .unwrap()
                    .list_mut("children")
                    .unwrap()
                    .push(Value::Object(ids[i]))
                    .unwrap();
            }

            let obj = r.object_mut(ids[i]).unwrap();
            if let Some(name) = &node.name {
                obj.set("name", name.clone()).unwrap();
            }
            obj.list_mut("aliases").unwrap().add_all(node.aliases.clone()).unwrap();
            if let Some(buddy) = &node.buddy {
                obj.set("buddy", Value::Object(ids[buddy.index(ids.len())])).unwrap();
            }
            let links: Vec<Value> = node
                .links
                .iter()
                .map(|link| Value::Object(ids[link.index(ids.len())]))
                .collect();
            obj.list_mut("links").unwrap().add_all(links).unwrap();
            obj.map_mut("tags").unwrap().put_all(node.tags.clone());
        }
        r
    }

    proptest! {
        #[test]
        fn prop_roundtrip_preserves_graph(
            nodes in prop::collection::vec(node_strategy(), 1..8),
            compress in any::<bool>(),
            checksum in any::<bool>(),
        ) {
            let original = build_graph(&nodes);
            prop_assert!(original.graph_eq(&original));

            let options = CodecOptions::new()
                .with("compress", compress)
                .with("checksum", checksum);
            let encoder = BinaryEncoder::new(&original, &options);
            let bytes = encoder.encode(&original).unwrap();

            let mut copy = Resource::new("memory:copy.emb");
            BinaryDecoder::new().decode(&bytes, &mut copy).unwrap();
            prop_assert_eq!(copy.object_count(), nodes.len());
            prop_assert!(original.graph_eq(&copy));

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (streamed, streamed_copy) = runtime.block_on(async {
                let mut sink: Vec<u8> = Vec::new();
                let streamed = encoder.encode_async(&original, &mut sink).await.unwrap();
                let mut source: &[u8] = &sink;
                let mut copy = Resource::new("memory:streamed.emb");
                BinaryDecoder::new().decode_async(&mut source, &mut copy).await.unwrap();
                (streamed, copy)
            });
            prop_assert_eq!(streamed, bytes);
            prop_assert!(original.graph_eq(&streamed_copy));
        }
    }
}
