//! Binary encoder.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use super::{
    COMPRESSED_EXTENSION, SLOT_LIST, SLOT_MAP, SLOT_SINGLE, SLOT_UNSET, VALUE_BOOL, VALUE_BYTES,
    VALUE_FLOAT, VALUE_INT, VALUE_REF, VALUE_STRING, compress,
};
use crate::codec::primitives::Writer;
use crate::codec::walk::Plan;
use crate::codec::{CodecOptions, Encoder};
use crate::error::EncodeError;
use crate::limits::{
    DEFAULT_COMPRESSION_LEVEL, FLAG_CHECKSUM, FORMAT_VERSION, MAGIC, MAX_BYTES_LEN, MAX_CLASSES,
    MAX_ELEMENTS, MAX_FEATURES_PER_CLASS, MAX_OBJECTS, MAX_RECORD_SIZE, MAX_RESOURCE_SIZE,
    MAX_ROOTS, MAX_STRING_LEN,
};
use crate::model::{ObjectId, Resource, Slot, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EncodeConfig {
    compress: bool,
    level: i32,
    checksum: bool,
}

impl EncodeConfig {
    fn from_options(resource: &Resource, options: &CodecOptions) -> Result<Self, EncodeError> {
        let compressed_uri = resource.uri().extension() == Some(COMPRESSED_EXTENSION);
        let level = match options.i64_option("compression_level")? {
            Some(level) => i32::try_from(level).map_err(|_| EncodeError::UnsupportedOption {
                key: "compression_level".to_string(),
                value: level.to_string(),
            })?,
            None => DEFAULT_COMPRESSION_LEVEL,
        };
        Ok(Self {
            compress: options.bool_option("compress")?.unwrap_or(compressed_uri),
            level,
            checksum: options.bool_option("checksum")?.unwrap_or(false),
        })
    }
}

/// Encoder for the binary format.
///
/// Invalid options are reported by the first encode call.
#[derive(Debug, Clone)]
pub struct BinaryEncoder {
    config: Result<EncodeConfig, EncodeError>,
}

impl BinaryEncoder {
    pub fn new(resource: &Resource, options: &CodecOptions) -> Self {
        Self {
            config: EncodeConfig::from_options(resource, options),
        }
    }

    fn config(&self) -> Result<EncodeConfig, EncodeError> {
        self.config.clone()
    }
}

#[async_trait]
impl Encoder for BinaryEncoder {
    fn encode(&self, resource: &Resource) -> Result<Vec<u8>, EncodeError> {
        let config = self.config()?;
        encode_plan(&Plan::for_resource(resource)?, config)
    }

    fn encode_object(&self, resource: &Resource, object: ObjectId) -> Result<Vec<u8>, EncodeError> {
        let config = self.config()?;
        encode_plan(&Plan::for_object(resource, object)?, config)
    }

    async fn encode_async(
        &self,
        resource: &Resource,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<Vec<u8>, EncodeError> {
        let config = self.config()?;
        let plan = Plan::for_resource(resource)?;
        stream_plan(&plan, config, sink).await
    }

    async fn encode_object_async(
        &self,
        resource: &Resource,
        object: ObjectId,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<Vec<u8>, EncodeError> {
        let config = self.config()?;
        let plan = Plan::for_object(resource, object)?;
        stream_plan(&plan, config, sink).await
    }
}

fn encode_plan(plan: &Plan<'_>, config: EncodeConfig) -> Result<Vec<u8>, EncodeError> {
    let mut writer = Writer::new();
    write_preamble(&mut writer, config);
    writer.write_frame(&encode_header(plan)?);
    for &id in &plan.order {
        writer.write_frame(&encode_record(plan, id)?);
    }
    if config.checksum {
        let digest = Sha256::digest(writer.as_bytes());
        writer.write_bytes(&digest);
    }
    check_len("resource", writer.len(), MAX_RESOURCE_SIZE)?;

    let bytes = writer.into_bytes();
    let bytes = if config.compress {
        compress(&bytes, config.level)?
    } else {
        bytes
    };
    tracing::debug!(
        objects = plan.order.len(),
        bytes = bytes.len(),
        compressed = config.compress,
        "encoded binary resource"
    );
    Ok(bytes)
}

/// Writes the encoding record by record. Compressed output is produced in
/// one piece, since the container needs the uncompressed length up front.
async fn stream_plan(
    plan: &Plan<'_>,
    config: EncodeConfig,
    sink: &mut (dyn AsyncWrite + Unpin + Send),
) -> Result<Vec<u8>, EncodeError> {
    if config.compress {
        let bytes = encode_plan(plan, config)?;
        crate::codec::write_all(sink, &bytes).await?;
        return Ok(bytes);
    }

    let mut out = StreamSink {
        sink,
        hasher: config.checksum.then(Sha256::new),
        written: Vec::new(),
        limit: MAX_RESOURCE_SIZE,
    };

    let mut preamble = Writer::with_capacity(6);
    write_preamble(&mut preamble, config);
    out.put(preamble.as_bytes()).await?;

    let mut frame = Writer::new();
    frame.write_frame(&encode_header(plan)?);
    out.put(frame.as_bytes()).await?;

    for &id in &plan.order {
        let mut frame = Writer::new();
        frame.write_frame(&encode_record(plan, id)?);
        out.put(frame.as_bytes()).await?;
        tracing::trace!(object = ?id, offset = out.written.len(), "record written");
    }

    if let Some(hasher) = out.hasher.take() {
        let digest = hasher.finalize();
        out.put(&digest).await?;
    }
    out.sink
        .flush()
        .await
        .map_err(|e| EncodeError::Io(e.to_string()))?;

    tracing::debug!(
        objects = plan.order.len(),
        bytes = out.written.len(),
        "streamed binary resource"
    );
    Ok(out.written)
}

struct StreamSink<'s> {
    sink: &'s mut (dyn AsyncWrite + Unpin + Send),
    hasher: Option<Sha256>,
    written: Vec<u8>,
    limit: usize,
}

impl StreamSink<'_> {
    async fn put(&mut self, chunk: &[u8]) -> Result<(), EncodeError> {
        check_len("resource", self.written.len() + chunk.len(), self.limit)?;
        self.sink
            .write_all(chunk)
            .await
            .map_err(|e| EncodeError::Io(e.to_string()))?;
        if let Some(hasher) = &mut self.hasher {
            hasher.update(chunk);
        }
        self.written.extend_from_slice(chunk);
        Ok(())
    }
}

fn write_preamble(writer: &mut Writer, config: EncodeConfig) {
    writer.write_bytes(MAGIC);
    writer.write_byte(FORMAT_VERSION);
    writer.write_byte(if config.checksum { FLAG_CHECKSUM } else { 0 });
}

fn check_len(field: &'static str, len: usize, max: usize) -> Result<(), EncodeError> {
    if len > max {
        return Err(EncodeError::LengthExceedsLimit { field, len, max });
    }
    Ok(())
}

fn write_string(writer: &mut Writer, field: &'static str, s: &str) -> Result<(), EncodeError> {
    check_len(field, s.len(), MAX_STRING_LEN)?;
    writer.write_string(s);
    Ok(())
}

fn encode_header(plan: &Plan<'_>) -> Result<Vec<u8>, EncodeError> {
    let mut writer = Writer::new();

    check_len("class count", plan.classes.len(), MAX_CLASSES)?;
    writer.write_varint(plan.classes.len() as u64);
    for class in &plan.classes {
        write_string(&mut writer, "class name", class.name())?;
        check_len("feature count", class.features().len(), MAX_FEATURES_PER_CLASS)?;
        writer.write_varint(class.features().len() as u64);
        for feature in class.features() {
            write_string(&mut writer, "feature name", feature.name())?;
            writer.write_byte(feature.kind().as_u8());
            writer.write_byte(feature.multiplicity().as_u8());
            writer.write_bool(feature.is_unique());
        }
    }

    check_len("root count", plan.roots.len(), MAX_ROOTS)?;
    writer.write_varint(plan.roots.len() as u64);
    for &root in &plan.roots {
        writer.write_uuid(&plan.uuid_of(root)?);
    }

    check_len("object count", plan.order.len(), MAX_OBJECTS)?;
    writer.write_varint(plan.order.len() as u64);

    check_len("header", writer.len(), MAX_RECORD_SIZE)?;
    Ok(writer.into_bytes())
}

fn encode_record(plan: &Plan<'_>, id: ObjectId) -> Result<Vec<u8>, EncodeError> {
    let object = plan.object(id)?;
    let mut writer = Writer::new();
    writer.write_uuid(&object.uuid());
    writer.write_varint(plan.class_index(object.class()) as u64);

    for (feature, slot) in object.class().features().iter().zip(object.slots()) {
        let site = Site {
            object: object.uuid(),
            feature: feature.name(),
        };
        match slot {
            Slot::Single(None) => writer.write_byte(SLOT_UNSET),
            Slot::Single(Some(value)) => {
                writer.write_byte(SLOT_SINGLE);
                write_value(&mut writer, plan, &site, value)?;
            }
            Slot::List(list) if list.is_empty() => writer.write_byte(SLOT_UNSET),
            Slot::List(list) => {
                check_len("list length", list.len(), MAX_ELEMENTS)?;
                writer.write_byte(SLOT_LIST);
                writer.write_varint(list.len() as u64);
                for value in list {
                    write_value(&mut writer, plan, &site, value)?;
                }
            }
            Slot::Map(map) if map.is_empty() => writer.write_byte(SLOT_UNSET),
            Slot::Map(map) => {
                check_len("map length", map.len(), MAX_ELEMENTS)?;
                writer.write_byte(SLOT_MAP);
                writer.write_varint(map.len() as u64);
                for (key, value) in map {
                    write_string(&mut writer, "map key", key)?;
                    write_value(&mut writer, plan, &site, value)?;
                }
            }
        }
    }

    check_len("object record", writer.len(), MAX_RECORD_SIZE)?;
    Ok(writer.into_bytes())
}

/// Where a value sits, for error reports.
struct Site<'a> {
    object: Uuid,
    feature: &'a str,
}

fn write_value(writer: &mut Writer, plan: &Plan<'_>, site: &Site<'_>, value: &Value) -> Result<(), EncodeError> {
    match value {
        Value::Bool(b) => {
            writer.write_byte(VALUE_BOOL);
            writer.write_bool(*b);
        }
        Value::Int(i) => {
            writer.write_byte(VALUE_INT);
            writer.write_signed_varint(*i);
        }
        Value::Float(f) => {
            writer.write_byte(VALUE_FLOAT);
            writer.write_f64(*f);
        }
        Value::String(s) => {
            writer.write_byte(VALUE_STRING);
            write_string(writer, "string value", s)?;
        }
        Value::Bytes(bytes) => {
            check_len("bytes value", bytes.len(), MAX_BYTES_LEN)?;
            writer.write_byte(VALUE_BYTES);
            writer.write_bytes_prefixed(bytes);
        }
        Value::Object(id) => {
            writer.write_byte(VALUE_REF);
            writer.write_uuid(&plan.uuid_of(*id)?);
        }
        Value::Proxy(target) => {
            return Err(EncodeError::UnresolvedProxy {
                object: site.object,
                feature: site.feature.to_string(),
                target: *target,
            });
        }
    }
    Ok(())
}
