//! JSON export.
//!
//! Encode-only. The document lists objects in containment pre-order:
//!
//! ```json
//! {
//!   "uri": "models/a.json",
//!   "roots": ["6f1c..."],
//!   "objects": [
//!     { "uuid": "6f1c...", "class": "Node", "features": { "name": "root", "buddy": { "$ref": "81aa..." } } }
//!   ]
//! }
//! ```
//!
//! Unset features are omitted. Lists become arrays and maps become objects in
//! insertion order. Byte strings are written as `{ "$bytes": "<hex>" }`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value as JsonValue};

use crate::codec::walk::Plan;
use crate::codec::{Codec, CodecOptions, Decoder, Encoder};
use crate::collections::{is_elist, is_emap};
use crate::error::EncodeError;
use crate::model::{EObject, ObjectId, Resource, Slot, Value};

/// File extension served by the JSON codec.
pub const EXTENSION: &str = "json";

const MAX_INDENT: u64 = 16;

/// Encode-only JSON codec.
///
/// Encoder options:
/// - `indent` (int): spaces per nesting level, 0 for compact output. Default 2.
/// - `encoding` (string): only `"utf-8"` is accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn new_encoder(&self, _resource: &Resource, options: &CodecOptions) -> Option<Box<dyn Encoder>> {
        Some(Box::new(JsonEncoder::new(options)))
    }

    fn new_decoder(&self, _resource: &Resource, _options: &CodecOptions) -> Option<Box<dyn Decoder>> {
        None
    }
}

/// Writes a resource as a JSON document.
#[derive(Debug, Clone)]
pub struct JsonEncoder {
    indent: Result<usize, EncodeError>,
}

impl JsonEncoder {
    pub fn new(options: &CodecOptions) -> Self {
        Self {
            indent: read_indent(options),
        }
    }

    fn write(&self, plan: &Plan<'_>) -> Result<Vec<u8>, EncodeError> {
        let indent = self.indent.clone()?;
        let document = document(plan)?;

        let mut out = Vec::new();
        if indent == 0 {
            serde_json::to_writer(&mut out, &document).map_err(|e| EncodeError::Io(e.to_string()))?;
        } else {
            let spaces = vec![b' '; indent];
            let mut serializer =
                serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(&spaces));
            document
                .serialize(&mut serializer)
                .map_err(|e| EncodeError::Io(e.to_string()))?;
        }

        tracing::debug!(
            objects = plan.order.len(),
            bytes = out.len(),
            indent,
            "json resource encoded"
        );
        Ok(out)
    }
}

fn read_indent(options: &CodecOptions) -> Result<usize, EncodeError> {
    if let Some(encoding) = options.str_option("encoding")? {
        if !encoding.eq_ignore_ascii_case("utf-8") && !encoding.eq_ignore_ascii_case("utf8") {
            return Err(EncodeError::UnsupportedOption {
                key: "encoding".to_string(),
                value: encoding.to_string(),
            });
        }
    }
    match options.u64_option("indent")? {
        None => Ok(2),
        Some(indent) if indent <= MAX_INDENT => Ok(indent as usize),
        Some(indent) => Err(EncodeError::UnsupportedOption {
            key: "indent".to_string(),
            value: indent.to_string(),
        }),
    }
}

#[async_trait]
impl Encoder for JsonEncoder {
    fn encode(&self, resource: &Resource) -> Result<Vec<u8>, EncodeError> {
        self.write(&Plan::for_resource(resource)?)
    }

    fn encode_object(&self, resource: &Resource, object: ObjectId) -> Result<Vec<u8>, EncodeError> {
        self.write(&Plan::for_object(resource, object)?)
    }
}

fn document(plan: &Plan<'_>) -> Result<JsonValue, EncodeError> {
    let mut roots = Vec::with_capacity(plan.roots.len());
    for &root in &plan.roots {
        roots.push(JsonValue::String(plan.uuid_of(root)?.to_string()));
    }
    let mut objects = Vec::with_capacity(plan.order.len());
    for &id in &plan.order {
        objects.push(object(plan, plan.object(id)?)?);
    }

    let mut doc = Map::new();
    doc.insert("uri".into(), plan.resource.uri().as_str().into());
    doc.insert("roots".into(), JsonValue::Array(roots));
    doc.insert("objects".into(), JsonValue::Array(objects));
    Ok(JsonValue::Object(doc))
}

fn object(plan: &Plan<'_>, object: &EObject) -> Result<JsonValue, EncodeError> {
    let mut features = Map::new();
    for (feature, slot) in object.class().features().iter().zip(object.slots()) {
        if !slot.is_set() {
            continue;
        }
        features.insert(feature.name().to_string(), slot_value(plan, slot)?);
    }

    let mut out = Map::new();
    out.insert("uuid".into(), object.uuid().to_string().into());
    out.insert("class".into(), object.class().name().into());
    out.insert("features".into(), JsonValue::Object(features));
    Ok(JsonValue::Object(out))
}

fn slot_value(plan: &Plan<'_>, slot: &Slot) -> Result<JsonValue, EncodeError> {
    if is_emap(slot) {
        let mut entries = Map::new();
        if let Some(map) = slot.as_map() {
            for (key, value) in map {
                entries.insert(key.clone(), value_to_json(plan, value)?);
            }
        }
        return Ok(JsonValue::Object(entries));
    }
    if is_elist(slot) {
        let items = slot
            .values()
            .map(|value| value_to_json(plan, value))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(JsonValue::Array(items));
    }
    match slot.as_single() {
        Some(value) => value_to_json(plan, value),
        None => Ok(JsonValue::Null),
    }
}

fn value_to_json(plan: &Plan<'_>, value: &Value) -> Result<JsonValue, EncodeError> {
    let json = match value {
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        // Non-finite floats have no JSON form and become null.
        Value::Float(f) => JsonValue::from(*f),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            tagged("$bytes", hex)
        }
        Value::Object(id) => tagged("$ref", plan.uuid_of(*id)?.to_string()),
        Value::Proxy(uuid) => tagged("$ref", uuid.to_string()),
    };
    Ok(json)
}

fn tagged(tag: &str, value: String) -> JsonValue {
    let mut map = Map::new();
    map.insert(tag.to_string(), JsonValue::String(value));
    JsonValue::Object(map)
}
