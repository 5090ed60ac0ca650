//! Decodes a resource file and prints its containment tree.
//!
//! The codec is chosen from the file name, so `model.emb`, `model.embz` and
//! friends work out of the box.

use std::fs;

use emodel::{CodecOptions, CodecRegistry, ObjectId, Resource, Slot, Value};

fn format_value(resource: &Resource, value: &Value) -> String {
    match value {
        Value::String(s) => {
            let preview: String = s.chars().take(60).collect();
            if s.chars().count() > 60 {
                format!("\"{}...\"", preview)
            } else {
                format!("\"{}\"", preview)
            }
        }
        Value::Int(i) => format!("{}", i),
        Value::Float(f) => format!("{:.6}", f),
        Value::Bool(b) => format!("{}", b),
        Value::Bytes(b) => format!("BYTES[{}]", b.len()),
        Value::Object(id) => match resource.object(*id) {
            Ok(object) => format!("-> {}({})", object.class().name(), object.uuid()),
            Err(_) => format!("-> missing {:?}", id),
        },
        Value::Proxy(uuid) => format!("-> proxy({})", uuid),
    }
}

fn print_object(resource: &Resource, id: ObjectId, depth: usize) {
    let indent = "  ".repeat(depth);
    let Ok(object) = resource.object(id) else {
        println!("{}<missing {:?}>", indent, id);
        return;
    };
    println!("{}{} {}", indent, object.class().name(), object.uuid());

    for (feature, slot) in object.class().features().iter().zip(object.slots()) {
        if !slot.is_set() || feature.kind() == emodel::FeatureKind::Containment {
            continue;
        }
        match slot {
            Slot::Single(Some(value)) => {
                println!("{}  {} = {}", indent, feature.name(), format_value(resource, value));
            }
            Slot::Single(None) => {}
            Slot::List(list) => {
                let items: Vec<String> = list.iter().map(|v| format_value(resource, v)).collect();
                println!("{}  {} = [{}]", indent, feature.name(), items.join(", "));
            }
            Slot::Map(map) => {
                let entries: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, format_value(resource, v)))
                    .collect();
                println!("{}  {} = {{{}}}", indent, feature.name(), entries.join(", "));
            }
        }
    }

    for (feature, slot) in object.class().features().iter().zip(object.slots()) {
        if feature.kind() != emodel::FeatureKind::Containment {
            continue;
        }
        for child in slot.values().filter_map(Value::as_object) {
            print_object(resource, child, depth + 1);
        }
    }
}

fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "model.emb".to_string());

    println!("Reading: {}", path);

    let data = fs::read(&path).expect("Failed to read file");
    println!("File size: {} bytes", data.len());

    let mut resource = Resource::new(path.as_str());
    let codec = CodecRegistry::global().get_codec(resource.uri());
    println!("Codec: {}", codec.name());

    let Some(mut decoder) = codec.new_decoder(&resource, &CodecOptions::new()) else {
        println!("No decoder available for {}", path);
        return;
    };
    let roots = decoder.decode(&data, &mut resource).expect("Failed to decode");

    println!("\n=== Resource ({} objects, {} roots) ===", resource.object_count(), roots.len());
    for root in roots {
        print_object(&resource, root, 0);
    }
}
