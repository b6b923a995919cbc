//! JSON Schema reader/writer rules
//!
//! "Reading" a JSON document means validating it. A reader schema can read a
//! writer schema when every document the writer allows is also accepted by the
//! reader, approximated structurally over `type`, `properties`, `required`,
//! `enum` and `additionalProperties`.

use std::collections::BTreeSet;

use jsonschema::JSONSchema;
use serde_json::Value;

use super::join_path;
use crate::compatibility::{ChangeType, SchemaChange};
use crate::error::{RegistryError, Result};

pub(super) fn parse(body: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| RegistryError::InvalidSchema(format!("Invalid JSON: {}", e)))?;
    if !value.is_object() && !value.is_boolean() {
        return Err(RegistryError::InvalidSchema(
            "JSON Schema must be an object or a boolean".to_string(),
        ));
    }
    if let Err(e) = JSONSchema::compile(&value) {
        return Err(RegistryError::InvalidSchema(format!("Invalid JSON Schema: {}", e)));
    }
    Ok(value)
}

fn required(schema: &Value) -> BTreeSet<&str> {
    schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default()
}

fn types(schema: &Value) -> Option<BTreeSet<&str>> {
    match schema.get("type")? {
        Value::String(t) => Some(BTreeSet::from([t.as_str()])),
        Value::Array(ts) => Some(ts.iter().filter_map(|t| t.as_str()).collect()),
        _ => None,
    }
}

/// Reader `type` accepts every type the writer may produce
fn accepts_types(reader: &Value, writer: &Value) -> bool {
    let Some(reader_types) = types(reader) else {
        return true;
    };
    let Some(writer_types) = types(writer) else {
        return false;
    };
    writer_types.iter().all(|t| {
        reader_types.contains(t) || (*t == "integer" && reader_types.contains("number"))
    })
}

fn is_closed(schema: &Value) -> bool {
    schema.get("additionalProperties") == Some(&Value::Bool(false))
}

pub(super) fn check_read(
    reader: &Value,
    writer: &Value,
    path: &str,
    problems: &mut Vec<SchemaChange>,
) {
    if reader == writer || reader == &Value::Bool(true) {
        return;
    }

    if !accepts_types(reader, writer) {
        problems.push(SchemaChange::new(
            ChangeType::TypeChanged,
            path,
            format!(
                "type {} does not accept {}",
                reader.get("type").map(|t| t.to_string()).unwrap_or_default(),
                writer.get("type").map(|t| t.to_string()).unwrap_or_else(|| "any".to_string()),
            ),
        ));
        return;
    }

    let writer_required = required(writer);
    for name in required(reader).difference(&writer_required) {
        problems.push(SchemaChange::new(
            ChangeType::MissingDefault,
            &join_path(path, name),
            format!("property '{}' is required but the writer may omit it", name),
        ));
    }

    let empty = serde_json::Map::new();
    let reader_props = reader.get("properties").and_then(|p| p.as_object()).unwrap_or(&empty);
    let writer_props = writer.get("properties").and_then(|p| p.as_object()).unwrap_or(&empty);

    for (name, writer_prop) in writer_props {
        let prop_path = join_path(path, name);
        match reader_props.get(name) {
            Some(reader_prop) => check_read(reader_prop, writer_prop, &prop_path, problems),
            None if is_closed(reader) => {
                problems.push(SchemaChange::new(
                    ChangeType::UndeclaredProperty,
                    &prop_path,
                    format!("property '{}' is not allowed by the reader", name),
                ));
            }
            None => {}
        }
    }

    if let Some(reader_enum) = reader.get("enum").and_then(|e| e.as_array()) {
        match writer.get("enum").and_then(|e| e.as_array()) {
            Some(writer_enum) => {
                for value in writer_enum.iter().filter(|v| !reader_enum.contains(v)) {
                    problems.push(SchemaChange::new(
                        ChangeType::EnumSymbolRemoved,
                        path,
                        format!("enum value {} cannot be read", value),
                    ));
                }
            }
            None => problems.push(SchemaChange::new(
                ChangeType::EnumSymbolRemoved,
                path,
                "reader restricts values with an enum the writer does not have".to_string(),
            )),
        }
    }
}

/// Required writer properties with no `default` that the reader no longer declares
pub(super) fn check_dropped(
    reader: &Value,
    writer: &Value,
    path: &str,
    problems: &mut Vec<SchemaChange>,
) {
    if reader == writer {
        return;
    }

    let empty = serde_json::Map::new();
    let reader_props = reader.get("properties").and_then(|p| p.as_object()).unwrap_or(&empty);
    let writer_props = writer.get("properties").and_then(|p| p.as_object()).unwrap_or(&empty);
    let reader_required = required(reader);

    for name in required(writer) {
        let has_default = writer_props
            .get(name)
            .map_or(false, |p| p.get("default").is_some());
        if !reader_props.contains_key(name) && !reader_required.contains(name) && !has_default {
            problems.push(SchemaChange::new(
                ChangeType::FieldRemoved,
                &join_path(path, name),
                format!("required property '{}' was removed and has no default", name),
            ));
        }
    }

    for (name, writer_prop) in writer_props {
        if let Some(reader_prop) = reader_props.get(name) {
            check_dropped(reader_prop, writer_prop, &join_path(path, name), problems);
        }
    }
}
