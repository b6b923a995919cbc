//! Pluggable schema formats
//!
//! A format knows how to parse a schema body and how to decide whether data
//! written with one parsed schema can be read with another. Formats are enum
//! variants selected from the `type` segment of a schema identity.

mod avro;
mod json;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::compatibility::SchemaChange;
use crate::error::{RegistryError, Result};

/// Supported schema languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaFormat {
    Avro,
    Json,
}

/// A body that parsed successfully under its format
#[derive(Debug, Clone)]
pub enum ParsedSchema {
    Avro(apache_avro::Schema),
    Json(serde_json::Value),
}

impl SchemaFormat {
    /// Resolve the format named by an identity's `type` segment
    pub fn for_type(schema_type: &str) -> Result<Self> {
        match schema_type.to_ascii_lowercase().as_str() {
            "avro" => Ok(SchemaFormat::Avro),
            "json" | "jsonschema" | "json-schema" => Ok(SchemaFormat::Json),
            other => Err(RegistryError::InvalidInput(format!(
                "unsupported schema type '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaFormat::Avro => "avro",
            SchemaFormat::Json => "json",
        }
    }

    /// Parse a body, failing with [`RegistryError::InvalidSchema`]
    pub fn parse(&self, body: &str) -> Result<ParsedSchema> {
        match self {
            SchemaFormat::Avro => avro::parse(body).map(ParsedSchema::Avro),
            SchemaFormat::Json => json::parse(body).map(ParsedSchema::Json),
        }
    }

    /// Problems that stop `reader` from reading data written with `writer`.
    ///
    /// An empty list means the pair is compatible in that direction.
    pub fn read_problems(&self, reader: &ParsedSchema, writer: &ParsedSchema) -> Vec<SchemaChange> {
        let mut problems = Vec::new();
        match (reader, writer) {
            (ParsedSchema::Avro(r), ParsedSchema::Avro(w)) => avro::check_read(r, w, &mut problems),
            (ParsedSchema::Json(r), ParsedSchema::Json(w)) => {
                json::check_read(r, w, "", &mut problems);
            }
            _ => problems.push(SchemaChange::format_mismatch()),
        }
        problems
    }

    /// Problems with `new` replacing `old` for readers of existing data.
    ///
    /// `new` must read data written with `old`, and every field of `old`
    /// without a default must survive in `new`.
    pub fn backward_problems(&self, old: &ParsedSchema, new: &ParsedSchema) -> Vec<SchemaChange> {
        let mut problems = self.read_problems(new, old);
        match (new, old) {
            (ParsedSchema::Avro(n), ParsedSchema::Avro(o)) => {
                avro::check_dropped(n, o, &mut problems);
            }
            (ParsedSchema::Json(n), ParsedSchema::Json(o)) => {
                json::check_dropped(n, o, "", &mut problems);
            }
            _ => {}
        }
        problems
    }

    /// Problems with data written by `new` for readers still on `old`
    pub fn forward_problems(&self, old: &ParsedSchema, new: &ParsedSchema) -> Vec<SchemaChange> {
        self.read_problems(old, new)
    }

    pub fn is_backward_compatible(&self, old: &ParsedSchema, new: &ParsedSchema) -> bool {
        self.backward_problems(old, new).is_empty()
    }

    pub fn is_forward_compatible(&self, old: &ParsedSchema, new: &ParsedSchema) -> bool {
        self.forward_problems(old, new).is_empty()
    }
}

impl fmt::Display for SchemaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn join_path(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}
