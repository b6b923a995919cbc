//! Avro schema resolution rules
//!
//! Named types may appear inline once and as a bare name (`Schema::Ref`)
//! afterwards, in a different position on each side. Every comparison first
//! resolves references against the named types of the schema they came from.

use std::collections::{HashMap, HashSet};

use apache_avro::schema::Name;
use apache_avro::Schema;

use super::join_path;
use crate::compatibility::{ChangeType, SchemaChange};
use crate::error::{RegistryError, Result};

pub(super) fn parse(body: &str) -> Result<Schema> {
    Schema::parse_str(body)
        .map_err(|e| RegistryError::InvalidSchema(format!("Invalid Avro schema: {}", e)))
}

/// Collect everything that prevents `reader` from resolving data written with `writer`
pub(super) fn check_read(reader: &Schema, writer: &Schema, problems: &mut Vec<SchemaChange>) {
    Resolver::new(reader, writer).read(reader, writer, "", problems);
}

/// Fields of `writer` without a default that `reader` no longer declares
pub(super) fn check_dropped(reader: &Schema, writer: &Schema, problems: &mut Vec<SchemaChange>) {
    Resolver::new(reader, writer).dropped(reader, writer, "", problems);
}

/// Writer type can be promoted to the reader type during resolution
fn promotes(writer: &Schema, reader: &Schema) -> bool {
    matches!(
        (writer, reader),
        (Schema::Int, Schema::Long | Schema::Float | Schema::Double)
            | (Schema::Long, Schema::Float | Schema::Double)
            | (Schema::Float, Schema::Double)
            | (Schema::String, Schema::Bytes)
            | (Schema::Bytes, Schema::String)
    )
}

fn type_name(schema: &Schema) -> String {
    match schema {
        Schema::Record(r) => format!("record {}", r.name.name),
        Schema::Enum(e) => format!("enum {}", e.name.name),
        Schema::Fixed(f) => format!("fixed {}", f.name.name),
        Schema::Ref { name } => name.name.clone(),
        Schema::Union(_) => "union".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

type Names<'a> = HashMap<&'a Name, &'a Schema>;

fn collect_names<'a>(schema: &'a Schema, names: &mut Names<'a>) {
    match schema {
        Schema::Record(r) => {
            if names.insert(&r.name, schema).is_none() {
                for field in &r.fields {
                    collect_names(&field.schema, names);
                }
            }
        }
        Schema::Enum(e) => {
            names.insert(&e.name, schema);
        }
        Schema::Fixed(f) => {
            names.insert(&f.name, schema);
        }
        Schema::Array(items) => collect_names(items, names),
        Schema::Map(values) => collect_names(values, names),
        Schema::Union(union) => {
            for variant in union.variants() {
                collect_names(variant, names);
            }
        }
        _ => {}
    }
}

fn resolve<'a>(names: &Names<'a>, schema: &'a Schema) -> &'a Schema {
    match schema {
        Schema::Ref { name } => names.get(name).copied().unwrap_or(schema),
        _ => schema,
    }
}

struct Resolver<'a> {
    reader_names: Names<'a>,
    writer_names: Names<'a>,
    // record pairs currently being compared; guards recursive types
    visiting: HashSet<(&'a Name, &'a Name)>,
}

impl<'a> Resolver<'a> {
    fn new(reader: &'a Schema, writer: &'a Schema) -> Self {
        let mut reader_names = Names::new();
        let mut writer_names = Names::new();
        collect_names(reader, &mut reader_names);
        collect_names(writer, &mut writer_names);
        Self {
            reader_names,
            writer_names,
            visiting: HashSet::new(),
        }
    }

    fn readable(&mut self, reader: &'a Schema, writer: &'a Schema) -> bool {
        let mut problems = Vec::new();
        self.read(reader, writer, "", &mut problems);
        problems.is_empty()
    }

    fn read(
        &mut self,
        reader: &'a Schema,
        writer: &'a Schema,
        path: &str,
        problems: &mut Vec<SchemaChange>,
    ) {
        let reader = resolve(&self.reader_names, reader);
        let writer = resolve(&self.writer_names, writer);
        if reader == writer {
            return;
        }

        match (reader, writer) {
            // every branch the writer may have used must resolve
            (_, Schema::Union(writer_union)) => {
                for (i, branch) in writer_union.variants().iter().enumerate() {
                    let branch_path = join_path(path, &format!("union[{}]", i));
                    self.read(reader, branch, &branch_path, problems);
                }
            }

            (Schema::Union(reader_union), _) => {
                let variants = reader_union.variants();
                if !variants.iter().any(|branch| self.readable(branch, writer)) {
                    problems.push(SchemaChange::new(
                        ChangeType::TypeChanged,
                        path,
                        format!("no union branch can read writer type {}", type_name(writer)),
                    ));
                }
            }

            (Schema::Record(r), Schema::Record(w)) => {
                if r.name != w.name {
                    problems.push(SchemaChange::new(
                        ChangeType::NameChanged,
                        path,
                        format!(
                            "record name changed from '{}' to '{}'",
                            w.name.name, r.name.name
                        ),
                    ));
                    return;
                }
                if !self.visiting.insert((&r.name, &w.name)) {
                    return;
                }
                for reader_field in &r.fields {
                    let field_path = join_path(path, &reader_field.name);
                    match w.fields.iter().find(|f| f.name == reader_field.name) {
                        Some(writer_field) => {
                            let (r, w) = (&reader_field.schema, &writer_field.schema);
                            self.read(r, w, &field_path, problems);
                        }
                        None if reader_field.default.is_none() => {
                            problems.push(SchemaChange::new(
                                ChangeType::MissingDefault,
                                &field_path,
                                format!(
                                    "field '{}' is absent from the writer and has no default",
                                    reader_field.name
                                ),
                            ));
                        }
                        None => {}
                    }
                }
                self.visiting.remove(&(&r.name, &w.name));
            }

            (Schema::Enum(r), Schema::Enum(w)) => {
                if r.name != w.name {
                    problems.push(SchemaChange::new(
                        ChangeType::NameChanged,
                        path,
                        format!("enum name changed from '{}' to '{}'", w.name.name, r.name.name),
                    ));
                    return;
                }
                for symbol in w.symbols.iter().filter(|s| !r.symbols.contains(s)) {
                    problems.push(SchemaChange::new(
                        ChangeType::EnumSymbolRemoved,
                        path,
                        format!("enum symbol '{}' cannot be read", symbol),
                    ));
                }
            }

            (Schema::Array(r), Schema::Array(w)) => {
                self.read(r, w, &join_path(path, "items"), problems);
            }

            (Schema::Map(r), Schema::Map(w)) => {
                self.read(r, w, &join_path(path, "values"), problems);
            }

            (Schema::Fixed(r), Schema::Fixed(w)) => {
                if r.name != w.name || r.size != w.size {
                    problems.push(SchemaChange::new(
                        ChangeType::TypeChanged,
                        path,
                        format!(
                            "fixed {}[{}] cannot read fixed {}[{}]",
                            r.name.name, r.size, w.name.name, w.size
                        ),
                    ));
                }
            }

            _ if promotes(writer, reader) => {}

            _ => {
                problems.push(SchemaChange::new(
                    ChangeType::TypeChanged,
                    path,
                    format!("{} cannot read {}", type_name(reader), type_name(writer)),
                ));
            }
        }
    }

    fn dropped(
        &mut self,
        reader: &'a Schema,
        writer: &'a Schema,
        path: &str,
        problems: &mut Vec<SchemaChange>,
    ) {
        let reader = resolve(&self.reader_names, reader);
        let writer = resolve(&self.writer_names, writer);
        if reader == writer {
            return;
        }

        match (reader, writer) {
            (Schema::Record(r), Schema::Record(w)) if r.name == w.name => {
                if !self.visiting.insert((&r.name, &w.name)) {
                    return;
                }
                for writer_field in &w.fields {
                    let field_path = join_path(path, &writer_field.name);
                    match r.fields.iter().find(|f| f.name == writer_field.name) {
                        Some(reader_field) => {
                            let (r, w) = (&reader_field.schema, &writer_field.schema);
                            self.dropped(r, w, &field_path, problems);
                        }
                        None if writer_field.default.is_none() => {
                            problems.push(SchemaChange::new(
                                ChangeType::FieldRemoved,
                                &field_path,
                                format!(
                                    "field '{}' was removed and has no default",
                                    writer_field.name
                                ),
                            ));
                        }
                        None => {}
                    }
                }
                self.visiting.remove(&(&r.name, &w.name));
            }
            (Schema::Array(r), Schema::Array(w)) => {
                self.dropped(r, w, &join_path(path, "items"), problems);
            }
            (Schema::Map(r), Schema::Map(w)) => {
                self.dropped(r, w, &join_path(path, "values"), problems);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problems(reader: &str, writer: &str) -> Vec<SchemaChange> {
        let mut out = Vec::new();
        check_read(&parse(reader).unwrap(), &parse(writer).unwrap(), &mut out);
        out
    }

    const USER_V1: &str = r#"{"type": "record", "name": "User", "fields": [
        {"name": "a", "type": "int"}
    ]}"#;

    #[test]
    fn test_added_field_with_default_is_readable() {
        let reader = r#"{"type": "record", "name": "User", "fields": [
            {"name": "a", "type": "int"},
            {"name": "b", "type": "int", "default": 0}
        ]}"#;
        assert!(problems(reader, USER_V1).is_empty());
    }

    #[test]
    fn test_added_field_without_default_is_reported() {
        let reader = r#"{"type": "record", "name": "User", "fields": [
            {"name": "b", "type": "int"}
        ]}"#;
        let found = problems(reader, USER_V1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].change_type, ChangeType::MissingDefault);
        assert_eq!(found[0].path, "b");
    }

    #[test]
    fn test_promotions() {
        let long_reader = USER_V1.replace("\"int\"", "\"long\"");
        assert!(problems(&long_reader, USER_V1).is_empty());
        // narrowing is not allowed
        assert_eq!(problems(USER_V1, &long_reader)[0].change_type, ChangeType::TypeChanged);
    }

    #[test]
    fn test_enum_symbol_removal() {
        let wide = r#"{"type": "enum", "name": "Color", "symbols": ["RED", "GREEN", "BLUE"]}"#;
        let narrow = r#"{"type": "enum", "name": "Color", "symbols": ["RED", "GREEN"]}"#;
        assert!(problems(wide, narrow).is_empty());
        let found = problems(narrow, wide);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].change_type, ChangeType::EnumSymbolRemoved);
    }

    #[test]
    fn test_union_resolution() {
        let optional = r#"["null", "string"]"#;
        assert!(problems(optional, r#""string""#).is_empty());
        assert!(!problems(r#""string""#, optional).is_empty());
    }

    #[test]
    fn test_array_items_are_resolved() {
        let ints = r#"{"type": "array", "items": "int"}"#;
        let longs = r#"{"type": "array", "items": "long"}"#;
        assert!(problems(longs, ints).is_empty());
        let found = problems(ints, longs);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "items");
    }

    #[test]
    fn test_dropped_field_without_default() {
        let mut found = Vec::new();
        let without_a = r#"{"type": "record", "name": "User", "fields": []}"#;
        check_dropped(&parse(without_a).unwrap(), &parse(USER_V1).unwrap(), &mut found);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].change_type, ChangeType::FieldRemoved);
        assert_eq!(found[0].path, "a");

        // a field that carried a default may go
        let with_default = r#"{"type": "record", "name": "User", "fields": [
            {"name": "a", "type": "int", "default": 1}
        ]}"#;
        let mut found = Vec::new();
        check_dropped(&parse(without_a).unwrap(), &parse(with_default).unwrap(), &mut found);
        assert!(found.is_empty());
    }

    #[test]
    fn test_named_type_referenced_from_another_position() {
        let writer = r#"{"type": "record", "name": "Outer", "fields": [
            {"name": "x", "type": {"type": "record", "name": "Inner", "fields": [
                {"name": "v", "type": "int"}
            ]}},
            {"name": "y", "type": "Inner"}
        ]}"#;
        let reader = r#"{"type": "record", "name": "Outer", "fields": [
            {"name": "y", "type": {"type": "record", "name": "Inner", "fields": [
                {"name": "v", "type": "long"}
            ]}},
            {"name": "x", "type": "Inner"}
        ]}"#;
        assert!(problems(reader, writer).is_empty());

        let narrowed = reader.replace("\"long\"", "\"string\"");
        let found = problems(&narrowed, writer);
        assert!(found.iter().all(|c| c.change_type == ChangeType::TypeChanged));
        assert!(found.iter().any(|c| c.path == "x.v"));
    }

    #[test]
    fn test_recursive_type_terminates() {
        let list = r#"{"type": "record", "name": "Node", "fields": [
            {"name": "value", "type": "int"},
            {"name": "next", "type": ["null", "Node"]}
        ]}"#;
        let widened = list.replace("\"int\"", "\"long\"");
        assert!(problems(&widened, list).is_empty());
        assert!(!problems(list, &widened).is_empty());
    }

    #[test]
    fn test_record_rename_is_reported() {
        let renamed = USER_V1.replace("\"User\"", "\"Account\"");
        assert_eq!(problems(&renamed, USER_V1)[0].change_type, ChangeType::NameChanged);
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(parse("{a:int}"), Err(RegistryError::InvalidSchema(_))));
    }
}
