//! Recursive record validation.
//!
//! Validation walks the whole schema on every call. For each field it fills
//! the default when the value is absent, checks requiredness, normalises
//! indexed fields to an empty dictionary, then type-checks whatever is
//! present. Absent and `null` are distinct: only an absent value receives a
//! default, while `null` fails the type check of any non-indexed field.

use crate::path;
use crate::schema::{FieldDescriptor, FieldKind, Schema, SchemaNode};
use crate::ValidationError;
use serde_json::{Map, Value};

/// Validate `fields` against `schema`, writing defaults in place.
pub fn validate(schema: &Schema, fields: &mut Map<String, Value>) -> Result<(), ValidationError> {
    validate_composite(schema, fields, "")
}

fn validate_composite(
    schema: &Schema,
    fields: &mut Map<String, Value>,
    prefix: &str,
) -> Result<(), ValidationError> {
    for (name, node) in schema.fields() {
        let full = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };

        match node {
            SchemaNode::Composite(child) => {
                let value = fields
                    .entry(name)
                    .or_insert_with(|| Value::Object(Map::new()));
                if value.is_null() {
                    *value = Value::Object(Map::new());
                }
                match value {
                    Value::Object(map) => validate_composite(child, map, &full)?,
                    other => {
                        return Err(ValidationError::WrongType {
                            got: path::type_name(other).to_string(),
                            path: full,
                            expected: "object".into(),
                        })
                    }
                }
            }
            SchemaNode::Field(field) => validate_field(field, fields, name, full)?,
        }
    }
    Ok(())
}

fn validate_field(
    field: &FieldDescriptor,
    fields: &mut Map<String, Value>,
    name: &str,
    full: String,
) -> Result<(), ValidationError> {
    if !fields.contains_key(name) {
        if let Some(default) = field.default_value() {
            fields.insert(name.to_string(), default.clone());
        }
    }

    if field.is_required() && !fields.contains_key(name) {
        return Err(ValidationError::MissingRequired { path: full });
    }

    if field.is_indexed() && fields.get(name).map_or(true, Value::is_null) {
        fields.insert(name.to_string(), Value::Object(Map::new()));
    }

    let Some(value) = fields.get(name) else {
        return Ok(());
    };

    match &field.kind {
        FieldKind::Indexed { element } => check_indexed(&element.kind, value, full),
        kind if kind.accepts(value) => Ok(()),
        kind => Err(ValidationError::WrongType {
            path: full,
            expected: kind.to_string(),
            got: path::type_name(value).to_string(),
        }),
    }
}

/// Indexed entries are reported by their own path (`friends.bob`).
fn check_indexed(element: &FieldKind, value: &Value, full: String) -> Result<(), ValidationError> {
    let Some(entries) = value.as_object() else {
        return Err(ValidationError::WrongType {
            expected: format!("map of {element}"),
            got: path::type_name(value).to_string(),
            path: full,
        });
    };

    match entries.iter().find(|(_, entry)| !element.accepts(entry)) {
        Some((key, entry)) => Err(ValidationError::WrongType {
            path: format!("{full}.{key}"),
            expected: element.to_string(),
            got: path::type_name(entry).to_string(),
        }),
        None => Ok(()),
    }
}
