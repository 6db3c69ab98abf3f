//! Schema definition.
//!
//! A [`Schema`] maps field names to either a [`FieldDescriptor`] or a nested
//! schema. Descriptors are produced by the builder functions in this module:
//!
//! ```rust
//! use firesync_engine::schema::{self, indexed, Schema};
//!
//! let schema = Schema::builder()
//!     .field("name", schema::string())
//!     .field("age", schema::number().optional())
//!     .field("class", schema::enumeration(["mage", "rogue"]).with_default("mage"))
//!     .field("friends", indexed::string())
//!     .nested("stats", Schema::builder().field("level", schema::number().with_default(1)))
//!     .build()
//!     .unwrap();
//!
//! assert!(schema.is_relevant(&["friends", "bob"]));
//! ```
//!
//! Definition-time problems (an enum default that is not one of its values, a
//! default of the wrong type) are reported by [`SchemaBuilder::build`].

use crate::{path, validate, Error, Result, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The type of value a field holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    /// One of a fixed, ordered set of values.
    Enum { values: Vec<Value> },
    /// A dictionary whose entries all match `element`.
    Indexed { element: Box<FieldDescriptor> },
}

impl FieldKind {
    /// Check a present value against this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Enum { values } => values.contains(value),
            FieldKind::Indexed { element } => value
                .as_object()
                .is_some_and(|entries| entries.values().all(|v| element.kind.accepts(v))),
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::String => write!(f, "string"),
            FieldKind::Number => write!(f, "number"),
            FieldKind::Boolean => write!(f, "boolean"),
            FieldKind::Enum { values } => {
                let values: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "one of [{}]", values.join(", "))
            }
            FieldKind::Indexed { element } => write!(f, "map of {}", element.kind),
        }
    }
}

/// Definition of a single schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Field type
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Explicit requiredness, if one was given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    required: Option<bool>,
    /// Value written when the field is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
}

impl FieldDescriptor {
    fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: None,
            default: None,
        }
    }

    /// Mark the field as always present (via input or default).
    pub fn required(mut self) -> Self {
        self.required = Some(true);
        self
    }

    /// Mark the field as optional.
    pub fn optional(mut self) -> Self {
        self.required = Some(false);
        self
    }

    /// Value written into the record whenever the field is absent.
    ///
    /// A field with a default is optional unless [`required`](Self::required)
    /// is also called.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Whether a record must carry this field after defaults are applied.
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(self.default.is_none())
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.kind, FieldKind::Indexed { .. })
    }

    /// Definition-time checks.
    fn verify(&self, path: &str) -> Result<()> {
        match &self.kind {
            FieldKind::Enum { values } if values.is_empty() => {
                return Err(Error::Schema(format!(
                    "enum field '{path}' must allow at least one value"
                )));
            }
            FieldKind::Indexed { element } => {
                if element.is_indexed() {
                    return Err(Error::Schema(format!(
                        "indexed field '{path}' cannot hold indexed values"
                    )));
                }
                element.verify(path)?;
            }
            _ => {}
        }

        if let Some(default) = &self.default {
            if !self.kind.accepts(default) {
                let message = match &self.kind {
                    FieldKind::Enum { .. } => format!(
                        "default {default} of field '{path}' is not one of its allowed values"
                    ),
                    kind => format!(
                        "default {default} of field '{path}' is not a {kind} (got {})",
                        path::type_name(default)
                    ),
                };
                return Err(Error::Schema(message));
            }
        }

        Ok(())
    }
}

/// A string field, required unless configured otherwise.
pub fn string() -> FieldDescriptor {
    FieldDescriptor::new(FieldKind::String)
}

/// A number field, required unless configured otherwise.
pub fn number() -> FieldDescriptor {
    FieldDescriptor::new(FieldKind::Number)
}

/// A boolean field, required unless configured otherwise.
pub fn boolean() -> FieldDescriptor {
    FieldDescriptor::new(FieldKind::Boolean)
}

/// A field restricted to `values`.
pub fn enumeration<I, V>(values: I) -> FieldDescriptor
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    FieldDescriptor::new(FieldKind::Enum {
        values: values.into_iter().map(Into::into).collect(),
    })
}

/// Dictionary fields whose entries share one primitive type.
///
/// Indexed fields default to an empty dictionary.
pub mod indexed {
    use super::{FieldDescriptor, FieldKind};
    use serde_json::{Map, Value};

    /// A dictionary of `element` values.
    pub fn of(element: FieldDescriptor) -> FieldDescriptor {
        FieldDescriptor::new(FieldKind::Indexed {
            element: Box::new(element),
        })
        .with_default(Value::Object(Map::new()))
    }

    pub fn string() -> FieldDescriptor {
        of(super::string())
    }

    pub fn number() -> FieldDescriptor {
        of(super::number())
    }

    pub fn boolean() -> FieldDescriptor {
        of(super::boolean())
    }

    pub fn enumeration<I, V>(values: I) -> FieldDescriptor
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        of(super::enumeration(values))
    }
}

/// A node in the schema tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchemaNode {
    Field(FieldDescriptor),
    Composite(Schema),
}

/// A frozen schema tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Schema {
    fields: BTreeMap<String, SchemaNode>,
}

impl Schema {
    /// Start defining a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Top-level fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.fields.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The node declared at `segments`, if any.
    pub fn node_at(&self, segments: &[&str]) -> Option<&SchemaNode> {
        let (first, rest) = segments.split_first()?;
        let mut node = self.fields.get(*first)?;
        for segment in rest {
            node = match node {
                SchemaNode::Composite(schema) => schema.fields.get(*segment)?,
                SchemaNode::Field(_) => return None,
            };
        }
        Some(node)
    }

    /// Whether a write at `segments` must be validated and synced.
    ///
    /// A path is relevant when it is declared in the schema or when its parent
    /// is an indexed field (any key of the dictionary).
    pub fn is_relevant(&self, segments: &[&str]) -> bool {
        if self.node_at(segments).is_some() {
            return true;
        }
        match segments.split_last() {
            Some((_, parent)) if !parent.is_empty() => matches!(
                self.node_at(parent),
                Some(SchemaNode::Field(field)) if field.is_indexed()
            ),
            _ => false,
        }
    }

    /// Validate a detached record value, applying defaults in place.
    pub fn validate_value(&self, fields: &mut Map<String, Value>) -> Result<(), ValidationError> {
        validate::validate(self, fields)
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<(String, BuilderNode)>,
}

#[derive(Debug)]
enum BuilderNode {
    Field(FieldDescriptor),
    Nested(SchemaBuilder),
}

impl SchemaBuilder {
    /// Declare a field.
    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields
            .push((name.into(), BuilderNode::Field(descriptor)));
        self
    }

    /// Declare a nested object field.
    pub fn nested(mut self, name: impl Into<String>, schema: SchemaBuilder) -> Self {
        self.fields.push((name.into(), BuilderNode::Nested(schema)));
        self
    }

    /// Check every declaration and freeze the schema.
    pub fn build(self) -> Result<Schema> {
        self.build_at("")
    }

    fn build_at(self, prefix: &str) -> Result<Schema> {
        let mut fields = BTreeMap::new();
        for (name, node) in self.fields {
            if name.is_empty() || name.contains(['.', '/']) {
                return Err(Error::Schema(format!(
                    "invalid field name {name:?}: names must be non-empty and contain no '.' or '/'"
                )));
            }
            if prefix.is_empty() && name == "_id" {
                return Err(Error::Schema("'_id' is reserved for the record id".into()));
            }

            let full = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            let node = match node {
                BuilderNode::Field(descriptor) => {
                    descriptor.verify(&full)?;
                    SchemaNode::Field(descriptor)
                }
                BuilderNode::Nested(builder) => SchemaNode::Composite(builder.build_at(&full)?),
            };

            if fields.insert(name, node).is_some() {
                return Err(Error::Schema(format!("field '{full}' is declared twice")));
            }
        }
        Ok(Schema { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requiredness_resolution() {
        assert!(string().is_required());
        assert!(!string().optional().is_required());
        assert!(!string().with_default("x").is_required());
        assert!(string().with_default("x").required().is_required());
        assert!(string().required().with_default("x").is_required());
        assert!(!number().required().optional().is_required());
        assert!(!indexed::string().is_required());
        assert_eq!(indexed::number().default_value(), Some(&json!({})));
    }

    #[test]
    fn enum_default_must_be_allowed() {
        let result = Schema::builder()
            .field(
                "class",
                enumeration(["mage", "rogue"]).with_default("bard"),
            )
            .build();
        assert!(matches!(result, Err(Error::Schema(msg)) if msg.contains("allowed values")));

        let result = Schema::builder()
            .field("class", enumeration(["mage", "rogue"]).with_default("rogue"))
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn empty_enum_rejected() {
        let result = Schema::builder()
            .field("class", enumeration(Vec::<Value>::new()))
            .build();
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn default_must_match_type() {
        let result = Schema::builder()
            .field("age", number().with_default("old"))
            .build();
        assert!(matches!(result, Err(Error::Schema(msg)) if msg.contains("'age'")));

        let result = Schema::builder()
            .nested("stats", Schema::builder().field("hp", boolean().with_default(3)))
            .build();
        assert!(matches!(result, Err(Error::Schema(msg)) if msg.contains("'stats.hp'")));
    }

    #[test]
    fn invalid_names_rejected() {
        assert!(Schema::builder().field("a.b", string()).build().is_err());
        assert!(Schema::builder().field("", string()).build().is_err());
        assert!(Schema::builder().field("_id", string()).build().is_err());
        assert!(Schema::builder()
            .field("name", string())
            .field("name", number())
            .build()
            .is_err());
        assert!(Schema::builder()
            .field("friends", indexed::of(indexed::string()))
            .build()
            .is_err());
    }

    #[test]
    fn node_lookup_and_relevance() {
        let schema = Schema::builder()
            .field("name", string())
            .field("friends", indexed::string())
            .nested("stats", Schema::builder().field("level", number()))
            .build()
            .unwrap();

        assert!(matches!(
            schema.node_at(&["stats"]),
            Some(SchemaNode::Composite(_))
        ));
        assert!(matches!(
            schema.node_at(&["stats", "level"]),
            Some(SchemaNode::Field(_))
        ));
        assert!(schema.node_at(&["name", "first"]).is_none());

        assert!(schema.is_relevant(&["name"]));
        assert!(schema.is_relevant(&["stats", "level"]));
        assert!(schema.is_relevant(&["friends", "anyone"]));
        assert!(!schema.is_relevant(&["friends", "anyone", "deeper"]));
        assert!(!schema.is_relevant(&["nickname"]));
        assert!(!schema.is_relevant(&["name", "first"]));
        assert!(!schema.is_relevant(&[]));
    }

    #[test]
    fn kind_acceptance() {
        assert!(FieldKind::Number.accepts(&json!(4.5)));
        assert!(!FieldKind::Number.accepts(&json!(null)));
        assert!(!FieldKind::String.accepts(&json!(4)));
        let kind = indexed::string().kind;
        assert!(kind.accepts(&json!({"bob": "friend"})));
        assert!(!kind.accepts(&json!({"bob": 4})));
        assert!(!kind.accepts(&json!(["friend"])));
    }

    #[test]
    fn descriptor_serialization() {
        let descriptor = enumeration(["a", "b"]).with_default("a");
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(
            json,
            json!({"kind": "enum", "values": ["a", "b"], "default": "a"})
        );
        let parsed: FieldDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, descriptor);
    }
}
