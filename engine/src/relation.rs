//! Relations between models.
//!
//! A relation names a target model and says where the related ids come
//! from. The target is looked up by name when the relation is resolved, so
//! models may refer to each other in any definition order.

use crate::odm::Odm;
use crate::record::Record;
use crate::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Placeholder replaced by the record id in [`RelationSource::Path`].
pub const ID_PLACEHOLDER: &str = "{id}";

/// Computes related ids from a record.
pub type IdCallback = Arc<dyn Fn(&Record) -> Option<Value> + Send + Sync>;

/// Where a relation reads its related ids from.
#[derive(Clone)]
pub enum RelationSource {
    /// A dotted path on the record
    Field(String),
    /// A function of the record
    Callback(IdCallback),
    /// A remote path below the configured root; `{id}` is replaced by the
    /// record id
    Path(String),
}

impl RelationSource {
    pub fn field(path: impl Into<String>) -> Self {
        RelationSource::Field(path.into())
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&Record) -> Option<Value> + Send + Sync + 'static,
    {
        RelationSource::Callback(Arc::new(f))
    }

    pub fn path(template: impl Into<String>) -> Self {
        RelationSource::Path(template.into())
    }

    async fn read(&self, record: &Record, odm: &Odm) -> Result<Option<Value>> {
        match self {
            RelationSource::Field(path) => Ok(record.get(path)),
            RelationSource::Callback(f) => Ok(f(record)),
            RelationSource::Path(template) => {
                let path = template.replace(ID_PLACEHOLDER, &record.id()?);
                Ok(odm.reference(&path)?.once().await?.into_value())
            }
        }
    }
}

impl fmt::Debug for RelationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationSource::Field(path) => f.debug_tuple("Field").field(path).finish(),
            RelationSource::Callback(_) => f.write_str("Callback(..)"),
            RelationSource::Path(template) => f.debug_tuple("Path").field(template).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// A declared relation.
#[derive(Debug, Clone)]
pub struct Relation {
    cardinality: Cardinality,
    target: String,
    source: RelationSource,
}

/// A resolved relation.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl Related {
    /// The single related record, for `One` relations.
    pub fn one(self) -> Option<Record> {
        match self {
            Related::One(record) => record,
            Related::Many(records) => records.into_iter().next(),
        }
    }

    /// All related records.
    pub fn many(self) -> Vec<Record> {
        match self {
            Related::One(record) => record.into_iter().collect(),
            Related::Many(records) => records,
        }
    }
}

impl Relation {
    pub(crate) fn new(cardinality: Cardinality, target: &str, source: RelationSource) -> Self {
        Self {
            cardinality,
            target: target.to_string(),
            source,
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Name of the target model.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn source(&self) -> &RelationSource {
        &self.source
    }

    /// Fetch the records `record` is related to.
    ///
    /// Ids without a stored record are skipped.
    pub async fn resolve(&self, record: &Record) -> Result<Related> {
        let odm = record.model().odm()?;
        let target = odm
            .model(&self.target)
            .ok_or_else(|| Error::UnknownModel(self.target.clone()))?;
        let ids = related_ids(self.source.read(record, &odm).await?);

        match self.cardinality {
            Cardinality::One => match ids.into_iter().next() {
                Some(id) => Ok(Related::One(target.find_by_id(&id).await?)),
                None => Ok(Related::One(None)),
            },
            Cardinality::Many => {
                let mut records = Vec::with_capacity(ids.len());
                for id in ids {
                    match target.find_by_id(&id).await? {
                        Some(related) => records.push(related),
                        None => {
                            tracing::debug!(model = %self.target, id = %id, "related record not found")
                        }
                    }
                }
                Ok(Related::Many(records))
            }
        }
    }
}

/// Ids named by a relation value: a string is one id, an array lists ids and
/// an object is keyed by them.
pub fn related_ids(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::String(id)) => vec![id],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(id) => Some(id),
                _ => None,
            })
            .collect(),
        Some(Value::Object(map)) => map.into_iter().map(|(id, _)| id).collect(),
        _ => Vec::new(),
    }
}
