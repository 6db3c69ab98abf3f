//! Record classes.
//!
//! A [`Model`] binds a name, a schema and a collection key. It constructs
//! records, runs queries against the remote collection, keeps an optional
//! local mirror of it and holds the relations declared on the model.

use crate::database::{Database, Reference, Snapshot};
use crate::odm::{Odm, OdmShared};
use crate::record::{self, Record, ID_KEY};
use crate::relation::{Cardinality, Relation, RelationSource};
use crate::schema::Schema;
use crate::sync::{Subscription, SyncUpdate};
use crate::{path, Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

/// Local mirror of a remote collection, keyed by record id.
pub type Cache = BTreeMap<String, Value>;

/// A record class.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

struct ModelInner {
    odm: Weak<OdmShared>,
    name: String,
    /// Rooted remote path of the collection
    collection: String,
    schema: Schema,
    relations: RwLock<HashMap<String, Relation>>,
    cache: Arc<RwLock<Cache>>,
    cache_subscription: Mutex<Option<Subscription>>,
}

impl Model {
    pub(crate) fn new(odm: Weak<OdmShared>, name: String, collection: String, schema: Schema) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                odm,
                name,
                collection,
                schema,
                relations: RwLock::new(HashMap::new()),
                cache: Arc::new(RwLock::new(Cache::new())),
                cache_subscription: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Remote path of the collection, including the configured root.
    pub fn collection_path(&self) -> &str {
        &self.inner.collection
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Remote path of the record `id`.
    pub fn record_path(&self, id: &str) -> String {
        path::child(&self.inner.collection, id)
    }

    /// The session this model was defined in.
    pub fn odm(&self) -> Result<Odm> {
        self.inner
            .odm
            .upgrade()
            .map(Odm::from_shared)
            .ok_or(Error::NotConnected)
    }

    pub fn database(&self) -> Result<Arc<dyn Database>> {
        self.inner
            .odm
            .upgrade()
            .and_then(|odm| odm.database())
            .ok_or(Error::NotConnected)
    }

    /// Reference to the collection.
    pub fn reference(&self) -> Result<Reference> {
        Ok(Reference::new(self.database()?, &self.inner.collection))
    }

    /// Reference to the record `id`.
    pub fn record_reference(&self, id: &str) -> Result<Reference> {
        Ok(Reference::new(self.database()?, self.record_path(id)))
    }

    /// Construct a record locally. Nothing is written and sync is off.
    pub fn new_record(&self, props: impl Serialize) -> Result<Record> {
        Record::construct(self, props).map_err(|err| err.wrap(format!("Could not construct {}", self.name())))
    }

    /// Construct a record, write it under a fresh id and enable two-way sync.
    pub async fn create(&self, props: impl Serialize) -> Result<Record> {
        let record = Record::construct(self, props)
            .map_err(|err| err.wrap(format!("Could not create {}", self.name())))?;
        let db = self.database()?;
        let id = record.id()?;

        db.set(&self.record_path(&id), Value::Object(record.fields())).await?;
        record.sync_opts(Some(SyncUpdate::both(true)))?;

        tracing::info!(model = %self.name(), id = %id, "record created");
        Ok(record)
    }

    /// Read one record. Sync stays off on the returned record.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Record>> {
        if id.is_empty() {
            return Ok(None);
        }
        record::check_id(id.to_string())?;
        let db = self.database()?;
        match db.get(&self.record_path(id)).await? {
            None => Ok(None),
            Some(Value::Object(fields)) => Record::from_stored(self, id.to_string(), fields)
                .map(Some)
                .map_err(|err| err.wrap(format!("Could not construct {}", self.name()))),
            Some(other) => Err(Error::InvalidProps(format!(
                "{} {id} is stored as {}",
                self.name(),
                path::type_name(&other)
            ))
            .wrap(format!("Could not construct {}", self.name()))),
        }
    }

    /// Every record whose fields equal each of the given properties.
    ///
    /// `_id` in `props` matches the record id. Records come back in key order.
    pub async fn find(&self, props: impl Serialize) -> Result<Vec<Record>> {
        self.find_matching(props, usize::MAX).await
    }

    pub async fn find_one(&self, props: impl Serialize) -> Result<Option<Record>> {
        Ok(self.find_matching(props, 1).await?.into_iter().next())
    }

    /// Every record in the collection.
    pub async fn all(&self) -> Result<Vec<Record>> {
        self.find_matching(Value::Null, usize::MAX).await
    }

    /// Merge `new_props` into every matching record.
    ///
    /// Each match is re-validated with the new values before it is written;
    /// the returned records carry the merged state.
    pub async fn update(&self, props: impl Serialize, new_props: impl Serialize) -> Result<Vec<Record>> {
        self.update_matching(props, new_props, usize::MAX).await
    }

    pub async fn update_one(
        &self,
        props: impl Serialize,
        new_props: impl Serialize,
    ) -> Result<Option<Record>> {
        Ok(self
            .update_matching(props, new_props, 1)
            .await?
            .into_iter()
            .next())
    }

    /// Remove every matching record; returns how many were removed.
    pub async fn delete(&self, props: impl Serialize) -> Result<usize> {
        self.delete_matching(props, usize::MAX).await
    }

    pub async fn delete_one(&self, props: impl Serialize) -> Result<bool> {
        Ok(self.delete_matching(props, 1).await? == 1)
    }

    async fn find_matching(&self, props: impl Serialize, limit: usize) -> Result<Vec<Record>> {
        let what = format!("Could not find {}", self.name());
        let props = record::props_map(props).map_err(|err| err.wrap(&what))?;
        let mut found = Vec::new();
        for (id, fields) in self.matching(&props, limit).await? {
            found.push(Record::from_stored(self, id, fields).map_err(|err| err.wrap(&what))?);
        }
        Ok(found)
    }

    async fn update_matching(
        &self,
        props: impl Serialize,
        new_props: impl Serialize,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let what = format!("Could not update {}", self.name());
        let props = record::props_map(props).map_err(|err| err.wrap(&what))?;
        let mut changes = record::props_map(new_props).map_err(|err| err.wrap(&what))?;
        changes.remove(ID_KEY);

        let db = self.database()?;
        let mut updated = Vec::new();
        for (id, mut fields) in self.matching(&props, limit).await? {
            for (key, value) in &changes {
                fields.insert(key.clone(), value.clone());
            }
            let record = Record::from_stored(self, id.clone(), fields).map_err(|err| err.wrap(&what))?;
            let validated = record.fields();
            let remote: Map<String, Value> = changes
                .keys()
                .filter(|key| self.schema().contains(key))
                .map(|key| (key.clone(), validated.get(key).cloned().unwrap_or(Value::Null)))
                .collect();
            if !remote.is_empty() {
                db.update(&self.record_path(&id), remote).await?;
            }
            tracing::debug!(model = %self.name(), id = %id, "record updated");
            updated.push(record);
        }
        Ok(updated)
    }

    async fn delete_matching(&self, props: impl Serialize, limit: usize) -> Result<usize> {
        let props = record::props_map(props)
            .map_err(|err| err.wrap(format!("Could not delete {}", self.name())))?;

        let db = self.database()?;
        let mut removed = 0;
        for (id, _) in self.matching(&props, limit).await? {
            db.remove(&self.record_path(&id)).await?;
            tracing::debug!(model = %self.name(), id = %id, "record deleted");
            removed += 1;
        }
        Ok(removed)
    }

    /// Stored records matching `props`, at most `limit` of them.
    async fn matching(
        &self,
        props: &Map<String, Value>,
        limit: usize,
    ) -> Result<Vec<(String, Map<String, Value>)>> {
        let db = self.database()?;
        let collection = db.get(&self.inner.collection).await?;
        Ok(stored_records(self.name(), collection)
            .filter(|(id, fields)| matches(id, fields, props))
            .take(limit)
            .collect())
    }

    /// Load the collection into the local cache.
    ///
    /// With `listen`, the cache follows remote changes until
    /// [`stop_caching`](Self::stop_caching). Repeated calls keep a single
    /// listener.
    pub async fn cache(&self, listen: bool) -> Result<Cache> {
        let db = self.database()?;
        let entries = cache_entries(db.get(&self.inner.collection).await?);
        *self.inner.cache.write() = entries.clone();

        if listen {
            let mut slot = self.inner.cache_subscription.lock();
            if !slot.as_ref().is_some_and(Subscription::is_active) {
                let cache = Arc::clone(&self.inner.cache);
                let model = self.inner.name.clone();
                *slot = Some(Subscription::new(
                    db,
                    self.inner.collection.clone(),
                    Arc::new(move |snapshot: Snapshot| {
                        let entries = cache_entries(snapshot.into_value());
                        tracing::debug!(model = %model, records = entries.len(), "cache refreshed");
                        *cache.write() = entries;
                    }),
                ));
            }
        }

        tracing::info!(model = %self.name(), records = entries.len(), listen, "collection cached");
        Ok(entries)
    }

    /// [`cache`](Self::cache) with the session's `cache_listen` setting.
    pub async fn cache_default(&self) -> Result<Cache> {
        let listen = self
            .inner
            .odm
            .upgrade()
            .map_or(true, |odm| odm.config().cache_listen);
        self.cache(listen).await
    }

    /// The current cache contents.
    pub fn cached(&self) -> Cache {
        self.inner.cache.read().clone()
    }

    /// Build a record from the cache without touching the remote store.
    pub fn cached_record(&self, id: &str) -> Result<Option<Record>> {
        let stored = self.inner.cache.read().get(id).cloned();
        match stored {
            Some(Value::Object(fields)) => Record::from_stored(self, id.to_string(), fields).map(Some),
            _ => Ok(None),
        }
    }

    pub fn is_caching(&self) -> bool {
        self.inner
            .cache_subscription
            .lock()
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Stop following remote changes. The cache keeps its last contents.
    pub fn stop_caching(&self) {
        let subscription = self.inner.cache_subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.cancel();
            tracing::debug!(model = %self.name(), "cache listener stopped");
        }
    }

    /// Declare a relation resolving to at most one `target` record.
    pub fn has_one(&self, name: &str, target: &str, source: RelationSource) -> &Self {
        self.add_relation(name, Relation::new(Cardinality::One, target, source))
    }

    /// Declare a relation resolving to any number of `target` records.
    pub fn has_many(&self, name: &str, target: &str, source: RelationSource) -> &Self {
        self.add_relation(name, Relation::new(Cardinality::Many, target, source))
    }

    pub fn relation(&self, name: &str) -> Option<Relation> {
        self.inner.relations.read().get(name).cloned()
    }

    /// Declared relation names, sorted.
    pub fn relations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.relations.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn add_relation(&self, name: &str, relation: Relation) -> &Self {
        tracing::debug!(model = %self.name(), relation = %name, target = %relation.target(), "relation declared");
        self.inner.relations.write().insert(name.to_string(), relation);
        self
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.name)
            .field("collection", &self.inner.collection)
            .field("relations", &self.relations())
            .finish()
    }
}

/// Object children of a collection value, as `(id, fields)` pairs.
fn stored_records(
    model: &str,
    collection: Option<Value>,
) -> impl Iterator<Item = (String, Map<String, Value>)> + '_ {
    let records = match collection {
        Some(Value::Object(records)) => records,
        _ => Map::new(),
    };
    records.into_iter().filter_map(move |(id, value)| match value {
        Value::Object(fields) => Some((id, fields)),
        other => {
            tracing::warn!(model = %model, id = %id, kind = path::type_name(&other), "skipping malformed record");
            None
        }
    })
}

fn matches(id: &str, fields: &Map<String, Value>, props: &Map<String, Value>) -> bool {
    props.iter().all(|(key, expected)| {
        if key == ID_KEY {
            expected.as_str() == Some(id)
        } else {
            fields.get(key) == Some(expected)
        }
    })
}

fn cache_entries(collection: Option<Value>) -> Cache {
    match collection {
        Some(Value::Object(records)) => records.into_iter().collect(),
        _ => Cache::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn matching_compares_top_level_fields() {
        let fields = json!({"name": "Jorge", "stats": {"level": 1}});
        let fields = fields.as_object().unwrap();

        let props = json!({"name": "Jorge"});
        assert!(matches("p1", fields, props.as_object().unwrap()));

        let props = json!({"stats": {"level": 1}, "_id": "p1"});
        assert!(matches("p1", fields, props.as_object().unwrap()));
        assert!(!matches("p2", fields, props.as_object().unwrap()));

        let props = json!({"name": "Ana"});
        assert!(!matches("p1", fields, props.as_object().unwrap()));

        assert!(matches("p1", fields, &Map::new()));
    }

    #[test]
    fn malformed_records_are_skipped() {
        let collection = json!({"a": {"name": "A"}, "b": 5, "c": {"name": "C"}});
        let ids: Vec<String> = stored_records("Player", Some(collection))
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);

        assert_eq!(stored_records("Player", None).count(), 0);
        assert!(cache_entries(Some(json!(3))).is_empty());
    }
}
