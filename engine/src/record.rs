//! Record instances.
//!
//! A [`Record`] owns a tree of fields validated against its model's schema.
//! All mutation goes through [`Record::set`] and [`Record::remove`], which
//! share one path: check that the written path belongs to the schema, apply
//! the change, re-validate the whole record (restoring the previous state on
//! failure) and, when to-remote sync is on, issue a tracked remote write.
//!
//! Records are cheap handles; clones share the same state.

use crate::database::Snapshot;
use crate::model::Model;
use crate::pending::{PendingWrite, PendingWrites};
use crate::relation::Related;
use crate::sync::{Subscription, SyncController, SyncOptions, SyncUpdate};
use crate::{path, Error, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Key carrying the record id in record properties.
pub const ID_KEY: &str = "_id";

/// A schema-validated, optionally synced document.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

struct RecordInner {
    model: Model,
    state: Mutex<RecordState>,
    pending: PendingWrites,
}

struct RecordState {
    /// Schema fields
    fields: Map<String, Value>,
    /// Local-only values at paths outside the schema
    extras: Map<String, Value>,
    id: Option<String>,
    sync: SyncController,
}

impl Record {
    /// Build a record from user supplied properties.
    ///
    /// A string `_id` property becomes the record id.
    pub(crate) fn construct(model: &Model, props: impl Serialize) -> Result<Record> {
        let mut fields = props_map(props)?;
        let id = match fields.remove(ID_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(check_id(id)?),
            Some(other) => return Err(Error::InvalidId(other.to_string())),
        };
        Self::from_parts(model, id, fields)
    }

    /// Build a record from a value read from the remote store.
    pub(crate) fn from_stored(
        model: &Model,
        id: String,
        mut fields: Map<String, Value>,
    ) -> Result<Record> {
        fields.remove(ID_KEY);
        Self::from_parts(model, Some(check_id(id)?), fields)
    }

    fn from_parts(model: &Model, id: Option<String>, mut fields: Map<String, Value>) -> Result<Record> {
        let schema = model.schema();
        let unknown: Vec<String> = fields
            .keys()
            .filter(|key| !schema.contains(key))
            .cloned()
            .collect();
        let extras: Map<String, Value> = unknown
            .into_iter()
            .filter_map(|key| fields.remove_entry(&key))
            .collect();

        schema.validate_value(&mut fields)?;

        Ok(Record {
            inner: Arc::new(RecordInner {
                model: model.clone(),
                state: Mutex::new(RecordState {
                    fields,
                    extras,
                    id,
                    sync: SyncController::default(),
                }),
                pending: PendingWrites::new(),
            }),
        })
    }

    pub fn model(&self) -> &Model {
        &self.inner.model
    }

    /// The record id, generated from a store key on first access.
    pub fn id(&self) -> Result<String> {
        if let Some(id) = self.try_id() {
            return Ok(id);
        }
        let db = self.inner.model.database()?;
        let key = db.push_key(self.inner.model.collection_path());
        let (id, assigned, from_db) = {
            let mut state = self.inner.state.lock();
            let assigned = state.id.is_none();
            let id = state.id.get_or_insert(key).clone();
            (id, assigned, state.sync.options().from_db)
        };
        if assigned && from_db {
            self.sync_opts(None)?;
        }
        Ok(id)
    }

    /// The record id, if one has been assigned.
    pub fn try_id(&self) -> Option<String> {
        self.inner.state.lock().id.clone()
    }

    /// Read the value at a dotted path. `_id` reads the assigned id.
    pub fn get(&self, path: &str) -> Option<Value> {
        let segments = path::dotted(path);
        if segments == [ID_KEY] {
            return self.try_id().map(Value::String);
        }
        let state = self.inner.state.lock();
        path::get(&state.fields, &segments)
            .or_else(|| path::get(&state.extras, &segments))
            .cloned()
    }

    /// Read the value at a dotted path as `T`.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.get(path)
            .map(|value| {
                serde_json::from_value(value)
                    .map_err(|err| Error::InvalidProps(format!("'{path}': {err}")))
            })
            .transpose()
    }

    /// Write `value` at a dotted path.
    ///
    /// Fails, leaving the record unchanged, when the result does not validate.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        self.write(path, Some(value.into()))
    }

    /// Remove the value at a dotted path.
    ///
    /// Removing a defaulted field restores its default; removing a required
    /// field fails.
    pub fn remove(&self, path: &str) -> Result<()> {
        self.write(path, None)
    }

    /// Schema fields plus `_id` when assigned.
    pub fn to_object(&self) -> Value {
        let state = self.inner.state.lock();
        let mut object = state.fields.clone();
        if let Some(id) = &state.id {
            object.insert(ID_KEY.to_string(), Value::String(id.clone()));
        }
        Value::Object(object)
    }

    /// Schema fields only, as written to the remote store.
    pub fn fields(&self) -> Map<String, Value> {
        self.inner.state.lock().fields.clone()
    }

    /// Current sync flags, without reconciling.
    pub fn sync_options(&self) -> SyncOptions {
        self.inner.state.lock().sync.options()
    }

    /// Update the sync flags and reconcile the remote subscription.
    ///
    /// With `from_db` on and an id assigned, exactly one subscription to the
    /// record's remote path is kept; with `from_db` off, none. Calling this
    /// again with the same flags changes nothing.
    pub fn sync_opts(&self, update: Option<SyncUpdate>) -> Result<SyncOptions> {
        let (released, wanted, options) = {
            let mut state = self.inner.state.lock();
            let released = state.sync.update(update);
            let has_id = state.id.is_some();
            let wanted = if state.sync.wants_subscription(has_id) {
                state.id.clone()
            } else {
                None
            };
            (released, wanted, state.sync.options())
        };
        drop(released);

        if let Some(id) = wanted {
            let subscription = self.subscribe(&id)?;
            let surplus = self.inner.state.lock().sync.attach(subscription);
            drop(surplus);
        }

        Ok(options)
    }

    /// Number of live remote subscriptions (0 or 1).
    pub fn subscription_count(&self) -> usize {
        self.inner.state.lock().sync.subscription_count()
    }

    /// Resolve once every write issued so far has settled.
    pub fn pending_setters(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        self.inner.pending.settle()
    }

    /// A copy of the writes still in flight.
    pub fn pending_writes(&self) -> Vec<PendingWrite> {
        self.inner.pending.snapshot()
    }

    /// Resolve the relation `name`.
    pub async fn relation(&self, name: &str) -> Result<Related> {
        let relation = self
            .inner
            .model
            .relation(name)
            .ok_or_else(|| Error::UnknownRelation {
                model: self.inner.model.name().to_string(),
                relation: name.to_string(),
            })?;
        relation.resolve(self).await
    }

    fn write(&self, path: &str, value: Option<Value>) -> Result<()> {
        let segments = path::dotted(path);
        if segments.is_empty() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        if segments[0] == ID_KEY {
            return Err(Error::InvalidId("the record id cannot be reassigned".into()));
        }

        let model = &self.inner.model;
        let schema = model.schema();

        if !schema.is_relevant(&segments) {
            let mut state = self.inner.state.lock();
            match value {
                Some(value) => path::set(&mut state.extras, &segments, value),
                None => {
                    path::remove(&mut state.extras, &segments);
                }
            }
            return Ok(());
        }

        let (written, target) = {
            let mut state = self.inner.state.lock();
            let previous = state.fields.clone();
            match &value {
                Some(value) => path::set(&mut state.fields, &segments, value.clone()),
                None => {
                    path::remove(&mut state.fields, &segments);
                }
            }

            if let Err(err) = schema.validate_value(&mut state.fields) {
                state.fields = previous;
                return Err(Error::from(err).wrap(describe_write(model.name(), path, value.as_ref())));
            }

            let written = path::get(&state.fields, &segments).cloned();
            let target = state.sync.options().to_db.then(|| state.id.clone());
            (written, target)
        };

        // with to_db on a record without an id is assigned one here
        if let Some(id) = target {
            let id = match id {
                Some(id) => id,
                None => self.id()?,
            };
            self.push_write(&id, &segments, written)?;
        }
        Ok(())
    }

    /// Issue a tracked write of `value` to the record's remote path.
    fn push_write(&self, id: &str, segments: &[&str], value: Option<Value>) -> Result<()> {
        let db = self.inner.model.database()?;
        let remote = path::child(&self.inner.model.record_path(id), &segments.join("/"));
        let value = value.and_then(path::prune);

        let target = remote.clone();
        let write = async move {
            let current = db.get(&target).await?;
            if current == value {
                tracing::debug!(path = %target, "remote value already up to date");
                return Ok(());
            }
            match value {
                Some(value) => db.set(&target, value).await?,
                None => db.remove(&target).await?,
            }
            Ok::<(), Error>(())
        };

        let pending = self.inner.pending.track(remote, write);
        tracing::debug!(write_id = pending.id, path = %pending.path, "write issued");
        Ok(())
    }

    fn subscribe(&self, id: &str) -> Result<Subscription> {
        let db = self.inner.model.database()?;
        let record = Arc::downgrade(&self.inner);
        Ok(Subscription::new(
            db,
            self.inner.model.record_path(id),
            Arc::new(move |snapshot: Snapshot| {
                if let Some(inner) = record.upgrade() {
                    Record { inner }.apply_remote(snapshot);
                }
            }),
        ))
    }

    /// Replace the fields with a remote snapshot.
    fn apply_remote(&self, snapshot: Snapshot) {
        let model = &self.inner.model;
        let Some(Value::Object(mut fields)) = snapshot.into_value() else {
            tracing::warn!(model = %model.name(), "remote record missing or not an object, keeping local state");
            return;
        };

        let schema = model.schema();
        fields.retain(|key, _| schema.contains(key));
        if let Err(err) = schema.validate_value(&mut fields) {
            tracing::warn!(model = %model.name(), error = %err, "rejected remote snapshot");
            return;
        }

        let mut state = self.inner.state.lock();
        if !state.sync.options().from_db {
            return;
        }
        state.fields = fields;
        tracing::debug!(model = %model.name(), id = ?state.id, "applied remote snapshot");
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Record")
            .field("model", &self.inner.model.name())
            .field("id", &state.id)
            .field("fields", &state.fields)
            .field("sync", &state.sync.options())
            .finish()
    }
}

/// Serialise record properties into a JSON object. `null` means no properties.
pub(crate) fn props_map(props: impl Serialize) -> Result<Map<String, Value>> {
    match serde_json::to_value(props).map_err(|err| Error::InvalidProps(err.to_string()))? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(Error::InvalidProps(format!(
            "expected an object, got {}",
            path::type_name(&other)
        ))),
    }
}

/// Ids become remote path segments.
pub(crate) fn check_id(id: String) -> Result<String> {
    if id.is_empty() || id.contains(['/', '.', '#', '$', '[', ']']) {
        return Err(Error::InvalidId(id));
    }
    Ok(id)
}

fn describe_write(model: &str, path: &str, value: Option<&Value>) -> String {
    match value {
        Some(value) => format!(
            "Could not set '{path}' to {value} ({}) on {model}",
            path::type_name(value)
        ),
        None => format!("Could not remove '{path}' from {model}"),
    }
}
