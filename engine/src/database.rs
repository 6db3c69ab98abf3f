//! The remote store interface.
//!
//! The engine never talks to a concrete backend directly. Everything it needs
//! from the realtime store is expressed by [`Database`]: one-shot reads,
//! single-path writes, store-generated keys and change listeners, all
//! addressed by slash-delimited paths. [`Reference`] is the path-bound handle
//! application code works with.

use crate::{path, RemoteError, Result};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Future returned by database operations.
pub type DbFuture<T> = BoxFuture<'static, std::result::Result<T, RemoteError>>;

/// Identifies a registered listener.
pub type ListenerId = u64;

/// Callback receiving change notifications.
pub type Listener = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// A hierarchical realtime key-value store.
///
/// Writes are single-path and atomic. Setting `null` is the same as removing.
/// Listeners registered with [`on`](Database::on) are notified of changes at,
/// above or below their path after registration; they are not replayed the
/// current value (use [`get`](Database::get) for that).
pub trait Database: Send + Sync {
    /// Read the value stored at `path`.
    fn get(&self, path: &str) -> DbFuture<Option<Value>>;

    /// Replace the value stored at `path`.
    fn set(&self, path: &str, value: Value) -> DbFuture<()>;

    /// Write each child of `values` below `path`, leaving other children alone.
    fn update(&self, path: &str, values: Map<String, Value>) -> DbFuture<()>;

    /// Remove the value stored at `path`.
    fn remove(&self, path: &str) -> DbFuture<()>;

    /// Generate a unique, time-ordered child key for `path`.
    fn push_key(&self, path: &str) -> String;

    /// Register a change listener for `path`.
    fn on(&self, path: &str, listener: Listener) -> ListenerId;

    /// Unregister a listener. Unknown ids are ignored.
    fn off(&self, path: &str, id: ListenerId);
}

/// The value at a path at some point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    key: Option<String>,
    value: Option<Value>,
}

impl Snapshot {
    pub fn new(path: &str, value: Option<Value>) -> Self {
        Self {
            key: path::slashed(path).last().map(|s| s.to_string()),
            value: value.filter(|v| !v.is_null()),
        }
    }

    /// Last segment of the snapshot's path (`None` at the root).
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// The stored value, `None` if nothing is stored.
    pub fn val(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    pub fn into_value(self) -> Option<Value> {
        self.value
    }
}

/// A handle to a path in a [`Database`].
#[derive(Clone)]
pub struct Reference {
    db: Arc<dyn Database>,
    path: String,
}

impl Reference {
    pub fn new(db: Arc<dyn Database>, path: impl AsRef<str>) -> Self {
        Self {
            db,
            path: path::join(&path::slashed(path.as_ref())),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last segment of the path (`None` at the root).
    pub fn key(&self) -> Option<&str> {
        self.path.rsplit('/').next().filter(|s| !s.is_empty())
    }

    pub fn child(&self, path: &str) -> Reference {
        Reference {
            db: Arc::clone(&self.db),
            path: path::child(&self.path, path),
        }
    }

    /// A child reference under a newly generated key.
    pub fn push(&self) -> Reference {
        let key = self.db.push_key(&self.path);
        self.child(&key)
    }

    /// Read the current value once.
    pub async fn once(&self) -> Result<Snapshot> {
        let value = self.db.get(&self.path).await?;
        Ok(Snapshot::new(&self.path, value))
    }

    pub async fn set(&self, value: Value) -> Result<()> {
        Ok(self.db.set(&self.path, value).await?)
    }

    pub async fn update(&self, values: Map<String, Value>) -> Result<()> {
        Ok(self.db.update(&self.path, values).await?)
    }

    pub async fn remove(&self) -> Result<()> {
        Ok(self.db.remove(&self.path).await?)
    }

    /// Listen for changes. Pass the returned id to [`off`](Self::off).
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        self.db.on(&self.path, Arc::new(listener))
    }

    pub fn off(&self, id: ListenerId) {
        self.db.off(&self.path, id);
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference").field("path", &self.path).finish()
    }
}
