//! In-process realtime store.
//!
//! [`MemoryDatabase`] keeps a single JSON tree behind a lock and implements
//! [`Database`] on top of it. It follows the semantics the engine expects from
//! a realtime backend:
//!
//! - `null` values and empty objects are never stored,
//! - writes apply when the operation is called, the returned future is ready,
//! - listeners fire after the tree lock is released, only for paths that
//!   overlap the write and only when their value actually changed.
//!
//! Cloning a `MemoryDatabase` yields another handle to the same tree.

use crate::database::{Database, DbFuture, Listener, ListenerId, Snapshot};
use crate::{path, RemoteError};
use dashmap::DashMap;
use futures::future::{self, FutureExt};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A [`Database`] held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Inner>,
}

struct Inner {
    tree: RwLock<Map<String, Value>>,
    listeners: DashMap<ListenerId, Registration>,
    next_listener: AtomicU64,
    next_key: AtomicU64,
    /// Client component of generated keys
    node: String,
    offline: AtomicBool,
}

impl Default for Inner {
    fn default() -> Self {
        let node = uuid::Uuid::new_v4().simple().to_string();
        Self {
            tree: RwLock::new(Map::new()),
            listeners: DashMap::new(),
            next_listener: AtomicU64::new(1),
            next_key: AtomicU64::new(0),
            node: node[..8].to_string(),
            offline: AtomicBool::new(false),
        }
    }
}

#[derive(Clone)]
struct Registration {
    path: Vec<String>,
    listener: Listener,
}

type Change = (Vec<String>, Option<Value>);

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// The whole tree.
    pub fn value(&self) -> Value {
        Value::Object(self.inner.tree.read().clone())
    }

    /// Number of listeners registered at exactly `path`.
    pub fn listener_count(&self, path: &str) -> usize {
        let segments = owned_segments(path);
        self.inner
            .listeners
            .iter()
            .filter(|entry| entry.path == segments)
            .count()
    }

    /// Simulate losing the connection: every operation fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("memory database is offline".into()));
        }
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        self.check_online()?;
        let tree = self.inner.tree.read();
        Ok(read_at(&tree, &owned_segments(path)))
    }

    /// Apply `changes` atomically and notify interested listeners.
    fn write(&self, changes: Vec<Change>) -> Result<(), RemoteError> {
        self.check_online()?;

        for (segments, value) in &changes {
            match value {
                Some(value) if segments.is_empty() && !value.is_object() && !value.is_null() => {
                    return Err(RemoteError::Rejected {
                        path: "/".into(),
                        reason: format!(
                            "the root must hold an object, got {}",
                            path::type_name(value)
                        ),
                    });
                }
                _ => {}
            }
        }

        let interested: Vec<Registration> = self
            .inner
            .listeners
            .iter()
            .filter(|entry| changes.iter().any(|(written, _)| overlaps(&entry.path, written)))
            .map(|entry| entry.value().clone())
            .collect();

        let notifications: Vec<(Listener, Snapshot)> = {
            let mut tree = self.inner.tree.write();
            let before: Vec<Option<Value>> = interested
                .iter()
                .map(|registration| read_at(&tree, &registration.path))
                .collect();

            for (segments, value) in changes {
                let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
                match value.and_then(path::prune) {
                    Some(Value::Object(map)) if segments.is_empty() => *tree = map,
                    Some(value) => path::set(&mut tree, &segments, value),
                    None if segments.is_empty() => tree.clear(),
                    None => {
                        path::remove(&mut tree, &segments);
                    }
                }
            }

            *tree = match path::prune(Value::Object(std::mem::take(&mut *tree))) {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };

            interested
                .into_iter()
                .zip(before)
                .filter_map(|(registration, before)| {
                    let after = read_at(&tree, &registration.path);
                    (after != before).then(|| {
                        let snapshot = Snapshot::new(&registration.path.join("/"), after);
                        (registration.listener, snapshot)
                    })
                })
                .collect()
        };

        for (listener, snapshot) in notifications {
            listener(snapshot);
        }
        Ok(())
    }
}

impl Database for MemoryDatabase {
    fn get(&self, path: &str) -> DbFuture<Option<Value>> {
        future::ready(self.read(path)).boxed()
    }

    fn set(&self, path: &str, value: Value) -> DbFuture<()> {
        let result = self.write(vec![(owned_segments(path), Some(value))]);
        tracing::trace!(path = %path, ok = result.is_ok(), "memory set");
        future::ready(result).boxed()
    }

    fn update(&self, path: &str, values: Map<String, Value>) -> DbFuture<()> {
        let changes = values
            .into_iter()
            .map(|(child, value)| (owned_segments(&path::child(path, &child)), Some(value)))
            .collect();
        future::ready(self.write(changes)).boxed()
    }

    fn remove(&self, path: &str) -> DbFuture<()> {
        future::ready(self.write(vec![(owned_segments(path), None)])).boxed()
    }

    fn push_key(&self, _path: &str) -> String {
        let millis = chrono::Utc::now().timestamp_millis().max(0);
        let sequence = self.inner.next_key.fetch_add(1, Ordering::SeqCst);
        format!("{millis:011x}{}{sequence:06x}", self.inner.node)
    }

    fn on(&self, path: &str, listener: Listener) -> ListenerId {
        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.insert(
            id,
            Registration {
                path: owned_segments(path),
                listener,
            },
        );
        id
    }

    fn off(&self, _path: &str, id: ListenerId) {
        self.inner.listeners.remove(&id);
    }
}

impl fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDatabase")
            .field("listeners", &self.inner.listeners.len())
            .field("offline", &self.inner.offline.load(Ordering::SeqCst))
            .finish()
    }
}

fn owned_segments(path: &str) -> Vec<String> {
    path::slashed(path).into_iter().map(String::from).collect()
}

fn read_at(tree: &Map<String, Value>, segments: &[String]) -> Option<Value> {
    if segments.is_empty() {
        return (!tree.is_empty()).then(|| Value::Object(tree.clone()));
    }
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
    path::get(tree, &segments).cloned()
}

/// One path is an ancestor of (or equal to) the other.
fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b).all(|(x, y)| x == y)
}
