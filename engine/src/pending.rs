//! Tracking of in-flight remote writes.
//!
//! Every write a record issues is registered here when it is issued and
//! removes itself, by id, when it settles. Callers await convergence with
//! [`PendingWrites::settle`] or inspect the in-flight set with
//! [`PendingWrites::snapshot`].

use crate::Result;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Identifies one tracked write.
pub type WriteId = u64;

/// A write that has been issued but has not settled yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrite {
    pub id: WriteId,
    /// Remote path being written
    pub path: String,
}

type Completion = Shared<BoxFuture<'static, Result<()>>>;

struct Entry {
    write: PendingWrite,
    completion: Completion,
}

/// Ordered set of in-flight writes.
#[derive(Clone, Default)]
pub struct PendingWrites {
    entries: Arc<Mutex<Vec<Entry>>>,
    next_id: Arc<AtomicU64>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `write` and start it.
    ///
    /// The write runs on the current Tokio runtime when there is one;
    /// otherwise it is driven by [`settle`](Self::settle).
    pub fn track<F>(&self, path: impl Into<String>, write: F) -> PendingWrite
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let pending = PendingWrite {
            id,
            path: path.into(),
        };

        let entries: Weak<Mutex<Vec<Entry>>> = Arc::downgrade(&self.entries);
        let path = pending.path.clone();
        let completion = async move {
            let result = write.await;
            if let Some(entries) = entries.upgrade() {
                entries.lock().retain(|entry| entry.write.id != id);
            }
            match &result {
                Ok(()) => tracing::debug!(write_id = id, path = %path, "write settled"),
                Err(err) => tracing::warn!(write_id = id, path = %path, error = %err, "write failed"),
            }
            result
        }
        .boxed()
        .shared();

        self.entries.lock().push(Entry {
            write: pending.clone(),
            completion: completion.clone(),
        });

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(completion);
        }

        pending
    }

    /// Resolve once every write tracked at call time has settled.
    ///
    /// Returns the first failure among those writes, if any.
    pub fn settle(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let completions: Vec<Completion> = self
            .entries
            .lock()
            .iter()
            .map(|entry| entry.completion.clone())
            .collect();

        async move {
            future::join_all(completions)
                .await
                .into_iter()
                .collect::<Result<Vec<()>>>()
                .map(|_| ())
        }
    }

    /// A copy of the in-flight set, in issue order.
    pub fn snapshot(&self) -> Vec<PendingWrite> {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.write.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for PendingWrites {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWrites")
            .field("in_flight", &self.snapshot())
            .finish()
    }
}
