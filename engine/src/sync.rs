//! Per-record sync state.
//!
//! A record syncs in two independent directions:
//! - `to_db`: local writes are pushed to the remote store,
//! - `from_db`: remote changes are pulled into the record.
//!
//! The from-remote direction is backed by a [`Subscription`], an RAII handle
//! around a database listener. Cancelling it is idempotent and dropping it
//! cancels it.

use crate::database::{Database, Listener, ListenerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The sync flags of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    /// Apply remote changes to the record
    pub from_db: bool,
    /// Push local changes to the remote store
    pub to_db: bool,
}

/// A partial update of [`SyncOptions`]; `None` leaves a flag unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_db: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_db: Option<bool>,
}

impl SyncUpdate {
    pub fn from_db(enabled: bool) -> Self {
        Self {
            from_db: Some(enabled),
            to_db: None,
        }
    }

    pub fn to_db(enabled: bool) -> Self {
        Self {
            from_db: None,
            to_db: Some(enabled),
        }
    }

    /// Set both directions at once.
    pub fn both(enabled: bool) -> Self {
        Self {
            from_db: Some(enabled),
            to_db: Some(enabled),
        }
    }
}

impl SyncOptions {
    pub fn apply(&mut self, update: SyncUpdate) {
        if let Some(from_db) = update.from_db {
            self.from_db = from_db;
        }
        if let Some(to_db) = update.to_db {
            self.to_db = to_db;
        }
    }
}

/// A registered remote listener.
pub struct Subscription {
    db: Arc<dyn Database>,
    path: String,
    id: ListenerId,
    active: AtomicBool,
}

impl Subscription {
    /// Register `listener` at `path`.
    pub fn new(db: Arc<dyn Database>, path: impl Into<String>, listener: Listener) -> Self {
        let path = path.into();
        let id = db.on(&path, listener);
        tracing::info!(path = %path, listener = id, "subscribed");
        Self {
            db,
            path,
            id,
            active: AtomicBool::new(true),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Unregister the listener. Later calls do nothing.
    pub fn cancel(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.db.off(&self.path, self.id);
            tracing::info!(path = %self.path, listener = self.id, "unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Sync flags plus the subscriptions backing `from_db`.
#[derive(Debug, Default)]
pub(crate) struct SyncController {
    options: SyncOptions,
    subscriptions: Vec<Subscription>,
}

impl SyncController {
    pub(crate) fn options(&self) -> SyncOptions {
        self.options
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Apply `update` and return the subscriptions that must be cancelled.
    ///
    /// Cancellation is left to the caller so it can happen outside any lock.
    pub(crate) fn update(&mut self, update: Option<SyncUpdate>) -> Vec<Subscription> {
        if let Some(update) = update {
            self.options.apply(update);
        }
        if self.options.from_db {
            Vec::new()
        } else {
            self.subscriptions.drain(..).collect()
        }
    }

    /// Whether a subscription should be opened now.
    pub(crate) fn wants_subscription(&self, has_id: bool) -> bool {
        self.options.from_db && self.subscriptions.is_empty() && has_id
    }

    /// Keep `subscription` if it is still wanted, otherwise hand it back.
    pub(crate) fn attach(&mut self, subscription: Subscription) -> Option<Subscription> {
        if self.options.from_db && self.subscriptions.is_empty() {
            self.subscriptions.push(subscription);
            None
        } else {
            Some(subscription)
        }
    }
}
