//! # Firesync Engine
//!
//! An object-document mapper for realtime key-value stores.
//!
//! Records are documents validated against a declared schema. Every write to a
//! record goes through one funnel that validates the whole record, reverts on
//! failure and, when enabled, mirrors the change to the remote store. Records
//! can also follow their remote path and take on changes made elsewhere.
//!
//! ## Design Principles
//!
//! - **Validated**: A record never holds a value its schema rejects
//! - **Pluggable store**: Remote access goes through the [`Database`] trait;
//!   [`MemoryDatabase`] implements it in process
//! - **No hidden globals**: Connection, configuration and the model registry
//!   live in an [`Odm`] value
//!
//! ## Core Concepts
//!
//! ### Schemas
//!
//! A [`Schema`] maps field names to typed descriptors (string, number,
//! boolean, enumeration, or an indexed map of one of those) or to nested
//! schemas. Descriptors may be required, optional or defaulted.
//!
//! ### Models and records
//!
//! [`Odm::define`] registers a [`Model`] whose records live under the plural
//! of its name. A [`Record`] is read and written by dotted path:
//! [`Record::get`], [`Record::set`] and [`Record::remove`].
//!
//! ### Sync
//!
//! [`Record::sync_opts`] turns remote-to-local (`from_db`) and local-to-remote
//! (`to_db`) sync on and off. Remote writes are tracked and can be awaited
//! with [`Record::pending_setters`].
//!
//! ### Relations
//!
//! [`Model::has_one`] and [`Model::has_many`] declare relations resolved with
//! [`Record::relation`].
//!
//! ## Quick Start
//!
//! ```rust
//! use firesync_engine::{schema, MemoryDatabase, Odm, Schema};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> firesync_engine::Result<()> {
//! // 1. Connect a session
//! let odm = Odm::default();
//! let db = MemoryDatabase::new();
//! odm.connect(db.clone());
//!
//! // 2. Define a model
//! let schema = Schema::builder()
//!     .field("name", schema::string())
//!     .field("level", schema::number().with_default(1))
//!     .build()?;
//! let player = odm.define("Player", schema)?;
//!
//! // 3. Create a synced record and change it
//! let jorge = player.create(json!({"name": "Jorge"})).await?;
//! jorge.set("level", 2)?;
//! jorge.pending_setters().await?;
//!
//! // 4. The change reached the store
//! let id = jorge.id()?;
//! assert_eq!(db.value()["Players"][&id]["level"], json!(2));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod memory;
pub mod model;
pub mod naming;
pub mod odm;
pub mod path;
pub mod pending;
pub mod record;
pub mod relation;
pub mod schema;
pub mod sync;
pub mod validate;

// Re-export main types at crate root
pub use config::{Config, ConfigError};
pub use database::{Database, DbFuture, Listener, ListenerId, Reference, Snapshot};
pub use error::{Error, RemoteError, Result, ValidationError};
pub use memory::MemoryDatabase;
pub use model::{Cache, Model};
pub use odm::Odm;
pub use pending::{PendingWrite, PendingWrites, WriteId};
pub use record::Record;
pub use relation::{Cardinality, Related, Relation, RelationSource};
pub use schema::{FieldDescriptor, FieldKind, Schema, SchemaBuilder, SchemaNode};
pub use sync::{Subscription, SyncOptions, SyncUpdate};
