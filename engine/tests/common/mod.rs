//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use firesync_engine::{schema, schema::indexed, MemoryDatabase, Model, Odm, Schema};
use std::sync::Once;
use std::time::Duration;

static TRACING: Once = Once::new();

/// Log to the test writer; filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "firesync_engine=debug".into()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn player_schema() -> Schema {
    Schema::builder()
        .field("name", schema::string())
        .field("age", schema::number().optional())
        .field("online", schema::boolean().with_default(false))
        .field("class", schema::enumeration(["mage", "rogue", "knight"]).with_default("mage"))
        .field("friends", indexed::string())
        .nested(
            "stats",
            Schema::builder()
                .field("level", schema::number().with_default(1))
                .field("title", schema::string().optional()),
        )
        .build()
        .unwrap()
}

/// A connected session with a `Player` model.
pub fn players() -> (Odm, MemoryDatabase, Model) {
    init_tracing();
    let odm = Odm::default();
    let db = MemoryDatabase::new();
    odm.connect(db.clone());
    let player = odm.define("Player", player_schema()).unwrap();
    (odm, db, player)
}

/// Poll `condition` until it holds, yielding to spawned writes in between.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
