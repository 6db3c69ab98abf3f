//! Two-way sync between records and the remote store.

mod common;

use common::{eventually, players};
use firesync_engine::{Database, Error, RemoteError, SyncOptions, SyncUpdate};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn set_is_tracked_until_written() {
    let (_odm, db, player) = players();
    let jorge = player.create(json!({"name": "Jorge"})).await.unwrap();
    let id = jorge.id().unwrap();

    jorge.set("name", "X").unwrap();
    let pending = jorge.pending_writes();
    assert!(!pending.is_empty());
    assert_eq!(pending[0].path, format!("Players/{id}/name"));

    jorge.pending_setters().await.unwrap();
    assert!(jorge.pending_writes().is_empty());
    assert_eq!(db.value()["Players"][&id]["name"], json!("X"));
}

#[tokio::test]
async fn create_writes_and_enables_sync() {
    let (_odm, db, player) = players();
    let jorge = player.create(json!({"name": "Jorge", "age": 20})).await.unwrap();
    let id = jorge.id().unwrap();

    assert_eq!(jorge.sync_options(), SyncOptions { from_db: true, to_db: true });
    assert_eq!(jorge.subscription_count(), 1);
    assert_eq!(db.listener_count(&player.record_path(&id)), 1);
    assert_eq!(
        db.value()["Players"][&id],
        json!({"name": "Jorge", "age": 20, "online": false, "class": "mage", "stats": {"level": 1}})
    );
}

#[tokio::test]
async fn nested_writes_target_the_nested_path() {
    let (_odm, db, player) = players();
    let jorge = player.create(json!({"name": "Jorge"})).await.unwrap();
    let id = jorge.id().unwrap();

    jorge.set("stats.level", 7).unwrap();
    jorge.set("friends.ann", "Ann").unwrap();
    let paths: Vec<String> = jorge.pending_writes().into_iter().map(|w| w.path).collect();
    assert_eq!(
        paths,
        vec![format!("Players/{id}/stats/level"), format!("Players/{id}/friends/ann")]
    );

    jorge.pending_setters().await.unwrap();
    assert_eq!(db.value()["Players"][&id]["stats"]["level"], json!(7));
    assert_eq!(db.value()["Players"][&id]["friends"], json!({"ann": "Ann"}));

    jorge.remove("friends.ann").unwrap();
    jorge.remove("stats.level").unwrap();
    jorge.pending_setters().await.unwrap();
    assert!(db.value()["Players"][&id].get("friends").is_none());
    assert_eq!(db.value()["Players"][&id]["stats"]["level"], json!(1));
}

#[tokio::test]
async fn remote_changes_are_applied() {
    let (_odm, db, player) = players();
    let jorge = player.create(json!({"name": "Jorge"})).await.unwrap();
    let path = player.record_path(&jorge.id().unwrap());

    db.set(&format!("{path}/name"), json!("Remote")).await.unwrap();
    assert_eq!(jorge.get("name"), Some(json!("Remote")));

    db.update(&path, json!({"age": 33}).as_object().unwrap().clone())
        .await
        .unwrap();
    assert_eq!(jorge.get("age"), Some(json!(33)));
    assert_eq!(jorge.get("name"), Some(json!("Remote")));
}

#[tokio::test]
async fn invalid_remote_snapshots_are_ignored() {
    let (_odm, db, player) = players();
    let jorge = player.create(json!({"name": "Jorge"})).await.unwrap();
    let path = player.record_path(&jorge.id().unwrap());

    db.set(&format!("{path}/age"), json!("old")).await.unwrap();
    assert_eq!(jorge.get("age"), None);

    db.remove(&path).await.unwrap();
    assert_eq!(jorge.get("name"), Some(json!("Jorge")));
}

#[tokio::test]
async fn sync_opts_is_idempotent() {
    let (_odm, db, player) = players();
    let jorge = player.create(json!({"name": "Jorge"})).await.unwrap();
    let path = player.record_path(&jorge.id().unwrap());

    for _ in 0..3 {
        jorge.sync_opts(Some(SyncUpdate::both(true))).unwrap();
        jorge.sync_opts(None).unwrap();
    }
    assert_eq!(jorge.subscription_count(), 1);
    assert_eq!(db.listener_count(&path), 1);
}

#[tokio::test]
async fn disabling_from_db_unsubscribes() {
    let (_odm, db, player) = players();
    let jorge = player.create(json!({"name": "Jorge"})).await.unwrap();
    let path = player.record_path(&jorge.id().unwrap());

    let options = jorge.sync_opts(Some(SyncUpdate::from_db(false))).unwrap();
    assert_eq!(options, SyncOptions { from_db: false, to_db: true });
    assert_eq!(jorge.subscription_count(), 0);
    assert_eq!(db.listener_count(&path), 0);

    db.set(&format!("{path}/name"), json!("Remote")).await.unwrap();
    assert_eq!(jorge.get("name"), Some(json!("Jorge")));

    jorge.sync_opts(Some(SyncUpdate::from_db(true))).unwrap();
    assert_eq!(db.listener_count(&path), 1);
}

#[tokio::test]
async fn to_db_off_keeps_writes_local() {
    let (_odm, db, player) = players();
    let jorge = player.create(json!({"name": "Jorge"})).await.unwrap();
    let id = jorge.id().unwrap();

    jorge.sync_opts(Some(SyncUpdate::to_db(false))).unwrap();
    jorge.set("name", "Local").unwrap();
    assert!(jorge.pending_writes().is_empty());
    assert_eq!(db.value()["Players"][&id]["name"], json!("Jorge"));
    assert_eq!(jorge.get("name"), Some(json!("Local")));
}

#[tokio::test]
async fn to_db_assigns_an_id_on_first_write() {
    let (_odm, db, player) = players();
    let jorge = player.new_record(json!({"name": "Jorge"})).unwrap();

    jorge.sync_opts(Some(SyncUpdate::to_db(true))).unwrap();
    jorge.set("age", 1).unwrap();
    let id = jorge.try_id().expect("write assigns an id");
    let pending = jorge.pending_writes();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].path, format!("Players/{id}/age"));

    jorge.pending_setters().await.unwrap();
    assert_eq!(db.value()["Players"][&id], json!({"age": 1}));

    jorge.set("age", 2).unwrap();
    jorge.pending_setters().await.unwrap();
    assert_eq!(jorge.id().unwrap(), id);
    assert_eq!(db.value()["Players"][&id], json!({"age": 2}));
}

#[tokio::test]
async fn from_db_subscribes_once_an_id_is_assigned() {
    let (_odm, db, player) = players();
    let jorge = player.new_record(json!({"name": "Jorge"})).unwrap();

    jorge.sync_opts(Some(SyncUpdate::from_db(true))).unwrap();
    assert_eq!(jorge.subscription_count(), 0);

    let id = jorge.id().unwrap();
    let path = player.record_path(&id);
    assert_eq!(jorge.subscription_count(), 1);
    assert_eq!(db.listener_count(&path), 1);

    db.set(&path, json!({"name": "Remote"})).await.unwrap();
    assert_eq!(jorge.get("name"), Some(json!("Remote")));

    jorge.id().unwrap();
    assert_eq!(db.listener_count(&path), 1);
}

#[tokio::test]
async fn own_writes_do_not_echo() {
    let (_odm, db, player) = players();
    let jorge = player.create(json!({"name": "Jorge"})).await.unwrap();
    let path = player.record_path(&jorge.id().unwrap());

    let notifications = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&notifications);
    let _watch = player
        .record_reference(&jorge.id().unwrap())
        .unwrap()
        .on(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    jorge.set("age", 5).unwrap();
    jorge.pending_setters().await.unwrap();
    tokio::task::yield_now().await;

    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert!(jorge.pending_writes().is_empty());
    assert_eq!(jorge.get("age"), Some(json!(5)));
    assert_eq!(db.listener_count(&path), 2);
}

#[tokio::test]
async fn dropping_the_record_cancels_its_subscription() {
    let (_odm, db, player) = players();
    let jorge = player.create(json!({"name": "Jorge"})).await.unwrap();
    let path = player.record_path(&jorge.id().unwrap());
    assert_eq!(db.listener_count(&path), 1);

    let alias = jorge.clone();
    drop(jorge);
    assert_eq!(db.listener_count(&path), 1);

    drop(alias);
    assert_eq!(db.listener_count(&path), 0);
}

#[tokio::test]
async fn failed_writes_surface_through_pending_setters() {
    let (_odm, db, player) = players();
    let jorge = player.create(json!({"name": "Jorge"})).await.unwrap();

    db.set_offline(true);
    jorge.set("name", "Offline").unwrap();
    assert_eq!(jorge.get("name"), Some(json!("Offline")));

    let err = jorge.pending_setters().await.unwrap_err();
    assert!(matches!(err, Error::Remote(RemoteError::Unavailable(_))));
    eventually(|| jorge.pending_writes().is_empty()).await;

    db.set_offline(false);
    jorge.set("name", "Online").unwrap();
    jorge.pending_setters().await.unwrap();
}

#[tokio::test]
async fn writes_without_a_connection_fail_after_the_local_change() {
    let (odm, _db, player) = players();
    let jorge = player.create(json!({"name": "Jorge"})).await.unwrap();

    odm.disconnect();
    assert!(matches!(jorge.set("name", "Alone"), Err(Error::NotConnected)));
    assert_eq!(jorge.get("name"), Some(json!("Alone")));
}

#[test]
fn writes_settle_without_a_runtime() {
    let (_odm, db, player) = players();
    let jorge = player.new_record(json!({"name": "Jorge"})).unwrap();
    let id = jorge.id().unwrap();
    jorge.sync_opts(Some(SyncUpdate::to_db(true))).unwrap();

    jorge.set("name", "Blocking").unwrap();
    assert_eq!(jorge.pending_writes().len(), 1);

    futures::executor::block_on(jorge.pending_setters()).unwrap();
    assert!(jorge.pending_writes().is_empty());
    assert_eq!(db.value()["Players"][&id], json!({"name": "Blocking"}));
}
