//! End-to-end tests for watch streams.
//!
//! A list carrying `X-Watch` is upgraded onto a `LocalChannel`; the test
//! plays the client through the matching `WatchClient`.

use std::time::Duration;

use http::StatusCode;
use inventory_rs::config::{Config, WatchConfig};
use inventory_rs::watch::CloseReason;
use inventory_rs::{
    Entity, EntityId, Error, Inventory, LocalExchange, MemoryStore, Prepared, Provider, Route,
    WatchClient, WatchHandle, WatchState,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn clusters() -> Route {
    Route::new("vsphere", "clusters", "cluster")
}

fn request() -> LocalExchange {
    LocalExchange::new(Prepared::Ready(Provider::new("uid-1", "vsphere")))
}

async fn start_watch(
    inventory: &Inventory<MemoryStore>,
    exchange: LocalExchange,
    options: &str,
) -> (WatchHandle, WatchClient) {
    let (exchange, client) = exchange.watch(options, 16);
    let reply = inventory.collection(clusters()).list(exchange).await;
    assert_eq!(reply.status(), StatusCode::SWITCHING_PROTOCOLS);
    (reply.into_watch().unwrap(), client)
}

async fn next(client: &mut WatchClient) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(5), client.recv())
        .await
        .expect("watch message timed out")
        .expect("watch stream ended")
}

// ============================================================================
// 1. Ordering
// ============================================================================

#[tokio::test]
async fn test_create_update_delete_in_order() {
    let inventory = Inventory::open_memory();
    let (handle, mut client) = start_watch(&inventory, request(), "").await;
    let db = inventory.store();

    db.put(Entity::new("clusters", "1", "prod")).unwrap();
    db.put(Entity::new("clusters", "1", "prod").with_field("drsEnabled", true)).unwrap();
    db.delete("clusters", &EntityId::from("1")).unwrap();

    let created = next(&mut client).await;
    let updated = next(&mut client).await;
    let deleted = next(&mut client).await;

    assert_eq!(created["action"], json!("created"));
    assert_eq!(updated["action"], json!("updated"));
    assert_eq!(updated["resource"]["drsEnabled"], json!(true));
    assert_eq!(deleted["action"], json!("deleted"));
    assert!(created["sequence"].as_u64() < updated["sequence"].as_u64());
    assert!(updated["sequence"].as_u64() < deleted["sequence"].as_u64());
    assert_eq!(
        deleted["resource"]["selfLink"],
        json!("/providers/vsphere/uid-1/clusters/1")
    );

    handle.close();
    let summary = handle.join().await.unwrap();
    assert_eq!(summary.delivered, 3);
}

#[tokio::test]
async fn test_other_collections_are_not_delivered() {
    let inventory = Inventory::open_memory();
    let (handle, mut client) = start_watch(&inventory, request(), "").await;

    inventory.store().put(Entity::new("hosts", "h1", "esx-1")).unwrap();
    inventory.store().put(Entity::new("clusters", "1", "prod")).unwrap();

    assert_eq!(next(&mut client).await["resource"]["id"], json!("1"));
    handle.close();
    handle.join().await.unwrap();
}

// ============================================================================
// 2. Close semantics
// ============================================================================

#[tokio::test]
async fn test_close_releases_subscription() {
    let inventory = Inventory::open_memory();
    let (mut handle, mut client) = start_watch(&inventory, request(), "").await;
    assert_eq!(handle.state(), WatchState::Streaming);
    assert_eq!(inventory.store().subscriber_count(), 1);

    handle.close();
    handle.closed().await;
    assert_eq!(handle.state(), WatchState::Closed);
    assert_eq!(inventory.store().subscriber_count(), 0);

    inventory.store().put(Entity::new("clusters", "1", "prod")).unwrap();
    assert_eq!(client.recv().await, None);

    // Closing again is a no-op.
    handle.close();
    let summary = handle.join().await.unwrap();
    assert_eq!(summary.reason, CloseReason::Cancelled);
    assert_eq!(summary.delivered, 0);
}

#[tokio::test]
async fn test_client_disconnect_releases_subscription() {
    let inventory = Inventory::open_memory();
    let (handle, mut client) = start_watch(&inventory, request(), "").await;

    client.unsubscribe();
    let summary = handle.join().await.unwrap();
    assert_eq!(summary.reason, CloseReason::Disconnected);
    assert_eq!(inventory.store().subscriber_count(), 0);
}

// ============================================================================
// 3. Event-time filtering
// ============================================================================

#[tokio::test]
async fn test_variant_change_drops_event() {
    let inventory = Inventory::open_memory();
    let db = inventory.store();
    db.put(Entity::new("clusters", "1", "prod")).unwrap();
    let (handle, mut client) = start_watch(&inventory, request(), "").await;

    // Turns synthetic: the store still reports it, the bridge must not.
    db.put(Entity::new("clusters", "1", "prod").with_variant("Template")).unwrap();
    db.put(Entity::new("clusters", "2", "test")).unwrap();

    let msg = next(&mut client).await;
    assert_eq!(msg["action"], json!("created"));
    assert_eq!(msg["resource"]["id"], json!("2"));

    handle.close();
    let summary = handle.join().await.unwrap();
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.delivered, 1);
}

#[tokio::test]
async fn test_watch_uses_name_leaf_only() {
    let inventory = Inventory::open_memory();
    let (handle, mut client) =
        start_watch(&inventory, request().with_query("name", "dc1/prod"), "").await;

    inventory.store().put(Entity::new("clusters", "1", "test")).unwrap();
    inventory.store().put(Entity::new("clusters", "2", "prod")).unwrap();

    assert_eq!(next(&mut client).await["resource"]["id"], json!("2"));
    handle.close();
    handle.join().await.unwrap();
}

// ============================================================================
// 4. Snapshot
// ============================================================================

#[tokio::test]
async fn test_snapshot_then_parity_then_live() {
    let inventory = Inventory::open_memory();
    let db = inventory.store();
    db.put(Entity::new("clusters", "1", "a")).unwrap();
    db.put(Entity::new("clusters", "2", "b")).unwrap();
    db.put(Entity::new("clusters", "3", "c").with_variant("Template")).unwrap();

    let (handle, mut client) = start_watch(&inventory, request(), "snapshot").await;
    db.put(Entity::new("clusters", "4", "d")).unwrap();

    let mut snapshot = vec![next(&mut client).await, next(&mut client).await];
    snapshot.sort_by_key(|m| m["resource"]["id"].as_str().unwrap().to_string());
    assert!(snapshot.iter().all(|m| m["action"] == json!("created")));
    assert_eq!(snapshot[0]["resource"]["id"], json!("1"));
    assert_eq!(snapshot[1]["resource"]["id"], json!("2"));

    assert_eq!(next(&mut client).await, json!({"action": "parity"}));

    let live = next(&mut client).await;
    assert_eq!(live["resource"]["id"], json!("4"));

    handle.close();
    assert_eq!(handle.join().await.unwrap().delivered, 4);
}

#[tokio::test]
async fn test_config_enables_snapshot_by_default() {
    let config = Config {
        watch: WatchConfig { snapshot: true, ..WatchConfig::default() },
        ..Config::default()
    };
    let inventory = Inventory::open_memory().with_config(config).unwrap();
    let (handle, mut client) = start_watch(&inventory, request(), "").await;

    assert_eq!(next(&mut client).await, json!({"action": "parity"}));
    handle.close();
    handle.join().await.unwrap();
}

// ============================================================================
// 5. Failures
// ============================================================================

#[tokio::test]
async fn test_upgrade_failure_reports_and_holds_nothing() {
    let inventory = Inventory::open_memory();
    let (exchange, client) = request().watch("", 4);
    drop(client);

    let reply = inventory.collection(clusters()).list(exchange).await;
    assert_eq!(reply.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(inventory.store().subscriber_count(), 0);
}

#[tokio::test]
async fn test_lagging_client_ends_with_error() {
    let config = Config {
        watch: WatchConfig { subscriber_buffer: 2, ..WatchConfig::default() },
        ..Config::default()
    };
    let inventory = Inventory::open_memory().with_config(config).unwrap();
    let (exchange, mut client) = request().watch("", 1);
    let reply = inventory.collection(clusters()).list(exchange).await;
    let handle = reply.into_watch().unwrap();

    // The client reads nothing while the store outruns both buffers.
    for i in 0..32 {
        inventory.store().put(Entity::new("clusters", format!("{i}").as_str(), "c")).unwrap();
        tokio::task::yield_now().await;
    }

    let mut received = 0;
    while client.recv().await.is_some() {
        received += 1;
    }
    assert!(received < 32);

    let err = handle.join().await.unwrap_err();
    assert!(matches!(err, Error::SubscriberLagged { .. }));
    assert_eq!(inventory.store().subscriber_count(), 0);
}

#[tokio::test]
async fn test_store_shutdown_ends_with_error() {
    let inventory = Inventory::open_memory();
    let (handle, mut client) = start_watch(&inventory, request(), "").await;

    inventory.store().shutdown();
    assert_eq!(client.recv().await, None);
    assert!(matches!(handle.join().await, Err(Error::StoreError(_))));
}
