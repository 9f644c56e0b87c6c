//! Document manager behaviour under dropped connections, faults and cancellation.
//!
//! Runs against the in-memory double from `helpers.rs`; the live-server test at the
//! bottom is ignored unless a MongoDB instance is available.

mod helpers;

use std::time::{Duration, Instant};

use futures::future::join_all;
use mongodb::bson::doc;
use tokio_util::sync::CancellationToken;

use crawl_store::{
    is_transient_document_error, DocumentManager, RetryPolicy, StoreError, StoreKind,
};
use helpers::{Fault, FakeDocumentStore};

fn manager(stop: &CancellationToken) -> (DocumentManager<FakeDocumentStore>, FakeDocumentStore) {
    let store = FakeDocumentStore::new();
    let manager = DocumentManager::with_connector(stop.clone(), store.clone())
        .with_retry_policy(RetryPolicy::immediate());
    (manager, store)
}

fn lifecycle(events: Vec<String>) -> Vec<String> {
    events
        .into_iter()
        .filter(|e| e.starts_with("connect") || e.starts_with("disconnect"))
        .collect()
}

#[tokio::test]
async fn test_dropped_connection_then_stop_signal() {
    let stop = CancellationToken::new();
    let (manager, store) = manager(&stop);
    manager.init().await.unwrap();

    manager
        .insert_one("pages", doc! { "url": "https://example.com", "status": 200 })
        .await
        .unwrap();

    store.drop_connection();
    let found = manager
        .find_one("pages", doc! { "url": "https://example.com" })
        .await
        .unwrap()
        .expect("document should survive the reconnect");
    assert_eq!(found.get_i32("status").unwrap(), 200);
    assert_eq!(store.connects(), 2, "exactly one rebuild");

    stop.cancel();
    let calls = store.calls();
    let err = manager
        .delete_one("pages", doc! { "url": "https://example.com" })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Cancelled {
            store: StoreKind::Document,
            operation: "delete_one"
        }
    ));
    assert_eq!(store.calls(), calls, "no call after the stop signal");
    assert_eq!(store.documents("pages").len(), 1);
}

#[tokio::test]
async fn test_rebuild_closes_old_client_before_connecting() {
    let stop = CancellationToken::new();
    let (manager, store) = manager(&stop);
    manager.init().await.unwrap();

    store.drop_connection();
    manager.find_one("pages", doc! {}).await.unwrap();
    manager.reconnect().await.unwrap();

    assert_eq!(
        lifecycle(store.events()),
        vec!["connect 1", "disconnect 1", "connect 2", "disconnect 2", "connect 3"]
    );
}

#[tokio::test]
async fn test_stop_signal_before_call_touches_nothing() {
    let stop = CancellationToken::new();
    let (manager, store) = manager(&stop);
    manager.init().await.unwrap();
    stop.cancel();

    let err = manager
        .insert_one("pages", doc! { "url": "https://example.com" })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(store.calls(), 0);
    assert_eq!(store.connects(), 1);
    assert!(store.documents("pages").is_empty());
}

#[tokio::test]
async fn test_single_transient_failure_is_invisible() {
    let stop = CancellationToken::new();
    let (manager, store) = manager(&stop);
    manager.init().await.unwrap();
    store.inject(&[Fault::Transient]);

    let ack = manager
        .update_one(
            "pages",
            doc! { "url": "https://example.com" },
            doc! { "$set": { "status": 301 } },
            true,
        )
        .await
        .unwrap();

    assert!(ack.upserted_id.is_some());
    assert_eq!(store.connects(), 2);
    assert_eq!(store.calls(), 2);
}

#[tokio::test]
async fn test_second_transient_failure_is_returned() {
    let stop = CancellationToken::new();
    let (manager, store) = manager(&stop);
    manager.init().await.unwrap();
    store.inject(&[Fault::Transient, Fault::Transient]);

    let err = manager.find_one("pages", doc! {}).await.unwrap_err();

    assert!(is_transient_document_error(&err));
    assert_eq!(store.connects(), 2, "one rebuild, never two");
    assert_eq!(store.calls(), 2);
}

#[tokio::test]
async fn test_application_error_is_not_retried() {
    let stop = CancellationToken::new();
    let (manager, store) = manager(&stop);
    manager.init().await.unwrap();
    store.inject(&[Fault::Permanent]);

    let err = manager
        .insert_one("pages", doc! { "url": "https://example.com" })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Document(_)));
    assert!(!is_transient_document_error(&err));
    assert_eq!(store.connects(), 1);
    assert_eq!(store.calls(), 1);
}

#[tokio::test]
async fn test_upsert_then_update_and_delete() {
    let stop = CancellationToken::new();
    let (manager, store) = manager(&stop);
    manager.init().await.unwrap();

    let filter = doc! { "url": "https://example.com" };
    let first = manager
        .update_one("pages", filter.clone(), doc! { "$set": { "status": 200 } }, true)
        .await
        .unwrap();
    assert_eq!(first.matched_count, 0);
    assert!(first.upserted_id.is_some());

    let second = manager
        .update_one("pages", filter.clone(), doc! { "$set": { "status": 404 } }, false)
        .await
        .unwrap();
    assert_eq!((second.matched_count, second.modified_count), (1, 1));
    assert!(second.upserted_id.is_none());

    let missing = manager
        .update_one(
            "pages",
            doc! { "url": "https://other.example" },
            doc! { "$set": { "status": 500 } },
            false,
        )
        .await
        .unwrap();
    assert_eq!(missing.matched_count, 0);
    assert!(missing.upserted_id.is_none());

    assert_eq!(manager.delete_one("pages", filter.clone()).await.unwrap().deleted_count, 1);
    assert_eq!(manager.delete_one("pages", filter).await.unwrap().deleted_count, 0);
    assert!(store.documents("pages").is_empty());
}

#[tokio::test]
async fn test_failed_rebuild_surfaces_then_recovers() {
    let stop = CancellationToken::new();
    let (manager, store) = manager(&stop);
    manager.init().await.unwrap();

    store.drop_connection();
    store.refuse_connects(1);
    let err = manager.find_one("pages", doc! {}).await.unwrap_err();
    assert!(err.is_reconnect_failure());
    assert!(!manager.is_connected().await);

    // The next operation rebuilds from the broken state
    manager.find_one("pages", doc! {}).await.unwrap();
    assert!(manager.is_connected().await);
    assert_eq!(
        lifecycle(store.events()),
        vec!["connect 1", "disconnect 1", "connect refused", "connect 2"]
    );
}

#[tokio::test]
async fn test_stop_signal_during_reconnect_delay() {
    let stop = CancellationToken::new();
    let store = FakeDocumentStore::new();
    // Default pacing waits before rebuilding
    let manager = DocumentManager::with_connector(stop.clone(), store.clone());
    manager.init().await.unwrap();
    store.drop_connection();

    let canceller = {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stop.cancel();
        })
    };

    let started = Instant::now();
    let err = manager.find_one("pages", doc! {}).await.unwrap_err();
    canceller.await.unwrap();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_millis(900));
    assert_eq!(store.connects(), 1, "no rebuild once stopped");
}

#[tokio::test]
async fn test_concurrent_failures_share_one_rebuild() {
    let stop = CancellationToken::new();
    let (manager, store) = manager(&stop);
    manager.init().await.unwrap();
    manager
        .insert_one("pages", doc! { "url": "https://example.com" })
        .await
        .unwrap();

    store.drop_connection();
    let results = join_all(
        (0..8).map(|_| manager.find_one("pages", doc! { "url": "https://example.com" })),
    )
    .await;

    for result in results {
        assert!(result.unwrap().is_some());
    }
    // Every operation failed on the dropped handle before any rebuild ran
    assert_eq!(store.calls(), 1 + 8 + 8);
    assert_eq!(store.connects(), 2, "one rebuild shared by all eight");
    assert_eq!(
        lifecycle(store.events()),
        vec!["connect 1", "disconnect 1", "connect 2"]
    );
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let stop = CancellationToken::new();
    let (manager, store) = manager(&stop);

    manager.close().await;
    manager.init().await.unwrap();
    manager.close().await;
    manager.close().await;

    assert_eq!(lifecycle(store.events()), vec!["connect 1", "disconnect 1"]);
    assert!(!manager.is_connected().await);
}

#[tokio::test]
async fn test_operations_after_close_do_not_reconnect() {
    let stop = CancellationToken::new();
    let (manager, store) = manager(&stop);
    manager.init().await.unwrap();
    manager.close().await;

    let err = manager.find_one("pages", doc! {}).await.unwrap_err();
    assert!(matches!(err, StoreError::NotConnected { .. }));
    assert_eq!(store.connects(), 1);
}

#[tokio::test]
#[ignore] // Requires a MongoDB server at MONGODB_URI
async fn test_live_server_round_trip() {
    let uri = std::env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
    let manager = DocumentManager::new(CancellationToken::new(), uri, "crawl_store_test");
    manager.init().await.unwrap();

    let url = format!("https://example.com/{}", std::process::id());
    manager
        .update_one("pages", doc! { "url": url.as_str() }, doc! { "$set": { "status": 200 } }, true)
        .await
        .unwrap();
    let found = manager.find_one("pages", doc! { "url": url.as_str() }).await.unwrap();
    assert_eq!(found.unwrap().get_i32("status").unwrap(), 200);

    manager.reconnect().await.unwrap();
    assert_eq!(
        manager.delete_one("pages", doc! { "url": url.as_str() }).await.unwrap().deleted_count,
        1
    );
    manager.close().await;
}
