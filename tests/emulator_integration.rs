//! Integration tests against the Firestore emulator
//!
//! These tests require:
//! 1. A running emulator: `gcloud emulators firestore start --host-port=localhost:8080`
//! 2. `FIRESTORE_EMULATOR_HOST` and `FIRESTORE_PROJECT_ID` set (a `.env` file works)
//! 3. Run with: cargo test --features integration-tests --test emulator_integration

#![cfg(feature = "integration-tests")]

use std::sync::Once;

use firestore_adapters::adapters::{
    transaction_fn, ClientAdapter, DocumentIterator, FirestoreClient, Query,
};
use firestore_adapters::firestore::value::map_value;
use firestore_adapters::firestore::{
    Client, Direction, Operator, SetOptions, Settings, TransactionOptions, Update,
};
use firestore_adapters::FirestoreError;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

async fn connect() -> ClientAdapter {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::from_env().expect("FIRESTORE_PROJECT_ID must be set");
    let client = Client::connect(settings)
        .await
        .expect("Failed to connect to the emulator");
    ClientAdapter::new(client)
}

/// Unique collection name for this test run
fn test_collection(test_name: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    format!("test_{}_{}_{}", test_name, timestamp, rand::random::<u32>())
}

async fn cleanup_collection(db: &dyn FirestoreClient, path: &str) {
    let mut docs = db.collection(path).documents();
    while let Ok(Some(doc)) = docs.next().await {
        let _ = db.doc(doc.reference().path()).delete(None).await;
    }
    docs.stop();
}

#[tokio::test]
async fn test_set_then_get() {
    let db = connect().await;
    let collection = test_collection("set_get");
    let doc = db.collection(&collection).doc("u1");

    doc.set(map_value([("name", "Ada".into())]), SetOptions::Overwrite)
        .await
        .expect("set failed");
    let snapshot = doc.get().await.expect("get failed");

    assert!(snapshot.exists());
    assert_eq!(snapshot.data_at("name").unwrap().as_str(), Some("Ada"));
    cleanup_collection(&db, &collection).await;
}

#[tokio::test]
async fn test_missing_document_does_not_exist() {
    let db = connect().await;
    let collection = test_collection("missing");

    let snapshot = db.collection(&collection).doc("nobody").get().await.unwrap();
    assert!(!snapshot.exists());
    assert!(matches!(snapshot.data_at("name"), Err(FirestoreError::NotFound(_))));
}

#[tokio::test]
async fn test_query_and_count() {
    let db = connect().await;
    let collection = test_collection("query");
    let users = db.collection(&collection);
    for (id, age) in [("a", 30i64), ("b", 20), ("c", 40)] {
        users
            .doc(id)
            .create(map_value([("age", age.into())]))
            .await
            .unwrap();
    }

    let over_25 = users
        .where_("age", Operator::GreaterThan, 25i64.into())
        .order_by("age", Direction::Descending);
    let docs = over_25.documents().get_all().await.unwrap();
    let ids: Vec<String> = docs.iter().map(|d| d.reference().id().to_string()).collect();
    assert_eq!(ids, vec!["c", "a"]);

    let result = over_25
        .new_aggregation_query()
        .with_count("n")
        .get()
        .await
        .unwrap();
    assert_eq!(result.count("n").unwrap(), 2);

    cleanup_collection(&db, &collection).await;
}

#[tokio::test]
async fn test_transaction_increment() {
    let db = connect().await;
    let collection = test_collection("txn");
    let counter = db.collection(&collection).doc("counter");
    counter
        .set(map_value([("n", 1i64.into())]), SetOptions::Overwrite)
        .await
        .unwrap();
    let reference = counter.reference();

    db.run_transaction(
        transaction_fn(move |txn| {
            let reference = reference.clone();
            async move {
                let n = txn.get(&reference).await?.data_at("n")?.as_i64().unwrap_or(0);
                txn.update(&reference, vec![Update::set("n", n + 1)], None)
            }
        }),
        TransactionOptions::default(),
    )
    .await
    .unwrap();

    let snapshot = counter.get().await.unwrap();
    assert_eq!(snapshot.data_at("n").unwrap().as_i64(), Some(2));
    cleanup_collection(&db, &collection).await;
}

#[tokio::test]
async fn test_close_rejects_later_calls() {
    let db = connect().await;
    db.close().unwrap();

    let result = db.doc("users/u1").get().await;
    assert!(matches!(result, Err(FirestoreError::ClientClosed)));
}
