//! Mockable adapters over the Firestore client
//!
//! Application code depends on the traits defined here instead of the
//! concrete types of [`crate::firestore`]. Each trait has exactly one
//! production adapter that holds one client handle and forwards every call to
//! it; tests substitute the fakes of [`crate::mock`].
//!
//! Whenever a forwarded call returns another client type that has a trait of
//! its own, the adapter returns the boxed adapter for it, so chains such as
//! `client.collection("users").doc("u1").collection("orders")` keep yielding
//! trait objects.
//!
//! Errors are returned exactly as the client layer produced them.
//!
//! # Example
//! ```no_run
//! use firestore_adapters::adapters::{ClientAdapter, FirestoreClient};
//! use firestore_adapters::firestore::value::map_value;
//! use firestore_adapters::firestore::{Client, SetOptions, Settings};
//!
//! async fn save(db: &dyn FirestoreClient) -> firestore_adapters::Result<bool> {
//!     let doc = db.collection("users").doc("u1");
//!     doc.set(map_value([("name", "Ada".into())]), SetOptions::Overwrite).await?;
//!     Ok(doc.get().await?.exists())
//! }
//!
//! # async fn example() -> firestore_adapters::Result<()> {
//! let client = Client::connect(Settings::from_env()?).await?;
//! save(&ClientAdapter::new(client)).await?;
//! # Ok(())
//! # }
//! ```

mod aggregation;
mod bulk_writer;
mod client;
mod collection;
mod document;
mod document_snapshot;
mod iterators;
mod query;
mod transaction;
mod write_batch;

pub use aggregation::{
    AggregationQuery, AggregationQueryAdapter, AggregationResult, AggregationResultAdapter,
};
pub use bulk_writer::{BulkWriter, BulkWriterAdapter};
pub use client::{transaction_fn, ClientAdapter, FirestoreClient, TransactionFn};
pub use collection::{CollectionRef, CollectionRefAdapter};
pub use document::{DocumentRef, DocumentRefAdapter};
pub use document_snapshot::{DocumentSnapshot, DocumentSnapshotAdapter, DocumentSnapshotExt};
pub use iterators::{
    CollectionIterator, CollectionIteratorAdapter, DocumentIterator, DocumentIteratorAdapter,
    DocumentSnapshotIterator, DocumentSnapshotIteratorAdapter, QuerySnapshotIterator,
    QuerySnapshotIteratorAdapter,
};
pub use query::{Query, QueryAdapter};
pub use transaction::{Transaction, TransactionAdapter};
pub use write_batch::{WriteBatch, WriteBatchAdapter};

// Every adapter implements its trait.
#[allow(dead_code)]
const _: fn() = || {
    fn client<T: FirestoreClient>() {}
    fn query<T: Query>() {}
    fn collection<T: CollectionRef>() {}
    fn document<T: DocumentRef>() {}
    fn transaction<T: Transaction>() {}
    fn write_batch<T: WriteBatch>() {}
    fn bulk_writer<T: BulkWriter>() {}
    fn snapshot<T: DocumentSnapshot>() {}
    fn document_iterator<T: DocumentIterator>() {}
    fn collection_iterator<T: CollectionIterator>() {}
    fn query_snapshot_iterator<T: QuerySnapshotIterator>() {}
    fn document_snapshot_iterator<T: DocumentSnapshotIterator>() {}
    fn aggregation_query<T: AggregationQuery>() {}
    fn aggregation_result<T: AggregationResult>() {}

    client::<ClientAdapter>();
    query::<QueryAdapter>();
    query::<CollectionRefAdapter>();
    collection::<CollectionRefAdapter>();
    document::<DocumentRefAdapter>();
    transaction::<TransactionAdapter>();
    write_batch::<WriteBatchAdapter>();
    bulk_writer::<BulkWriterAdapter>();
    snapshot::<DocumentSnapshotAdapter>();
    document_iterator::<DocumentIteratorAdapter>();
    collection_iterator::<CollectionIteratorAdapter>();
    query_snapshot_iterator::<QuerySnapshotIteratorAdapter>();
    document_snapshot_iterator::<DocumentSnapshotIteratorAdapter>();
    aggregation_query::<AggregationQueryAdapter>();
    aggregation_result::<AggregationResultAdapter>();
};
