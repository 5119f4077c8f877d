//! In-memory fakes for the adapter traits
//!
//! [`MockFirestoreClient`] is a complete in-memory database: references,
//! queries, transactions, batches and bulk writers obtained from it read and
//! write the same store, so application code written against
//! [`crate::adapters`] can be exercised without a server.
//!
//! The result fakes ([`MockDocumentSnapshot`] and the iterators) can also be
//! built from canned values to script a specific sequence of results.
//!
//! ```
//! use firestore_adapters::adapters::FirestoreClient;
//! use firestore_adapters::firestore::value::map_value;
//! use firestore_adapters::firestore::SetOptions;
//! use firestore_adapters::mock::MockFirestoreClient;
//!
//! # tokio_test::block_on(async {
//! let db = MockFirestoreClient::new();
//! let doc = db.collection("users").doc("u1");
//! doc.set(map_value([("name", "Ada".into())]), SetOptions::Overwrite).await.unwrap();
//! assert!(doc.get().await.unwrap().exists());
//! # });
//! ```

mod client;
mod references;
mod results;
mod store;
mod writes;

pub use client::MockFirestoreClient;
pub use references::{MockCollectionRef, MockDocumentRef, MockQuery};
pub use results::{
    MockAggregationQuery, MockAggregationResult, MockCollectionIterator, MockDocumentIterator,
    MockDocumentSnapshot, MockDocumentSnapshotIterator, MockQuerySnapshotIterator,
};
pub use writes::{MockBulkWriter, MockTransaction, MockWriteBatch};

// Every fake implements the trait it stands in for.
#[allow(dead_code)]
const _: fn() = || {
    use crate::adapters::*;

    fn client<T: FirestoreClient>() {}
    fn collection<T: CollectionRef>() {}
    fn document<T: DocumentRef>() {}
    fn query<T: Query>() {}
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

    client::<MockFirestoreClient>();
    collection::<MockCollectionRef>();
    document::<MockDocumentRef>();
    query::<MockQuery>();
    transaction::<MockTransaction>();
    write_batch::<MockWriteBatch>();
    bulk_writer::<MockBulkWriter>();
    snapshot::<MockDocumentSnapshot>();
    document_iterator::<MockDocumentIterator>();
    collection_iterator::<MockCollectionIterator>();
    query_snapshot_iterator::<MockQuerySnapshotIterator>();
    document_snapshot_iterator::<MockDocumentSnapshotIterator>();
    aggregation_query::<MockAggregationQuery>();
    aggregation_result::<MockAggregationResult>();
};
