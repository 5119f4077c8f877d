//! Cloud Firestore client
//!
//! A thin client over the `google.firestore.v1.Firestore` gRPC service. It is
//! the concrete layer wrapped by [`crate::adapters`]:
//! - `client.rs` (Client, connection and interceptor, transactions)
//! - `collection_reference.rs`, `document_reference.rs`, `query.rs`
//! - `document_snapshot.rs`, `query_snapshot.rs`
//! - `iterators.rs` (query results, collection listings)
//! - `listener.rs` (real-time snapshots)
//! - `write.rs`, `write_batch.rs`, `transaction.rs`, `bulk_writer.rs`
//! - `aggregate_query.rs`
//! - `value.rs`, `timestamp.rs`, `geo_point.rs`, `settings.rs`

pub mod aggregate_query;
pub mod bulk_writer;
pub mod client;
pub mod collection_reference;
pub mod document_reference;
pub mod document_snapshot;
pub mod geo_point;
pub mod iterators;
pub mod listener;
pub mod query;
pub mod query_snapshot;
pub mod settings;
pub mod timestamp;
pub mod transaction;
pub mod value;
pub mod write;
pub mod write_batch;

pub use aggregate_query::{AggregationQuery, AggregationResult};
pub use bulk_writer::{BulkWriter, BulkWriterJob};
pub use client::Client;
pub use collection_reference::CollectionReference;
pub use document_reference::DocumentReference;
pub use document_snapshot::DocumentSnapshot;
pub use geo_point::GeoPoint;
pub use iterators::{CollectionIterator, DocumentIterator};
pub use listener::{DocumentSnapshotIterator, QuerySnapshotIterator};
pub use query::{Direction, Operator, Query};
pub use query_snapshot::{DocumentChange, DocumentChangeKind, QuerySnapshot};
pub use settings::Settings;
pub use timestamp::Timestamp;
pub use transaction::{Transaction, TransactionOptions};
pub use value::{ArrayValue, MapValue, Value, ValueType};
pub use write::{Precondition, SetOptions, Update, UpdateOp, WriteResult};
pub use write_batch::WriteBatch;
