//! Mock FirestoreClient implementation for testing.

use async_trait::async_trait;
use tracing::warn;

use super::references::{MockCollectionRef, MockDocumentRef};
use super::results::{MockCollectionIterator, MockDocumentSnapshot};
use super::store::{MemoryStore, PendingWrite};
use super::writes::{MockBulkWriter, MockTransaction, MockWriteBatch};
use crate::adapters::{
    BulkWriter, CollectionIterator, CollectionRef, DocumentRef, DocumentSnapshot, FirestoreClient,
    Transaction, TransactionFn, WriteBatch,
};
use crate::error::{FirestoreError, Result};
use crate::firestore::value::map_value;
use crate::firestore::{DocumentReference, MapValue, SetOptions, TransactionOptions, Value};

/// In-memory database implementing [`FirestoreClient`]
///
/// Clones share the same store.
#[derive(Clone, Default)]
pub struct MockFirestoreClient {
    store: MemoryStore,
}

impl MockFirestoreClient {
    /// Empty database for the project "mock-project"
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty database for `project_id`
    pub fn with_project(project_id: &str) -> Self {
        Self {
            store: MemoryStore::new(project_id),
        }
    }

    /// Store `data` at `path`, replacing any existing document
    pub fn insert(&self, path: &str, data: MapValue) -> Result<()> {
        self.store
            .commit(vec![(path.to_string(), PendingWrite::Set(data, SetOptions::Overwrite))])
            .map(|_| ())
    }

    /// Store a document built from `(field, value)` pairs
    pub fn insert_fields<'a>(
        &self,
        path: &str,
        fields: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<()> {
        self.insert(path, map_value(fields))
    }

    /// Fields stored at `path`, `None` when there is no document
    pub fn document(&self, path: &str) -> Option<MapValue> {
        self.store.fields(path)
    }

    /// Number of stored documents
    pub fn document_count(&self) -> usize {
        self.store.len()
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> usize {
        self.store.commit_count()
    }

    /// Make every read fail with `UNAVAILABLE`
    pub fn set_fail_on_read(&self, fail: bool) {
        self.store.set_fail_on_read(fail);
    }

    /// Make every write fail with `UNAVAILABLE`
    pub fn set_fail_on_write(&self, fail: bool) {
        self.store.set_fail_on_write(fail);
    }

    /// Fail the next `count` commits with `ABORTED`
    pub fn abort_next_commits(&self, count: u32) {
        self.store.abort_next_commits(count);
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }
}

#[async_trait]
impl FirestoreClient for MockFirestoreClient {
    fn collection(&self, path: &str) -> Box<dyn CollectionRef> {
        Box::new(MockCollectionRef::new(self.store.clone(), path))
    }

    fn doc(&self, path: &str) -> Box<dyn DocumentRef> {
        Box::new(MockDocumentRef::new(self.store.clone(), path))
    }

    fn batch(&self) -> Box<dyn WriteBatch> {
        Box::new(MockWriteBatch::new(self.store.clone()))
    }

    fn bulk_writer(&self) -> Box<dyn BulkWriter> {
        Box::new(MockBulkWriter::new(self.store.clone()))
    }

    async fn run_transaction(&self, f: TransactionFn, options: TransactionOptions) -> Result<()> {
        let max_attempts = options.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            if self.store.is_closed() {
                return Err(FirestoreError::ClientClosed);
            }
            let txn = MockTransaction::new(self.store.clone(), options.read_only);
            let handle: Box<dyn Transaction> = Box::new(txn.clone());

            let outcome = match f(handle).await {
                Ok(()) => self
                    .store
                    .commit_after_reads(txn.take_writes(), &txn.read_versions())
                    .map(|_| ()),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => return Ok(()),
                Err(e) if e.is_aborted() && attempt < max_attempts => {
                    warn!(attempt, error = %e, "Mock transaction aborted, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(FirestoreError::internal("transaction made no attempt"))
    }

    fn collections(&self) -> Box<dyn CollectionIterator> {
        let collections = self.store.collection_ids(None).map(|ids| {
            ids.into_iter()
                .map(|id| Box::new(MockCollectionRef::new(self.store.clone(), &id)) as Box<dyn CollectionRef>)
                .collect()
        });
        Box::new(MockCollectionIterator::from_result(collections))
    }

    async fn get_all(&self, refs: &[DocumentReference]) -> Result<Vec<Box<dyn DocumentSnapshot>>> {
        refs.iter()
            .map(|r| {
                let snapshot = self.store.get(r.path())?;
                Ok(Box::new(MockDocumentSnapshot::from(snapshot)) as Box<dyn DocumentSnapshot>)
            })
            .collect()
    }

    fn close(&self) -> Result<()> {
        self.store.close();
        Ok(())
    }
}
