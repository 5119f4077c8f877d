//! Mock transactions, write batches and bulk writers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use super::results::MockDocumentSnapshot;
use super::store::{MemoryStore, PendingWrite};
use crate::adapters::{BulkWriter, DocumentSnapshot, Transaction, WriteBatch};
use crate::error::{FirestoreError, Result};
use crate::firestore::bulk_writer::JobSender;
use crate::firestore::{
    BulkWriterJob, DocumentReference, MapValue, Precondition, SetOptions, Timestamp, Update,
    WriteResult,
};

type Queued = Vec<(String, PendingWrite)>;
type ReadVersions = Vec<(String, Option<Timestamp>)>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One attempt of a transaction against the in-memory store
///
/// Writes are queued and applied by the client when the transaction function
/// returns `Ok`. The update time of every document read is recorded, and the
/// commit aborts if one of them changed in the meantime. Cloning yields another
/// handle to the same attempt.
#[derive(Clone)]
pub struct MockTransaction {
    store: MemoryStore,
    read_only: bool,
    writes: Arc<Mutex<Queued>>,
    reads: Arc<Mutex<ReadVersions>>,
}

impl MockTransaction {
    pub(crate) fn new(store: MemoryStore, read_only: bool) -> Self {
        Self {
            store,
            read_only,
            writes: Arc::default(),
            reads: Arc::default(),
        }
    }

    /// Documents read so far with their update times at read time
    pub(crate) fn read_versions(&self) -> ReadVersions {
        lock(&self.reads).clone()
    }

    /// Number of writes queued so far
    pub fn queued_writes(&self) -> usize {
        lock(&self.writes).len()
    }

    pub(crate) fn take_writes(&self) -> Queued {
        std::mem::take(&mut *lock(&self.writes))
    }

    fn push(&self, doc: &DocumentReference, write: PendingWrite) -> Result<()> {
        if self.read_only {
            return Err(FirestoreError::InvalidArgument(
                "write in a read-only transaction".to_string(),
            ));
        }
        write.validate()?;
        lock(&self.writes).push((doc.path().to_string(), write));
        Ok(())
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn get(&self, doc: &DocumentReference) -> Result<Box<dyn DocumentSnapshot>> {
        let mut snapshots = self.get_all(std::slice::from_ref(doc)).await?;
        snapshots
            .pop()
            .ok_or_else(|| FirestoreError::InvalidData(format!("no result for {}", doc.path())))
    }

    async fn get_all(&self, docs: &[DocumentReference]) -> Result<Vec<Box<dyn DocumentSnapshot>>> {
        if self.queued_writes() > 0 {
            return Err(FirestoreError::InvalidArgument(
                "transaction reads must come before writes".to_string(),
            ));
        }
        docs.iter()
            .map(|doc| {
                let snapshot = self.store.get(doc.path())?;
                lock(&self.reads).push((doc.path().to_string(), snapshot.update_time));
                Ok(Box::new(MockDocumentSnapshot::from(snapshot)) as Box<dyn DocumentSnapshot>)
            })
            .collect()
    }

    fn create(&self, doc: &DocumentReference, data: MapValue) -> Result<()> {
        self.push(doc, PendingWrite::Create(data))
    }

    fn set(&self, doc: &DocumentReference, data: MapValue, options: SetOptions) -> Result<()> {
        self.push(doc, PendingWrite::Set(data, options))
    }

    fn update(
        &self,
        doc: &DocumentReference,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> Result<()> {
        self.push(doc, PendingWrite::Update(updates, precondition))
    }

    fn delete(&self, doc: &DocumentReference, precondition: Option<Precondition>) -> Result<()> {
        self.push(doc, PendingWrite::Delete(precondition))
    }
}

impl std::fmt::Debug for MockTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransaction")
            .field("read_only", &self.read_only)
            .field("queued_writes", &self.queued_writes())
            .finish()
    }
}

/// Write batch committed atomically to the in-memory store
pub struct MockWriteBatch {
    store: MemoryStore,
    writes: Queued,
    error: Option<FirestoreError>,
}

impl MockWriteBatch {
    pub(crate) fn new(store: MemoryStore) -> Self {
        Self {
            store,
            writes: Vec::new(),
            error: None,
        }
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Check if no write is queued
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    fn push(&mut self, doc: &DocumentReference, write: PendingWrite) -> &mut dyn WriteBatch {
        match write.validate() {
            Ok(()) => self.writes.push((doc.path().to_string(), write)),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }
}

#[async_trait]
impl WriteBatch for MockWriteBatch {
    fn create(&mut self, doc: &DocumentReference, data: MapValue) -> &mut dyn WriteBatch {
        self.push(doc, PendingWrite::Create(data))
    }

    fn set(&mut self, doc: &DocumentReference, data: MapValue, options: SetOptions) -> &mut dyn WriteBatch {
        self.push(doc, PendingWrite::Set(data, options))
    }

    fn update(
        &mut self,
        doc: &DocumentReference,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> &mut dyn WriteBatch {
        self.push(doc, PendingWrite::Update(updates, precondition))
    }

    fn delete(&mut self, doc: &DocumentReference, precondition: Option<Precondition>) -> &mut dyn WriteBatch {
        self.push(doc, PendingWrite::Delete(precondition))
    }

    async fn commit(&mut self) -> Result<Vec<WriteResult>> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        if self.writes.is_empty() {
            return Err(FirestoreError::InvalidArgument(
                "cannot commit an empty write batch".to_string(),
            ));
        }
        self.store.commit(std::mem::take(&mut self.writes))
    }
}

#[derive(Default)]
struct BulkState {
    pending: Vec<(String, PendingWrite, JobSender)>,
    closed: bool,
}

/// Bulk writer applying queued writes to the in-memory store on flush
///
/// Each write is applied on its own, so one failing write does not affect
/// the others.
#[derive(Clone)]
pub struct MockBulkWriter {
    store: MemoryStore,
    state: Arc<Mutex<BulkState>>,
}

impl MockBulkWriter {
    pub(crate) fn new(store: MemoryStore) -> Self {
        Self {
            store,
            state: Arc::default(),
        }
    }

    /// Number of writes waiting for the next flush
    pub fn pending(&self) -> usize {
        lock(&self.state).pending.len()
    }

    fn enqueue(&self, doc: &DocumentReference, write: PendingWrite) -> Result<BulkWriterJob> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(FirestoreError::BulkWriterClosed);
        }
        write.validate()?;

        let (tx, job) = BulkWriterJob::pending();
        state.pending.push((doc.path().to_string(), write, tx));
        Ok(job)
    }
}

#[async_trait]
impl BulkWriter for MockBulkWriter {
    fn create(&self, doc: &DocumentReference, data: MapValue) -> Result<BulkWriterJob> {
        self.enqueue(doc, PendingWrite::Create(data))
    }

    fn set(&self, doc: &DocumentReference, data: MapValue, options: SetOptions) -> Result<BulkWriterJob> {
        self.enqueue(doc, PendingWrite::Set(data, options))
    }

    fn update(
        &self,
        doc: &DocumentReference,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> Result<BulkWriterJob> {
        self.enqueue(doc, PendingWrite::Update(updates, precondition))
    }

    fn delete(&self, doc: &DocumentReference, precondition: Option<Precondition>) -> Result<BulkWriterJob> {
        self.enqueue(doc, PendingWrite::Delete(precondition))
    }

    async fn flush(&self) {
        let pending = std::mem::take(&mut lock(&self.state).pending);
        debug!(writes = pending.len(), "Mock bulk flush");
        for (path, write, sender) in pending {
            let outcome = self
                .store
                .commit(vec![(path, write)])
                .map(|mut results| results.pop().unwrap_or_default());
            let _ = sender.send(outcome);
        }
    }

    async fn end(&self) {
        lock(&self.state).closed = true;
        self.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::value::map_value;

    fn doc(store: &MemoryStore, path: &str) -> DocumentReference {
        store.reference(path)
    }

    #[tokio::test]
    async fn test_transaction_rejects_reads_after_writes() {
        let store = MemoryStore::default();
        let txn = MockTransaction::new(store.clone(), false);
        let users = doc(&store, "users/u1");

        txn.set(&users, MapValue::default(), SetOptions::Overwrite).unwrap();
        assert!(matches!(txn.get(&users).await, Err(FirestoreError::InvalidArgument(_))));
        assert_eq!(txn.take_writes().len(), 1);
        assert_eq!(txn.queued_writes(), 0);
    }

    #[tokio::test]
    async fn test_read_only_transaction_rejects_writes() {
        let store = MemoryStore::default();
        let txn = MockTransaction::new(store.clone(), true);

        let result = txn.delete(&doc(&store, "users/u1"), None);
        assert!(matches!(result, Err(FirestoreError::InvalidArgument(_))));
        assert!(!txn.get(&doc(&store, "users/u1")).await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_batch_commits_all_or_nothing() {
        let store = MemoryStore::default();
        let mut batch = MockWriteBatch::new(store.clone());
        batch
            .create(&doc(&store, "users/a"), map_value([("n", 1i64.into())]))
            .update(&doc(&store, "users/missing"), vec![Update::set("n", 2i64)], None);

        assert!(batch.commit().await.is_err());
        assert_eq!(store.len(), 0);

        let mut batch = MockWriteBatch::new(store.clone());
        batch
            .create(&doc(&store, "users/a"), map_value([("n", 1i64.into())]))
            .set(&doc(&store, "users/b"), MapValue::default(), SetOptions::Overwrite);
        assert_eq!(batch.commit().await.unwrap().len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_reports_invalid_write_on_commit() {
        let store = MemoryStore::default();
        let mut batch = MockWriteBatch::new(store.clone());
        assert!(matches!(batch.commit().await, Err(FirestoreError::InvalidArgument(_))));

        batch.update(&doc(&store, "users/a"), Vec::new(), None);
        assert!(batch.is_empty());
        assert!(matches!(batch.commit().await, Err(FirestoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_bulk_writer_resolves_jobs_independently() {
        let store = MemoryStore::default();
        let writer = MockBulkWriter::new(store.clone());

        let ok = writer
            .create(&doc(&store, "users/a"), map_value([("n", 1i64.into())]))
            .unwrap();
        let missing = writer
            .update(&doc(&store, "users/b"), vec![Update::set("n", 2i64)], None)
            .unwrap();
        assert_eq!(writer.pending(), 2);

        writer.end().await;
        assert!(ok.results().await.unwrap().update_time.is_some());
        assert!(missing.results().await.is_err());
        assert_eq!(store.len(), 1);

        let late = writer.delete(&doc(&store, "users/a"), None);
        assert!(matches!(late, Err(FirestoreError::BulkWriterClosed)));
        writer.end().await;
    }
}
