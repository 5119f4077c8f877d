use async_trait::async_trait;

use crate::error::Result;
use crate::firestore::{
    self, BulkWriterJob, DocumentReference, MapValue, Precondition, SetOptions, Update,
};

/// Non-atomic, high-throughput writes
///
/// Each queued write yields a [`BulkWriterJob`] that resolves to its own
/// outcome.
#[async_trait]
pub trait BulkWriter: Send + Sync {
    /// Queue creation of `doc`
    fn create(&self, doc: &DocumentReference, data: MapValue) -> Result<BulkWriterJob>;

    /// Queue a write of `doc`
    fn set(&self, doc: &DocumentReference, data: MapValue, options: SetOptions) -> Result<BulkWriterJob>;

    /// Queue field updates of `doc`
    fn update(
        &self,
        doc: &DocumentReference,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> Result<BulkWriterJob>;

    /// Queue deletion of `doc`
    fn delete(&self, doc: &DocumentReference, precondition: Option<Precondition>) -> Result<BulkWriterJob>;

    /// Send every queued write and wait for completion
    async fn flush(&self);

    /// Flush, then reject further writes
    async fn end(&self);
}

/// [`BulkWriter`] backed by a [`firestore::BulkWriter`]
#[derive(Debug, Clone)]
pub struct BulkWriterAdapter {
    writer: firestore::BulkWriter,
}

impl BulkWriterAdapter {
    /// Wrap `writer`
    pub fn new(writer: firestore::BulkWriter) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl BulkWriter for BulkWriterAdapter {
    fn create(&self, doc: &DocumentReference, data: MapValue) -> Result<BulkWriterJob> {
        self.writer.create(doc, data)
    }

    fn set(&self, doc: &DocumentReference, data: MapValue, options: SetOptions) -> Result<BulkWriterJob> {
        self.writer.set(doc, data, options)
    }

    fn update(
        &self,
        doc: &DocumentReference,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> Result<BulkWriterJob> {
        self.writer.update(doc, updates, precondition)
    }

    fn delete(&self, doc: &DocumentReference, precondition: Option<Precondition>) -> Result<BulkWriterJob> {
        self.writer.delete(doc, precondition)
    }

    async fn flush(&self) {
        self.writer.flush().await
    }

    async fn end(&self) {
        self.writer.end().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FirestoreError;
    use crate::firestore::client::test_client;

    #[tokio::test]
    async fn test_jobs_resolve_after_flush() {
        let client = test_client();
        client.close().unwrap();
        let writer = BulkWriterAdapter::new(client.bulk_writer());

        let job = writer.delete(&client.doc("users/u1"), None).unwrap();
        writer.flush().await;
        assert!(matches!(job.results().await, Err(FirestoreError::ClientClosed)));
    }

    #[tokio::test]
    async fn test_end_is_forwarded() {
        let client = test_client();
        let writer: Box<dyn BulkWriter> = Box::new(BulkWriterAdapter::new(client.bulk_writer()));

        writer.end().await;
        let result = writer.delete(&client.doc("users/u1"), None);
        assert!(matches!(result, Err(FirestoreError::BulkWriterClosed)));
    }
}
