use async_trait::async_trait;

use crate::error::Result;
use crate::firestore::{self, DocumentReference, MapValue, Precondition, SetOptions, Update, WriteResult};

/// Writes applied atomically by one commit
///
/// Write methods return the batch for chaining. A write that cannot be
/// encoded is reported by `commit`.
#[async_trait]
pub trait WriteBatch: Send {
    /// Create `doc`
    fn create(&mut self, doc: &DocumentReference, data: MapValue) -> &mut dyn WriteBatch;

    /// Write `doc`, replacing or merging per `options`
    fn set(&mut self, doc: &DocumentReference, data: MapValue, options: SetOptions) -> &mut dyn WriteBatch;

    /// Apply field updates to `doc`
    fn update(
        &mut self,
        doc: &DocumentReference,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> &mut dyn WriteBatch;

    /// Delete `doc`
    fn delete(&mut self, doc: &DocumentReference, precondition: Option<Precondition>) -> &mut dyn WriteBatch;

    /// Apply every queued write, returning one result per write
    async fn commit(&mut self) -> Result<Vec<WriteResult>>;
}

/// [`WriteBatch`] backed by a [`firestore::WriteBatch`]
#[derive(Debug)]
pub struct WriteBatchAdapter {
    batch: firestore::WriteBatch,
}

impl WriteBatchAdapter {
    /// Wrap `batch`
    pub fn new(batch: firestore::WriteBatch) -> Self {
        Self { batch }
    }
}

#[async_trait]
impl WriteBatch for WriteBatchAdapter {
    fn create(&mut self, doc: &DocumentReference, data: MapValue) -> &mut dyn WriteBatch {
        self.batch.create(doc, data);
        self
    }

    fn set(&mut self, doc: &DocumentReference, data: MapValue, options: SetOptions) -> &mut dyn WriteBatch {
        self.batch.set(doc, data, options);
        self
    }

    fn update(
        &mut self,
        doc: &DocumentReference,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> &mut dyn WriteBatch {
        self.batch.update(doc, updates, precondition);
        self
    }

    fn delete(&mut self, doc: &DocumentReference, precondition: Option<Precondition>) -> &mut dyn WriteBatch {
        self.batch.delete(doc, precondition);
        self
    }

    async fn commit(&mut self) -> Result<Vec<WriteResult>> {
        self.batch.commit().await
    }
}
