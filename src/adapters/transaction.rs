use async_trait::async_trait;

use super::document_snapshot::{DocumentSnapshot, DocumentSnapshotAdapter};
use crate::error::Result;
use crate::firestore::{self, DocumentReference, MapValue, Precondition, SetOptions, Update};

/// Reads and queued writes of one transaction attempt
///
/// Reads must come before writes. Queued writes are committed when the
/// transaction function returns `Ok`.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Read `doc` inside the transaction
    async fn get(&self, doc: &DocumentReference) -> Result<Box<dyn DocumentSnapshot>>;

    /// Read several documents inside the transaction, in the order given
    async fn get_all(&self, docs: &[DocumentReference]) -> Result<Vec<Box<dyn DocumentSnapshot>>>;

    /// Queue creation of `doc`
    fn create(&self, doc: &DocumentReference, data: MapValue) -> Result<()>;

    /// Queue a write of `doc`
    fn set(&self, doc: &DocumentReference, data: MapValue, options: SetOptions) -> Result<()>;

    /// Queue field updates of `doc`
    fn update(
        &self,
        doc: &DocumentReference,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> Result<()>;

    /// Queue deletion of `doc`
    fn delete(&self, doc: &DocumentReference, precondition: Option<Precondition>) -> Result<()>;
}

/// [`Transaction`] backed by a [`firestore::Transaction`]
#[derive(Debug, Clone)]
pub struct TransactionAdapter {
    txn: firestore::Transaction,
}

impl TransactionAdapter {
    /// Wrap `txn`
    pub fn new(txn: firestore::Transaction) -> Self {
        Self { txn }
    }
}

#[async_trait]
impl Transaction for TransactionAdapter {
    async fn get(&self, doc: &DocumentReference) -> Result<Box<dyn DocumentSnapshot>> {
        let snapshot = self.txn.get(doc).await?;
        Ok(Box::new(DocumentSnapshotAdapter::new(snapshot)))
    }

    async fn get_all(&self, docs: &[DocumentReference]) -> Result<Vec<Box<dyn DocumentSnapshot>>> {
        let snapshots = self.txn.get_all(docs).await?;
        Ok(snapshots
            .into_iter()
            .map(|s| Box::new(DocumentSnapshotAdapter::new(s)) as Box<dyn DocumentSnapshot>)
            .collect())
    }

    fn create(&self, doc: &DocumentReference, data: MapValue) -> Result<()> {
        self.txn.create(doc, data)
    }

    fn set(&self, doc: &DocumentReference, data: MapValue, options: SetOptions) -> Result<()> {
        self.txn.set(doc, data, options)
    }

    fn update(
        &self,
        doc: &DocumentReference,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> Result<()> {
        self.txn.update(doc, updates, precondition)
    }

    fn delete(&self, doc: &DocumentReference, precondition: Option<Precondition>) -> Result<()> {
        self.txn.delete(doc, precondition)
    }
}
