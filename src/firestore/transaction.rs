//! Firestore transaction support
//!
//! A [`Transaction`] is handed to the function passed to
//! [`Client::run_transaction`](super::Client::run_transaction). Reads go to
//! the server inside the transaction; writes are queued locally and sent in
//! the commit that follows a successful return of the function. All reads
//! must happen before the first write.

use std::sync::{Arc, Mutex, PoisonError};

use super::client::Client;
use super::document_reference::DocumentReference;
use super::document_snapshot::DocumentSnapshot;
use super::value::{proto, MapValue};
use super::write::{self, Precondition, SetOptions, Update};
use crate::error::{FirestoreError, Result};

use proto::google::firestore::v1::batch_get_documents_request::ConsistencySelector;
use proto::google::firestore::v1::Write;

/// Default number of attempts made by `run_transaction`
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Options for `run_transaction`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Attempts made before giving up on contention
    ///
    /// Default: 5
    pub max_attempts: u32,

    /// Run a read-only transaction; writes are rejected
    ///
    /// Default: false
    pub read_only: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            read_only: false,
        }
    }
}

impl TransactionOptions {
    /// Options for a read-only transaction
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Set the number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// One attempt of a transaction
///
/// Cloning yields another handle to the same attempt.
#[derive(Clone)]
pub struct Transaction {
    client: Client,
    inner: Arc<TransactionInner>,
}

struct TransactionInner {
    id: Vec<u8>,
    read_only: bool,
    writes: Mutex<Vec<Write>>,
}

impl Transaction {
    pub(crate) fn new(client: Client, id: Vec<u8>, read_only: bool) -> Self {
        Self {
            client,
            inner: Arc::new(TransactionInner {
                id,
                read_only,
                writes: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Read a document inside the transaction
    pub async fn get(&self, doc: &DocumentReference) -> Result<DocumentSnapshot> {
        let mut snapshots = self.get_all(std::slice::from_ref(doc)).await?;
        snapshots
            .pop()
            .ok_or_else(|| FirestoreError::InvalidData(format!("no result for {}", doc.path())))
    }

    /// Read several documents inside the transaction, in the order given
    pub async fn get_all(&self, docs: &[DocumentReference]) -> Result<Vec<DocumentSnapshot>> {
        if self.has_writes() {
            return Err(FirestoreError::InvalidArgument(
                "transaction reads must come before writes".to_string(),
            ));
        }
        self.client
            .batch_get(docs, Some(ConsistencySelector::Transaction(self.inner.id.clone())))
            .await
    }

    /// Queue creation of `doc`
    pub fn create(&self, doc: &DocumentReference, data: MapValue) -> Result<()> {
        self.push(write::create_write(doc.name(), data))
    }

    /// Queue a write of `doc`
    pub fn set(&self, doc: &DocumentReference, data: MapValue, options: SetOptions) -> Result<()> {
        self.push(write::set_write(doc.name(), data, &options))
    }

    /// Queue field updates of `doc`
    pub fn update(
        &self,
        doc: &DocumentReference,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> Result<()> {
        self.push(write::update_write(doc.name(), updates, precondition)?)
    }

    /// Queue deletion of `doc`
    pub fn delete(&self, doc: &DocumentReference, precondition: Option<Precondition>) -> Result<()> {
        self.push(write::delete_write(doc.name(), precondition))
    }

    fn push(&self, write: Write) -> Result<()> {
        if self.inner.read_only {
            return Err(FirestoreError::InvalidArgument(
                "write in a read-only transaction".to_string(),
            ));
        }
        self.writes().push(write);
        Ok(())
    }

    fn writes(&self) -> std::sync::MutexGuard<'_, Vec<Write>> {
        self.inner.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_writes(&self) -> bool {
        !self.writes().is_empty()
    }

    pub(crate) fn take_writes(&self) -> Vec<Write> {
        std::mem::take(&mut *self.writes())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("read_only", &self.inner.read_only)
            .field("queued_writes", &self.writes().len())
            .finish()
    }
}
