use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::bulk_writer::{BulkWriter, BulkWriterAdapter};
use super::collection::{CollectionRef, CollectionRefAdapter};
use super::document::{DocumentRef, DocumentRefAdapter};
use super::document_snapshot::{DocumentSnapshot, DocumentSnapshotAdapter};
use super::iterators::{CollectionIterator, CollectionIteratorAdapter};
use super::transaction::{Transaction, TransactionAdapter};
use super::write_batch::{WriteBatch, WriteBatchAdapter};
use crate::error::Result;
use crate::firestore::{self, DocumentReference, TransactionOptions};

/// Function run by [`FirestoreClient::run_transaction`]
///
/// It is called once per attempt with a fresh transaction.
pub type TransactionFn =
    Arc<dyn Fn(Box<dyn Transaction>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Build a [`TransactionFn`] from an async closure
///
/// ```no_run
/// # use firestore_adapters::adapters::{transaction_fn, FirestoreClient};
/// # use firestore_adapters::firestore::{TransactionOptions, Update};
/// # async fn example(db: &dyn FirestoreClient) -> firestore_adapters::Result<()> {
/// let counter = db.doc("counters/visits").reference();
/// db.run_transaction(
///     transaction_fn(move |txn| {
///         let counter = counter.clone();
///         async move { txn.update(&counter, vec![Update::increment("n", 1i64)], None) }
///     }),
///     TransactionOptions::default(),
/// )
/// .await
/// # }
/// ```
pub fn transaction_fn<F, Fut>(f: F) -> TransactionFn
where
    F: Fn(Box<dyn Transaction>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |txn| Box::pin(f(txn)))
}

/// Top-level database handle
#[async_trait]
pub trait FirestoreClient: Send + Sync {
    /// Collection at a slash-separated `path`
    fn collection(&self, path: &str) -> Box<dyn CollectionRef>;

    /// Document at a slash-separated `path`
    fn doc(&self, path: &str) -> Box<dyn DocumentRef>;

    /// Empty write batch
    fn batch(&self) -> Box<dyn WriteBatch>;

    /// New bulk writer
    fn bulk_writer(&self) -> Box<dyn BulkWriter>;

    /// Run `f` inside a transaction, committing its writes when it succeeds
    async fn run_transaction(&self, f: TransactionFn, options: TransactionOptions) -> Result<()>;

    /// Root collections of the database
    fn collections(&self) -> Box<dyn CollectionIterator>;

    /// Read several documents, in the order given
    async fn get_all(&self, refs: &[DocumentReference]) -> Result<Vec<Box<dyn DocumentSnapshot>>>;

    /// Close the underlying connection
    fn close(&self) -> Result<()>;
}

/// [`FirestoreClient`] backed by a [`firestore::Client`]
#[derive(Debug, Clone)]
pub struct ClientAdapter {
    client: firestore::Client,
}

impl ClientAdapter {
    /// Wrap `client`
    pub fn new(client: firestore::Client) -> Self {
        Self { client }
    }

    /// The wrapped client
    pub fn client(&self) -> &firestore::Client {
        &self.client
    }
}

impl From<firestore::Client> for ClientAdapter {
    fn from(client: firestore::Client) -> Self {
        Self::new(client)
    }
}

#[async_trait]
impl FirestoreClient for ClientAdapter {
    fn collection(&self, path: &str) -> Box<dyn CollectionRef> {
        Box::new(CollectionRefAdapter::new(self.client.collection(path)))
    }

    fn doc(&self, path: &str) -> Box<dyn DocumentRef> {
        Box::new(DocumentRefAdapter::new(self.client.doc(path)))
    }

    fn batch(&self) -> Box<dyn WriteBatch> {
        Box::new(WriteBatchAdapter::new(self.client.batch()))
    }

    fn bulk_writer(&self) -> Box<dyn BulkWriter> {
        Box::new(BulkWriterAdapter::new(self.client.bulk_writer()))
    }

    async fn run_transaction(&self, f: TransactionFn, options: TransactionOptions) -> Result<()> {
        self.client
            .run_transaction(
                move |txn| {
                    let txn: Box<dyn Transaction> = Box::new(TransactionAdapter::new(txn));
                    f(txn)
                },
                options,
            )
            .await
    }

    fn collections(&self) -> Box<dyn CollectionIterator> {
        Box::new(CollectionIteratorAdapter::new(self.client.collections()))
    }

    async fn get_all(&self, refs: &[DocumentReference]) -> Result<Vec<Box<dyn DocumentSnapshot>>> {
        let snapshots = self.client.get_all(refs).await?;
        Ok(snapshots
            .into_iter()
            .map(|s| Box::new(DocumentSnapshotAdapter::new(s)) as Box<dyn DocumentSnapshot>)
            .collect())
    }

    fn close(&self) -> Result<()> {
        self.client.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FirestoreError;
    use crate::firestore::client::test_client;

    #[tokio::test]
    async fn test_references_are_wrapped() {
        let db = ClientAdapter::new(test_client());

        let users = db.collection("users");
        assert_eq!(users.path(), "users");

        let order = db.doc("users/u1").collection("orders").doc("o1");
        assert_eq!(order.path(), "users/u1/orders/o1");
        assert_eq!(order.parent().path(), "users/u1/orders");
    }

    #[tokio::test]
    async fn test_close_is_forwarded() {
        let db = ClientAdapter::new(test_client());
        db.close().unwrap();
        assert!(db.client().is_closed());

        let result = db.doc("users/u1").get().await;
        assert!(matches!(result, Err(FirestoreError::ClientClosed)));
    }

    #[tokio::test]
    async fn test_transaction_errors_propagate() {
        let db = ClientAdapter::new(test_client());
        db.close().unwrap();

        let result = db
            .run_transaction(transaction_fn(|_txn| async { Ok::<(), FirestoreError>(()) }), TransactionOptions::default())
            .await;
        assert!(matches!(result, Err(FirestoreError::ClientClosed)));
    }
}
