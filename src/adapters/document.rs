use async_trait::async_trait;

use super::collection::{CollectionRef, CollectionRefAdapter};
use super::document_snapshot::{DocumentSnapshot, DocumentSnapshotAdapter};
use super::iterators::{
    CollectionIterator, CollectionIteratorAdapter, DocumentSnapshotIterator,
    DocumentSnapshotIteratorAdapter,
};
use crate::error::Result;
use crate::firestore::{
    DocumentReference, MapValue, Precondition, SetOptions, Update, WriteResult,
};

/// A single addressable document
#[async_trait]
pub trait DocumentRef: Send + Sync {
    /// Write the document, replacing or merging per `options`
    async fn set(&self, data: MapValue, options: SetOptions) -> Result<WriteResult>;

    /// Read the document; a missing document yields `exists() == false`
    async fn get(&self) -> Result<Box<dyn DocumentSnapshot>>;

    /// Delete the document
    async fn delete(&self, precondition: Option<Precondition>) -> Result<WriteResult>;

    /// Apply field updates to an existing document
    async fn update(
        &self,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> Result<WriteResult>;

    /// Create the document; fails if it already exists
    async fn create(&self, data: MapValue) -> Result<WriteResult>;

    /// Subcollection at `path` below this document
    fn collection(&self, path: &str) -> Box<dyn CollectionRef>;

    /// Subcollections of this document
    fn collections(&self) -> Box<dyn CollectionIterator>;

    /// Listen to the document's state
    fn snapshots(&self) -> Box<dyn DocumentSnapshotIterator>;

    /// The underlying client handle
    fn reference(&self) -> DocumentReference;

    /// Last path segment
    fn id(&self) -> &str;

    /// Path relative to the database root
    fn path(&self) -> &str;

    /// Collection containing this document
    fn parent(&self) -> Box<dyn CollectionRef>;
}

/// [`DocumentRef`] backed by a [`DocumentReference`]
#[derive(Debug, Clone)]
pub struct DocumentRefAdapter {
    doc: DocumentReference,
}

impl DocumentRefAdapter {
    /// Wrap `doc`
    pub fn new(doc: DocumentReference) -> Self {
        Self { doc }
    }
}

#[async_trait]
impl DocumentRef for DocumentRefAdapter {
    async fn set(&self, data: MapValue, options: SetOptions) -> Result<WriteResult> {
        self.doc.set(data, options).await
    }

    async fn get(&self) -> Result<Box<dyn DocumentSnapshot>> {
        let snapshot = self.doc.get().await?;
        Ok(Box::new(DocumentSnapshotAdapter::new(snapshot)))
    }

    async fn delete(&self, precondition: Option<Precondition>) -> Result<WriteResult> {
        self.doc.delete(precondition).await
    }

    async fn update(
        &self,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> Result<WriteResult> {
        self.doc.update(updates, precondition).await
    }

    async fn create(&self, data: MapValue) -> Result<WriteResult> {
        self.doc.create(data).await
    }

    fn collection(&self, path: &str) -> Box<dyn CollectionRef> {
        Box::new(CollectionRefAdapter::new(self.doc.collection(path)))
    }

    fn collections(&self) -> Box<dyn CollectionIterator> {
        Box::new(CollectionIteratorAdapter::new(self.doc.collections()))
    }

    fn snapshots(&self) -> Box<dyn DocumentSnapshotIterator> {
        Box::new(DocumentSnapshotIteratorAdapter::new(self.doc.snapshots()))
    }

    fn reference(&self) -> DocumentReference {
        self.doc.clone()
    }

    fn id(&self) -> &str {
        self.doc.id()
    }

    fn path(&self) -> &str {
        self.doc.path()
    }

    fn parent(&self) -> Box<dyn CollectionRef> {
        Box::new(CollectionRefAdapter::new(self.doc.parent()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FirestoreError;
    use crate::firestore::client::test_client;
    use crate::firestore::value::map_value;

    #[tokio::test]
    async fn test_reference_is_the_wrapped_handle() {
        let handle = test_client().doc("users/u1");
        let doc = DocumentRefAdapter::new(handle.clone());

        assert_eq!(doc.reference(), handle);
        assert_eq!(doc.id(), "u1");
        assert_eq!(doc.path(), "users/u1");
        assert_eq!(doc.collection("orders").path(), "users/u1/orders");
    }

    #[tokio::test]
    async fn test_errors_are_returned_unchanged() {
        let client = test_client();
        client.close().unwrap();
        let doc = DocumentRefAdapter::new(client.doc("users/u1"));

        let set = doc.set(map_value([("a", 1i64.into())]), SetOptions::Overwrite).await;
        assert!(matches!(set, Err(FirestoreError::ClientClosed)));

        let update = doc.update(vec![], None).await;
        assert!(matches!(update, Err(FirestoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_stop_on_listeners_is_repeatable() {
        let doc = DocumentRefAdapter::new(test_client().doc("users/u1"));

        let mut snapshots = doc.snapshots();
        snapshots.stop();
        snapshots.stop();
        assert!(snapshots.next().await.unwrap().is_none());

        let mut collections = doc.collections();
        collections.stop();
        collections.stop();
        assert!(collections.next().await.unwrap().is_none());
    }
}
