//! Firestore DocumentReference type

use super::client::Client;
use super::collection_reference::CollectionReference;
use super::document_snapshot::DocumentSnapshot;
use super::iterators::CollectionIterator;
use super::listener::DocumentSnapshotIterator;
use super::value::MapValue;
use super::write::{self, Precondition, SetOptions, Update, WriteResult};
use crate::error::{FirestoreError, Result};

/// Reference to a Firestore document
///
/// Holds the document's path relative to the database root
/// (e.g. "users/alice") and the client used for operations on it.
#[derive(Clone)]
pub struct DocumentReference {
    pub(crate) client: Client,
    path: String,
}

impl DocumentReference {
    pub(crate) fn new(client: Client, path: String) -> Self {
        Self {
            client,
            path: path.trim_matches('/').to_string(),
        }
    }

    /// Document ID (last segment of path)
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Path relative to the database root
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full resource name:
    /// `projects/{project_id}/databases/{database_id}/documents/{path}`
    pub fn name(&self) -> String {
        self.client.resource_name(&self.path)
    }

    /// Collection containing this document
    pub fn parent(&self) -> CollectionReference {
        let parent_path = self
            .path
            .rsplit_once('/')
            .map(|(parent, _)| parent)
            .unwrap_or_default();
        CollectionReference::new(self.client.clone(), parent_path.to_string())
    }

    /// Subcollection of this document
    pub fn collection(&self, collection_path: &str) -> CollectionReference {
        CollectionReference::new(
            self.client.clone(),
            format!("{}/{}", self.path, collection_path.trim_matches('/')),
        )
    }

    /// Client this reference belongs to
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Read the document
    ///
    /// A missing document is not an error: the snapshot reports
    /// `exists() == false`.
    pub async fn get(&self) -> Result<DocumentSnapshot> {
        let mut snapshots = self.client.get_all(std::slice::from_ref(self)).await?;
        snapshots
            .pop()
            .ok_or_else(|| FirestoreError::InvalidData(format!("no result for {}", self.path)))
    }

    /// Write the document, replacing or merging per `options`
    pub async fn set(&self, data: MapValue, options: SetOptions) -> Result<WriteResult> {
        self.commit_one(write::set_write(self.name(), data, &options)).await
    }

    /// Create the document; fails with `ALREADY_EXISTS` if it is present
    pub async fn create(&self, data: MapValue) -> Result<WriteResult> {
        self.commit_one(write::create_write(self.name(), data)).await
    }

    /// Apply field updates to an existing document
    ///
    /// Without an explicit precondition the document must exist.
    pub async fn update(
        &self,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> Result<WriteResult> {
        self.commit_one(write::update_write(self.name(), updates, precondition)?)
            .await
    }

    /// Delete the document
    ///
    /// Deleting a missing document succeeds unless a precondition says otherwise.
    pub async fn delete(&self, precondition: Option<Precondition>) -> Result<WriteResult> {
        self.commit_one(write::delete_write(self.name(), precondition))
            .await
    }

    /// Iterate over the subcollections of this document
    pub fn collections(&self) -> CollectionIterator {
        CollectionIterator::new(self.client.clone(), self.name(), Some(self.path.clone()))
    }

    /// Listen for changes to this document
    pub fn snapshots(&self) -> DocumentSnapshotIterator {
        DocumentSnapshotIterator::new(self.clone())
    }

    async fn commit_one(
        &self,
        write: super::value::proto::google::firestore::v1::Write,
    ) -> Result<WriteResult> {
        let mut results = self.client.commit(vec![write], Vec::new()).await?;
        Ok(results.pop().unwrap_or_default())
    }
}

impl std::fmt::Debug for DocumentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentReference")
            .field("path", &self.path)
            .field("database", &self.client.database_path())
            .finish()
    }
}

impl PartialEq for DocumentReference {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.client.database_path() == other.client.database_path()
    }
}

impl Eq for DocumentReference {}
