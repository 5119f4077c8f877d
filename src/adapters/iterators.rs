//! Result iterators
//!
//! `next` yields `Ok(Some(item))` until the results are exhausted, then
//! `Ok(None)`. `stop` releases the server stream and may be called any number
//! of times; after it, `next` keeps returning `Ok(None)`.

use async_trait::async_trait;

use super::collection::{CollectionRef, CollectionRefAdapter};
use super::document_snapshot::{DocumentSnapshot, DocumentSnapshotAdapter};
use crate::error::Result;
use crate::firestore::{self, QuerySnapshot};

/// Documents returned by a query
#[async_trait]
pub trait DocumentIterator: Send {
    /// Next document
    async fn next(&mut self) -> Result<Option<Box<dyn DocumentSnapshot>>>;

    /// Release the server stream
    fn stop(&mut self);

    /// Read every remaining document, then stop
    async fn get_all(&mut self) -> Result<Vec<Box<dyn DocumentSnapshot>>>;
}

/// Collections below a document or the database root
#[async_trait]
pub trait CollectionIterator: Send {
    /// Next collection
    async fn next(&mut self) -> Result<Option<Box<dyn CollectionRef>>>;

    /// Stop listing
    fn stop(&mut self);
}

/// Successive snapshots of a query's result set
#[async_trait]
pub trait QuerySnapshotIterator: Send {
    /// Wait for the next snapshot
    async fn next(&mut self) -> Result<Option<QuerySnapshot>>;

    /// Close the listen stream
    fn stop(&mut self);
}

/// Successive states of one document
#[async_trait]
pub trait DocumentSnapshotIterator: Send {
    /// Wait for the next state of the document
    async fn next(&mut self) -> Result<Option<Box<dyn DocumentSnapshot>>>;

    /// Close the listen stream
    fn stop(&mut self);
}

fn wrap_snapshot(snapshot: firestore::DocumentSnapshot) -> Box<dyn DocumentSnapshot> {
    Box::new(DocumentSnapshotAdapter::new(snapshot))
}

/// [`DocumentIterator`] backed by a [`firestore::DocumentIterator`]
pub struct DocumentIteratorAdapter {
    iter: firestore::DocumentIterator,
}

impl DocumentIteratorAdapter {
    /// Wrap `iter`
    pub fn new(iter: firestore::DocumentIterator) -> Self {
        Self { iter }
    }
}

#[async_trait]
impl DocumentIterator for DocumentIteratorAdapter {
    async fn next(&mut self) -> Result<Option<Box<dyn DocumentSnapshot>>> {
        Ok(self.iter.next().await?.map(wrap_snapshot))
    }

    fn stop(&mut self) {
        self.iter.stop();
    }

    async fn get_all(&mut self) -> Result<Vec<Box<dyn DocumentSnapshot>>> {
        Ok(self.iter.get_all().await?.into_iter().map(wrap_snapshot).collect())
    }
}

/// [`CollectionIterator`] backed by a [`firestore::CollectionIterator`]
pub struct CollectionIteratorAdapter {
    iter: firestore::CollectionIterator,
}

impl CollectionIteratorAdapter {
    /// Wrap `iter`
    pub fn new(iter: firestore::CollectionIterator) -> Self {
        Self { iter }
    }
}

#[async_trait]
impl CollectionIterator for CollectionIteratorAdapter {
    async fn next(&mut self) -> Result<Option<Box<dyn CollectionRef>>> {
        Ok(self
            .iter
            .next()
            .await?
            .map(|c| Box::new(CollectionRefAdapter::new(c)) as Box<dyn CollectionRef>))
    }

    fn stop(&mut self) {
        self.iter.stop();
    }
}

/// [`QuerySnapshotIterator`] backed by a [`firestore::QuerySnapshotIterator`]
pub struct QuerySnapshotIteratorAdapter {
    iter: firestore::QuerySnapshotIterator,
}

impl QuerySnapshotIteratorAdapter {
    /// Wrap `iter`
    pub fn new(iter: firestore::QuerySnapshotIterator) -> Self {
        Self { iter }
    }
}

#[async_trait]
impl QuerySnapshotIterator for QuerySnapshotIteratorAdapter {
    async fn next(&mut self) -> Result<Option<QuerySnapshot>> {
        self.iter.next().await
    }

    fn stop(&mut self) {
        self.iter.stop();
    }
}

/// [`DocumentSnapshotIterator`] backed by a [`firestore::DocumentSnapshotIterator`]
pub struct DocumentSnapshotIteratorAdapter {
    iter: firestore::DocumentSnapshotIterator,
}

impl DocumentSnapshotIteratorAdapter {
    /// Wrap `iter`
    pub fn new(iter: firestore::DocumentSnapshotIterator) -> Self {
        Self { iter }
    }
}

#[async_trait]
impl DocumentSnapshotIterator for DocumentSnapshotIteratorAdapter {
    async fn next(&mut self) -> Result<Option<Box<dyn DocumentSnapshot>>> {
        Ok(self.iter.next().await?.map(wrap_snapshot))
    }

    fn stop(&mut self) {
        self.iter.stop();
    }
}
