use async_trait::async_trait;

use super::aggregation::{AggregationQuery, AggregationQueryAdapter};
use super::document::{DocumentRef, DocumentRefAdapter};
use super::iterators::{
    DocumentIterator, DocumentIteratorAdapter, QuerySnapshotIterator, QuerySnapshotIteratorAdapter,
};
use super::query::{Query, QueryAdapter};
use crate::error::Result;
use crate::firestore::{self, Direction, DocumentReference, MapValue, Operator, Value, WriteResult};

/// A collection of documents, also usable as the query over all of them
#[async_trait]
pub trait CollectionRef: Query {
    /// Document `id` within this collection
    fn doc(&self, id: &str) -> Box<dyn DocumentRef>;

    /// Create a document with an auto-generated id holding `data`
    async fn add(&self, data: MapValue) -> Result<(DocumentReference, WriteResult)>;

    /// Reference to a new document with an auto-generated id
    fn new_doc(&self) -> Box<dyn DocumentRef>;

    /// Document containing this collection; `None` for a root collection
    fn parent(&self) -> Option<Box<dyn DocumentRef>>;

    /// Last path segment
    fn id(&self) -> &str;

    /// Path relative to the database root
    fn path(&self) -> &str;
}

/// [`CollectionRef`] backed by a [`firestore::CollectionReference`]
#[derive(Debug, Clone)]
pub struct CollectionRefAdapter {
    collection: firestore::CollectionReference,
}

impl CollectionRefAdapter {
    /// Wrap `collection`
    pub fn new(collection: firestore::CollectionReference) -> Self {
        Self { collection }
    }

    /// The wrapped collection reference
    pub fn collection(&self) -> &firestore::CollectionReference {
        &self.collection
    }
}

impl Query for CollectionRefAdapter {
    fn where_(&self, path: &str, op: Operator, value: Value) -> Box<dyn Query> {
        QueryAdapter::boxed(self.collection.where_(path, op, value))
    }

    fn order_by(&self, path: &str, direction: Direction) -> Box<dyn Query> {
        QueryAdapter::boxed(self.collection.order_by(path, direction))
    }

    fn limit(&self, n: i32) -> Box<dyn Query> {
        QueryAdapter::boxed(self.collection.limit(n))
    }

    fn limit_to_last(&self, n: i32) -> Box<dyn Query> {
        QueryAdapter::boxed(self.collection.limit_to_last(n))
    }

    fn offset(&self, n: i32) -> Box<dyn Query> {
        QueryAdapter::boxed(self.collection.offset(n))
    }

    fn start_at(&self, values: Vec<Value>) -> Box<dyn Query> {
        QueryAdapter::boxed(self.collection.start_at(values))
    }

    fn start_after(&self, values: Vec<Value>) -> Box<dyn Query> {
        QueryAdapter::boxed(self.collection.start_after(values))
    }

    fn end_at(&self, values: Vec<Value>) -> Box<dyn Query> {
        QueryAdapter::boxed(self.collection.end_at(values))
    }

    fn end_before(&self, values: Vec<Value>) -> Box<dyn Query> {
        QueryAdapter::boxed(self.collection.end_before(values))
    }

    fn select(&self, paths: &[&str]) -> Box<dyn Query> {
        QueryAdapter::boxed(self.collection.select(paths.iter().copied()))
    }

    fn documents(&self) -> Box<dyn DocumentIterator> {
        Box::new(DocumentIteratorAdapter::new(self.collection.documents()))
    }

    fn snapshots(&self) -> Box<dyn QuerySnapshotIterator> {
        Box::new(QuerySnapshotIteratorAdapter::new(self.collection.snapshots()))
    }

    fn new_aggregation_query(&self) -> Box<dyn AggregationQuery> {
        Box::new(AggregationQueryAdapter::new(self.collection.new_aggregation_query()))
    }
}

#[async_trait]
impl CollectionRef for CollectionRefAdapter {
    fn doc(&self, id: &str) -> Box<dyn DocumentRef> {
        Box::new(DocumentRefAdapter::new(self.collection.doc(id)))
    }

    async fn add(&self, data: MapValue) -> Result<(DocumentReference, WriteResult)> {
        self.collection.add(data).await
    }

    fn new_doc(&self) -> Box<dyn DocumentRef> {
        Box::new(DocumentRefAdapter::new(self.collection.new_doc()))
    }

    fn parent(&self) -> Option<Box<dyn DocumentRef>> {
        self.collection
            .parent()
            .map(|doc| Box::new(DocumentRefAdapter::new(doc)) as Box<dyn DocumentRef>)
    }

    fn id(&self) -> &str {
        self.collection.id()
    }

    fn path(&self) -> &str {
        self.collection.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::client::test_client;

    #[tokio::test]
    async fn test_collection_accessors() {
        let orders = CollectionRefAdapter::new(test_client().collection("users/u1/orders"));

        assert_eq!(orders.id(), "orders");
        assert_eq!(orders.path(), "users/u1/orders");
        assert_eq!(orders.doc("o1").path(), "users/u1/orders/o1");
        assert_eq!(orders.parent().map(|p| p.path().to_string()), Some("users/u1".to_string()));

        let root = CollectionRefAdapter::new(test_client().collection("users"));
        assert!(root.parent().is_none());
    }

    #[tokio::test]
    async fn test_new_doc_is_wrapped() {
        let users = CollectionRefAdapter::new(test_client().collection("users"));
        let doc = users.new_doc();

        assert_eq!(doc.id().len(), 20);
        assert_eq!(doc.parent().path(), "users");
    }

    #[tokio::test]
    async fn test_collection_is_a_query() {
        let users = CollectionRefAdapter::new(test_client().collection("users"));
        let as_query: &dyn Query = &users;
        let _filtered = as_query.where_("age", Operator::GreaterThan, 21i64.into());

        let sq = users.collection().to_structured_query().unwrap();
        assert!(sq.r#where.is_none());
    }
}
