use super::aggregation::{AggregationQuery, AggregationQueryAdapter};
use super::iterators::{
    DocumentIterator, DocumentIteratorAdapter, QuerySnapshotIterator, QuerySnapshotIteratorAdapter,
};
use crate::firestore::{self, Direction, Operator, Value};

/// Filtered, ordered and paginated view over a collection
///
/// Every modifier returns a new query and leaves the receiver unchanged.
/// Operators and paths are not validated here; the service rejects invalid
/// queries when they run.
pub trait Query: Send + Sync {
    /// Keep documents whose field at `path` compares to `value` with `op`
    fn where_(&self, path: &str, op: Operator, value: Value) -> Box<dyn Query>;

    /// Order results by the field at `path`
    fn order_by(&self, path: &str, direction: Direction) -> Box<dyn Query>;

    /// Return at most `n` documents
    fn limit(&self, n: i32) -> Box<dyn Query>;

    /// Return the last `n` documents of the ordered results
    fn limit_to_last(&self, n: i32) -> Box<dyn Query>;

    /// Skip the first `n` documents
    fn offset(&self, n: i32) -> Box<dyn Query>;

    /// Start at the position given by `values` of the orderings, inclusive
    fn start_at(&self, values: Vec<Value>) -> Box<dyn Query>;

    /// Start after the position given by `values` of the orderings
    fn start_after(&self, values: Vec<Value>) -> Box<dyn Query>;

    /// End at the position given by `values` of the orderings, inclusive
    fn end_at(&self, values: Vec<Value>) -> Box<dyn Query>;

    /// End before the position given by `values` of the orderings
    fn end_before(&self, values: Vec<Value>) -> Box<dyn Query>;

    /// Return only the fields at `paths`
    fn select(&self, paths: &[&str]) -> Box<dyn Query>;

    /// Run the query
    fn documents(&self) -> Box<dyn DocumentIterator>;

    /// Listen to the query's results
    fn snapshots(&self) -> Box<dyn QuerySnapshotIterator>;

    /// Aggregations over the query's results
    fn new_aggregation_query(&self) -> Box<dyn AggregationQuery>;
}

/// [`Query`] backed by a [`firestore::Query`]
#[derive(Debug, Clone)]
pub struct QueryAdapter {
    query: firestore::Query,
}

impl QueryAdapter {
    /// Wrap `query`
    pub fn new(query: firestore::Query) -> Self {
        Self { query }
    }

    /// The wrapped query
    pub fn query(&self) -> &firestore::Query {
        &self.query
    }

    pub(crate) fn boxed(query: firestore::Query) -> Box<dyn Query> {
        Box::new(Self::new(query))
    }
}

impl Query for QueryAdapter {
    fn where_(&self, path: &str, op: Operator, value: Value) -> Box<dyn Query> {
        Self::boxed(self.query.where_(path, op, value))
    }

    fn order_by(&self, path: &str, direction: Direction) -> Box<dyn Query> {
        Self::boxed(self.query.order_by(path, direction))
    }

    fn limit(&self, n: i32) -> Box<dyn Query> {
        Self::boxed(self.query.limit(n))
    }

    fn limit_to_last(&self, n: i32) -> Box<dyn Query> {
        Self::boxed(self.query.limit_to_last(n))
    }

    fn offset(&self, n: i32) -> Box<dyn Query> {
        Self::boxed(self.query.offset(n))
    }

    fn start_at(&self, values: Vec<Value>) -> Box<dyn Query> {
        Self::boxed(self.query.start_at(values))
    }

    fn start_after(&self, values: Vec<Value>) -> Box<dyn Query> {
        Self::boxed(self.query.start_after(values))
    }

    fn end_at(&self, values: Vec<Value>) -> Box<dyn Query> {
        Self::boxed(self.query.end_at(values))
    }

    fn end_before(&self, values: Vec<Value>) -> Box<dyn Query> {
        Self::boxed(self.query.end_before(values))
    }

    fn select(&self, paths: &[&str]) -> Box<dyn Query> {
        Self::boxed(self.query.select(paths.iter().copied()))
    }

    fn documents(&self) -> Box<dyn DocumentIterator> {
        Box::new(DocumentIteratorAdapter::new(self.query.documents()))
    }

    fn snapshots(&self) -> Box<dyn QuerySnapshotIterator> {
        Box::new(QuerySnapshotIteratorAdapter::new(self.query.snapshots()))
    }

    fn new_aggregation_query(&self) -> Box<dyn AggregationQuery> {
        Box::new(AggregationQueryAdapter::new(self.query.new_aggregation_query()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FirestoreError;
    use crate::firestore::client::test_client;

    fn base() -> QueryAdapter {
        QueryAdapter::new(test_client().collection("users").query().clone())
    }

    #[tokio::test]
    async fn test_modifiers_leave_receiver_unchanged() {
        let query = base();
        let _filtered = query.where_("age", Operator::GreaterThan, 21i64.into());

        let sq = query.query().to_structured_query().unwrap();
        assert!(sq.r#where.is_none());
    }

    #[tokio::test]
    async fn test_terminal_operations_forward_errors() {
        let client = test_client();
        client.close().unwrap();
        let query = QueryAdapter::new(client.collection("users").query().clone())
            .where_("age", Operator::GreaterThan, 21i64.into())
            .where_("status", Operator::Equal, "active".into())
            .order_by("age", Direction::Descending)
            .limit(10);

        let mut docs = query.documents();
        assert!(matches!(docs.next().await, Err(FirestoreError::ClientClosed)));

        let aggregate = query.new_aggregation_query().with_count("n");
        assert!(matches!(aggregate.get().await, Err(FirestoreError::ClientClosed)));
    }
}
