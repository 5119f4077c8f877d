//! Mock snapshots, iterators and aggregation results.
//!
//! Every fake here can be built from canned values, which lets a test script
//! the exact sequence of results (and failures) the code under test sees.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;

use super::store::{aggregate, AggregationKind, MemoryStore, QueryState};
use crate::adapters::{
    AggregationQuery, AggregationResult, CollectionIterator, CollectionRef, DocumentIterator,
    DocumentSnapshot, DocumentSnapshotIterator, QuerySnapshotIterator,
};
use crate::error::{FirestoreError, Result};
use crate::firestore::{
    self, Client, DocumentReference, MapValue, QuerySnapshot, Settings, Timestamp, Value,
};

/// Snapshot of a fake document
#[derive(Debug, Clone)]
pub struct MockDocumentSnapshot {
    snapshot: firestore::DocumentSnapshot,
}

impl MockDocumentSnapshot {
    /// Snapshot of `reference` holding `data`, or of a missing document
    pub fn new(reference: DocumentReference, data: Option<MapValue>) -> Self {
        let epoch = Timestamp {
            seconds: 0,
            nanoseconds: 0,
        };
        let time = data.as_ref().map(|_| epoch);
        Self {
            snapshot: firestore::DocumentSnapshot {
                reference,
                data,
                create_time: time,
                update_time: time,
                read_time: Some(epoch),
            },
        }
    }

    /// Existing document at `path` of the project "mock-project"
    pub fn found(path: &str, data: MapValue) -> Self {
        Self::new(detached_reference(path), Some(data))
    }

    /// Missing document at `path` of the project "mock-project"
    pub fn missing(path: &str) -> Self {
        Self::new(detached_reference(path), None)
    }

    /// Box as a trait object
    pub fn boxed(self) -> Box<dyn DocumentSnapshot> {
        Box::new(self)
    }
}

fn detached_reference(path: &str) -> DocumentReference {
    Client::detached(&Settings::new("mock-project")).doc(path)
}

impl From<firestore::DocumentSnapshot> for MockDocumentSnapshot {
    fn from(snapshot: firestore::DocumentSnapshot) -> Self {
        Self { snapshot }
    }
}

impl DocumentSnapshot for MockDocumentSnapshot {
    fn data(&self) -> Option<MapValue> {
        self.snapshot.data.clone()
    }

    fn data_at(&self, path: &str) -> Result<Value> {
        self.snapshot.data_at(path)
    }

    fn exists(&self) -> bool {
        self.snapshot.exists()
    }

    fn create_time(&self) -> Option<Timestamp> {
        self.snapshot.create_time
    }

    fn update_time(&self) -> Option<Timestamp> {
        self.snapshot.update_time
    }

    fn read_time(&self) -> Option<Timestamp> {
        self.snapshot.read_time
    }

    fn reference(&self) -> DocumentReference {
        self.snapshot.reference.clone()
    }
}

/// Queue of scripted results
///
/// An error ends the iteration: later calls return `Ok(None)`.
struct Canned<T> {
    items: VecDeque<Result<T>>,
    stop_calls: usize,
}

impl<T> Canned<T> {
    fn new(items: impl IntoIterator<Item = Result<T>>) -> Self {
        Self {
            items: items.into_iter().collect(),
            stop_calls: 0,
        }
    }

    fn from_result(result: Result<Vec<T>>) -> Self {
        match result {
            Ok(items) => Self::new(items.into_iter().map(Ok)),
            Err(e) => Self::new([Err(e)]),
        }
    }

    fn next(&mut self) -> Result<Option<T>> {
        match self.items.pop_front() {
            Some(Ok(item)) => Ok(Some(item)),
            Some(Err(e)) => {
                self.items.clear();
                Err(e)
            }
            None => Ok(None),
        }
    }

    fn stop(&mut self) {
        self.items.clear();
        self.stop_calls += 1;
    }
}

macro_rules! canned_iterator {
    ($(#[$doc:meta])* $name:ident, $item:ty) => {
        $(#[$doc])*
        pub struct $name {
            canned: Canned<$item>,
        }

        impl $name {
            /// Iterator yielding `items` in order
            pub fn new(items: Vec<$item>) -> Self {
                Self::from_result(Ok(items))
            }

            /// Iterator yielding `items`, or failing once with the error
            pub fn from_result(items: Result<Vec<$item>>) -> Self {
                Self {
                    canned: Canned::from_result(items),
                }
            }

            /// Iterator yielding each scripted result in turn
            pub fn from_results(items: Vec<Result<$item>>) -> Self {
                Self {
                    canned: Canned::new(items),
                }
            }

            /// Number of times `stop` was called
            pub fn stop_calls(&self) -> usize {
                self.canned.stop_calls
            }
        }
    };
}

canned_iterator!(
    /// Scripted [`DocumentIterator`]
    MockDocumentIterator,
    Box<dyn DocumentSnapshot>
);
canned_iterator!(
    /// Scripted [`CollectionIterator`]
    MockCollectionIterator,
    Box<dyn CollectionRef>
);
canned_iterator!(
    /// Scripted [`QuerySnapshotIterator`]
    MockQuerySnapshotIterator,
    QuerySnapshot
);
canned_iterator!(
    /// Scripted [`DocumentSnapshotIterator`]
    MockDocumentSnapshotIterator,
    Box<dyn DocumentSnapshot>
);

#[async_trait]
impl DocumentIterator for MockDocumentIterator {
    async fn next(&mut self) -> Result<Option<Box<dyn DocumentSnapshot>>> {
        self.canned.next()
    }

    fn stop(&mut self) {
        self.canned.stop();
    }

    async fn get_all(&mut self) -> Result<Vec<Box<dyn DocumentSnapshot>>> {
        let mut docs = Vec::new();
        while let Some(doc) = self.canned.next()? {
            docs.push(doc);
        }
        self.canned.stop();
        Ok(docs)
    }
}

#[async_trait]
impl CollectionIterator for MockCollectionIterator {
    async fn next(&mut self) -> Result<Option<Box<dyn CollectionRef>>> {
        self.canned.next()
    }

    fn stop(&mut self) {
        self.canned.stop();
    }
}

#[async_trait]
impl QuerySnapshotIterator for MockQuerySnapshotIterator {
    async fn next(&mut self) -> Result<Option<QuerySnapshot>> {
        self.canned.next()
    }

    fn stop(&mut self) {
        self.canned.stop();
    }
}

#[async_trait]
impl DocumentSnapshotIterator for MockDocumentSnapshotIterator {
    async fn next(&mut self) -> Result<Option<Box<dyn DocumentSnapshot>>> {
        self.canned.next()
    }

    fn stop(&mut self) {
        self.canned.stop();
    }
}

/// Aggregation evaluated against the in-memory store
#[derive(Clone)]
pub struct MockAggregationQuery {
    store: MemoryStore,
    query: QueryState,
    aggregations: Vec<(String, AggregationKind)>,
}

impl MockAggregationQuery {
    pub(crate) fn new(store: MemoryStore, query: QueryState) -> Self {
        Self {
            store,
            query,
            aggregations: Vec::new(),
        }
    }

    fn with(&self, alias: &str, kind: AggregationKind) -> Box<dyn AggregationQuery> {
        let mut next = self.clone();
        next.aggregations.push((alias.to_string(), kind));
        Box::new(next)
    }
}

#[async_trait]
impl AggregationQuery for MockAggregationQuery {
    fn with_count(&self, alias: &str) -> Box<dyn AggregationQuery> {
        self.with(alias, AggregationKind::Count)
    }

    fn with_sum(&self, path: &str, alias: &str) -> Box<dyn AggregationQuery> {
        self.with(alias, AggregationKind::Sum(path.to_string()))
    }

    fn with_avg(&self, path: &str, alias: &str) -> Box<dyn AggregationQuery> {
        self.with(alias, AggregationKind::Avg(path.to_string()))
    }

    async fn get(&self) -> Result<Box<dyn AggregationResult>> {
        if self.aggregations.is_empty() {
            return Err(FirestoreError::InvalidArgument(
                "aggregation query requires at least one aggregation".to_string(),
            ));
        }
        let documents = self.store.run_query(&self.query)?;
        let fields = self
            .aggregations
            .iter()
            .map(|(alias, kind)| (alias.clone(), aggregate(&documents, kind)))
            .collect();
        Ok(Box::new(MockAggregationResult {
            result: firestore::AggregationResult {
                fields,
                read_time: documents.first().and_then(|doc| doc.read_time),
            },
        }))
    }
}

/// Scripted [`AggregationResult`]
#[derive(Debug, Clone, Default)]
pub struct MockAggregationResult {
    result: firestore::AggregationResult,
}

impl MockAggregationResult {
    /// Result holding `fields`, keyed by alias
    pub fn new<'a>(fields: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        let fields: HashMap<String, Value> = fields
            .into_iter()
            .map(|(alias, value)| (alias.to_string(), value))
            .collect();
        Self {
            result: firestore::AggregationResult {
                fields,
                read_time: None,
            },
        }
    }
}

impl AggregationResult for MockAggregationResult {
    fn count(&self, alias: &str) -> Result<i64> {
        self.result.count(alias)
    }

    fn value(&self, alias: &str) -> Result<Value> {
        self.result.value(alias).cloned()
    }

    fn read_time(&self) -> Option<Timestamp> {
        self.result.read_time
    }
}
