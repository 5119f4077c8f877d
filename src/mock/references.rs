//! Mock query, collection and document references.

use async_trait::async_trait;

use super::results::{
    MockAggregationQuery, MockCollectionIterator, MockDocumentIterator, MockDocumentSnapshot,
    MockDocumentSnapshotIterator, MockQuerySnapshotIterator,
};
use super::store::{MemoryStore, PendingWrite, QueryState};
use crate::adapters::{
    AggregationQuery, CollectionIterator, CollectionRef, DocumentIterator, DocumentRef,
    DocumentSnapshot, DocumentSnapshotIterator, Query, QuerySnapshotIterator,
};
use crate::error::Result;
use crate::firestore::{
    Direction, DocumentChange, DocumentChangeKind, DocumentReference, MapValue, Operator,
    Precondition, QuerySnapshot, SetOptions, Update, Value, WriteResult,
};

/// Query evaluated against the in-memory store
///
/// Results are read when `documents`, `snapshots` or an aggregation is
/// created.
#[derive(Clone)]
pub struct MockQuery {
    store: MemoryStore,
    state: QueryState,
}

impl MockQuery {
    pub(crate) fn new(store: MemoryStore, state: QueryState) -> Self {
        Self { store, state }
    }

    fn with(&self, change: impl FnOnce(&mut QueryState)) -> Box<dyn Query> {
        let mut state = self.state.clone();
        change(&mut state);
        Box::new(Self::new(self.store.clone(), state))
    }

    fn read_documents(&self) -> Box<dyn DocumentIterator> {
        let docs = self.store.run_query(&self.state).map(|docs| {
            docs.into_iter()
                .map(|doc| Box::new(MockDocumentSnapshot::from(doc)) as Box<dyn DocumentSnapshot>)
                .collect()
        });
        Box::new(MockDocumentIterator::from_result(docs))
    }

    fn read_snapshots(&self) -> Box<dyn QuerySnapshotIterator> {
        let snapshot = self.store.run_query(&self.state).map(|documents| {
            let changes = documents
                .iter()
                .enumerate()
                .map(|(i, doc)| DocumentChange {
                    kind: DocumentChangeKind::Added,
                    document: doc.clone(),
                    old_index: None,
                    new_index: Some(i),
                })
                .collect();
            let read_time = documents.first().and_then(|doc| doc.read_time);
            vec![QuerySnapshot {
                documents,
                changes,
                read_time,
            }]
        });
        Box::new(MockQuerySnapshotIterator::from_result(snapshot))
    }

    fn aggregation(&self) -> Box<dyn AggregationQuery> {
        Box::new(MockAggregationQuery::new(self.store.clone(), self.state.clone()))
    }
}

macro_rules! query_modifiers {
    ($ty:ty, $query:ident) => {
        impl Query for $ty {
            fn where_(&self, path: &str, op: Operator, value: Value) -> Box<dyn Query> {
                self.$query()
                    .with(|q| q.filters.push((path.to_string(), op, value)))
            }

            fn order_by(&self, path: &str, direction: Direction) -> Box<dyn Query> {
                self.$query()
                    .with(|q| q.orders.push((path.to_string(), direction)))
            }

            fn limit(&self, n: i32) -> Box<dyn Query> {
                self.$query().with(|q| {
                    q.limit = Some(n);
                    q.limit_to_last = false;
                })
            }

            fn limit_to_last(&self, n: i32) -> Box<dyn Query> {
                self.$query().with(|q| {
                    q.limit = Some(n);
                    q.limit_to_last = true;
                })
            }

            fn offset(&self, n: i32) -> Box<dyn Query> {
                self.$query().with(|q| q.offset = n)
            }

            fn start_at(&self, values: Vec<Value>) -> Box<dyn Query> {
                self.$query().with(|q| q.start = Some((values, true)))
            }

            fn start_after(&self, values: Vec<Value>) -> Box<dyn Query> {
                self.$query().with(|q| q.start = Some((values, false)))
            }

            fn end_at(&self, values: Vec<Value>) -> Box<dyn Query> {
                self.$query().with(|q| q.end = Some((values, true)))
            }

            fn end_before(&self, values: Vec<Value>) -> Box<dyn Query> {
                self.$query().with(|q| q.end = Some((values, false)))
            }

            fn select(&self, paths: &[&str]) -> Box<dyn Query> {
                self.$query()
                    .with(|q| q.projection = Some(paths.iter().map(|p| p.to_string()).collect()))
            }

            fn documents(&self) -> Box<dyn DocumentIterator> {
                self.$query().read_documents()
            }

            fn snapshots(&self) -> Box<dyn QuerySnapshotIterator> {
                self.$query().read_snapshots()
            }

            fn new_aggregation_query(&self) -> Box<dyn AggregationQuery> {
                self.$query().aggregation()
            }
        }
    };
}

impl MockQuery {
    fn as_query(&self) -> &MockQuery {
        self
    }
}

query_modifiers!(MockQuery, as_query);
query_modifiers!(MockCollectionRef, as_query);

/// Collection of the in-memory store
#[derive(Clone)]
pub struct MockCollectionRef {
    path: String,
    query: MockQuery,
}

impl MockCollectionRef {
    pub(crate) fn new(store: MemoryStore, path: &str) -> Self {
        let path = path.trim_matches('/').to_string();
        let state = QueryState {
            collection: path.clone(),
            ..Default::default()
        };
        Self {
            query: MockQuery::new(store, state),
            path,
        }
    }

    fn as_query(&self) -> &MockQuery {
        &self.query
    }

    fn store(&self) -> &MemoryStore {
        &self.query.store
    }
}

#[async_trait]
impl CollectionRef for MockCollectionRef {
    fn doc(&self, id: &str) -> Box<dyn DocumentRef> {
        Box::new(MockDocumentRef::new(self.store().clone(), &format!("{}/{}", self.path, id)))
    }

    async fn add(&self, data: MapValue) -> Result<(DocumentReference, WriteResult)> {
        let reference = self.store().new_doc(&self.path);
        let mut results = self
            .store()
            .commit(vec![(reference.path().to_string(), PendingWrite::Create(data))])?;
        Ok((reference, results.pop().unwrap_or_default()))
    }

    fn new_doc(&self) -> Box<dyn DocumentRef> {
        let reference = self.store().new_doc(&self.path);
        Box::new(MockDocumentRef::new(self.store().clone(), reference.path()))
    }

    fn parent(&self) -> Option<Box<dyn DocumentRef>> {
        self.path.rsplit_once('/').map(|(parent, _)| {
            Box::new(MockDocumentRef::new(self.store().clone(), parent)) as Box<dyn DocumentRef>
        })
    }

    fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    fn path(&self) -> &str {
        &self.path
    }
}

/// Document of the in-memory store
#[derive(Clone)]
pub struct MockDocumentRef {
    store: MemoryStore,
    reference: DocumentReference,
}

impl MockDocumentRef {
    pub(crate) fn new(store: MemoryStore, path: &str) -> Self {
        Self {
            reference: store.reference(path),
            store,
        }
    }

    fn write(&self, write: PendingWrite) -> Result<WriteResult> {
        let mut results = self
            .store
            .commit(vec![(self.reference.path().to_string(), write)])?;
        Ok(results.pop().unwrap_or_default())
    }
}

#[async_trait]
impl DocumentRef for MockDocumentRef {
    async fn set(&self, data: MapValue, options: SetOptions) -> Result<WriteResult> {
        self.write(PendingWrite::Set(data, options))
    }

    async fn get(&self) -> Result<Box<dyn DocumentSnapshot>> {
        let snapshot = self.store.get(self.reference.path())?;
        Ok(Box::new(MockDocumentSnapshot::from(snapshot)))
    }

    async fn delete(&self, precondition: Option<Precondition>) -> Result<WriteResult> {
        self.write(PendingWrite::Delete(precondition))
    }

    async fn update(
        &self,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> Result<WriteResult> {
        let write = PendingWrite::Update(updates, precondition);
        write.validate()?;
        self.write(write)
    }

    async fn create(&self, data: MapValue) -> Result<WriteResult> {
        self.write(PendingWrite::Create(data))
    }

    fn collection(&self, path: &str) -> Box<dyn CollectionRef> {
        let path = format!("{}/{}", self.reference.path(), path.trim_matches('/'));
        Box::new(MockCollectionRef::new(self.store.clone(), &path))
    }

    fn collections(&self) -> Box<dyn CollectionIterator> {
        let parent = self.reference.path();
        let collections = self.store.collection_ids(Some(parent)).map(|ids| {
            ids.into_iter()
                .map(|id| {
                    let path = format!("{}/{}", parent, id);
                    Box::new(MockCollectionRef::new(self.store.clone(), &path)) as Box<dyn CollectionRef>
                })
                .collect()
        });
        Box::new(MockCollectionIterator::from_result(collections))
    }

    fn snapshots(&self) -> Box<dyn DocumentSnapshotIterator> {
        let snapshot = self.store.get(self.reference.path()).map(|snapshot| {
            vec![Box::new(MockDocumentSnapshot::from(snapshot)) as Box<dyn DocumentSnapshot>]
        });
        Box::new(MockDocumentSnapshotIterator::from_result(snapshot))
    }

    fn reference(&self) -> DocumentReference {
        self.reference.clone()
    }

    fn id(&self) -> &str {
        self.reference.id()
    }

    fn path(&self) -> &str {
        self.reference.path()
    }

    fn parent(&self) -> Box<dyn CollectionRef> {
        Box::new(MockCollectionRef::new(self.store.clone(), self.reference.parent().path()))
    }
}
