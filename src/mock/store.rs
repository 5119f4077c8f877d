//! In-memory document store shared by the fakes
//!
//! Documents are kept by relative path. Writes go through [`MemoryStore::commit`],
//! which applies a group of writes atomically: either all of them land or the
//! store is left untouched. Each commit advances a logical clock used for the
//! documents' create and update times.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{FirestoreError, Result};
use crate::firestore::value::{compare_values, field_at, type_rank};
use crate::firestore::{
    self, Client, Direction, DocumentReference, MapValue, Operator, Precondition, SetOptions,
    Settings, Timestamp, Update, UpdateOp, Value, ValueType, WriteResult,
};
use crate::firestore::query::DOCUMENT_ID;

/// A write waiting to be applied
#[derive(Debug, Clone)]
pub(crate) enum PendingWrite {
    Create(MapValue),
    Set(MapValue, SetOptions),
    Update(Vec<Update>, Option<Precondition>),
    Delete(Option<Precondition>),
}

impl PendingWrite {
    /// Reject writes the real client refuses to encode
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            PendingWrite::Update(updates, _) if updates.is_empty() => Err(
                FirestoreError::InvalidArgument("update requires at least one field".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    fields: MapValue,
    create_time: Timestamp,
    update_time: Timestamp,
}

#[derive(Default)]
struct StoreState {
    documents: BTreeMap<String, StoredDocument>,
    clock: i64,
    commits: usize,
    closed: bool,
    fail_on_read: bool,
    fail_on_write: bool,
    aborts_remaining: u32,
}

/// Filter, ordering and pagination state of a fake query
#[derive(Debug, Clone, Default)]
pub(crate) struct QueryState {
    /// Relative path of the queried collection
    pub(crate) collection: String,
    pub(crate) filters: Vec<(String, Operator, Value)>,
    pub(crate) orders: Vec<(String, Direction)>,
    pub(crate) limit: Option<i32>,
    pub(crate) limit_to_last: bool,
    pub(crate) offset: i32,
    /// Cursor values and whether the cursor position itself is included
    pub(crate) start: Option<(Vec<Value>, bool)>,
    pub(crate) end: Option<(Vec<Value>, bool)>,
    pub(crate) projection: Option<Vec<String>>,
}

/// Shared handle to the in-memory database
#[derive(Clone)]
pub(crate) struct MemoryStore {
    client: Client,
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub(crate) fn new(project_id: &str) -> Self {
        Self {
            client: Client::detached(&Settings::new(project_id)),
            state: Arc::new(Mutex::new(StoreState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reference handed out by the fakes for `path`
    pub(crate) fn reference(&self, path: &str) -> DocumentReference {
        self.client.doc(path)
    }

    /// Reference to a new document of `collection` with a random id
    pub(crate) fn new_doc(&self, collection: &str) -> DocumentReference {
        self.client.collection(collection).new_doc()
    }

    pub(crate) fn close(&self) {
        self.state().closed = true;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub(crate) fn set_fail_on_read(&self, fail: bool) {
        self.state().fail_on_read = fail;
    }

    pub(crate) fn set_fail_on_write(&self, fail: bool) {
        self.state().fail_on_write = fail;
    }

    pub(crate) fn abort_next_commits(&self, count: u32) {
        self.state().aborts_remaining = count;
    }

    pub(crate) fn commit_count(&self) -> usize {
        self.state().commits
    }

    pub(crate) fn fields(&self, path: &str) -> Option<MapValue> {
        self.state().documents.get(path).map(|doc| doc.fields.clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.state().documents.len()
    }

    fn check_read(state: &StoreState) -> Result<()> {
        if state.closed {
            return Err(FirestoreError::ClientClosed);
        }
        if state.fail_on_read {
            return Err(FirestoreError::Status(tonic::Status::unavailable(
                "mock read failure",
            )));
        }
        Ok(())
    }

    /// Snapshot of the document at `path`, existing or not
    pub(crate) fn get(&self, path: &str) -> Result<firestore::DocumentSnapshot> {
        let state = self.state();
        Self::check_read(&state)?;
        Ok(self.snapshot(&state, path))
    }

    fn snapshot(&self, state: &StoreState, path: &str) -> firestore::DocumentSnapshot {
        let stored = state.documents.get(path);
        firestore::DocumentSnapshot {
            reference: self.reference(path),
            data: stored.map(|doc| doc.fields.clone()),
            create_time: stored.map(|doc| doc.create_time),
            update_time: stored.map(|doc| doc.update_time),
            read_time: Some(Timestamp {
                seconds: state.clock,
                nanoseconds: 0,
            }),
        }
    }

    /// Apply `writes` atomically, returning one result per write
    pub(crate) fn commit(&self, writes: Vec<(String, PendingWrite)>) -> Result<Vec<WriteResult>> {
        self.commit_after_reads(writes, &[])
    }

    /// Like [`MemoryStore::commit`], but fails with `ABORTED` when a document
    /// in `reads` changed since it was read
    ///
    /// Each read is the document path and its update time at read time,
    /// `None` for a missing document.
    pub(crate) fn commit_after_reads(
        &self,
        writes: Vec<(String, PendingWrite)>,
        reads: &[(String, Option<Timestamp>)],
    ) -> Result<Vec<WriteResult>> {
        let mut state = self.state();
        if state.closed {
            return Err(FirestoreError::ClientClosed);
        }
        if state.fail_on_write {
            return Err(FirestoreError::Status(tonic::Status::unavailable(
                "mock write failure",
            )));
        }
        if state.aborts_remaining > 0 {
            state.aborts_remaining -= 1;
            return Err(FirestoreError::Status(tonic::Status::aborted(
                "mock transaction contention",
            )));
        }
        if let Some((path, _)) = reads.iter().find(|(path, read_time)| {
            state.documents.get(path).map(|doc| doc.update_time) != *read_time
        }) {
            return Err(FirestoreError::Status(tonic::Status::aborted(format!(
                "document changed since it was read: {}",
                path
            ))));
        }

        let now = Timestamp {
            seconds: state.clock + 1,
            nanoseconds: 0,
        };
        let mut documents = state.documents.clone();
        let results = writes
            .into_iter()
            .map(|(path, write)| apply(&mut documents, &path, write, now))
            .collect::<Result<Vec<_>>>()?;

        state.documents = documents;
        state.clock = now.seconds;
        state.commits += 1;
        debug!(writes = results.len(), commit = state.commits, "Mock commit");
        Ok(results)
    }

    /// Documents matched by `query`, in result order
    pub(crate) fn run_query(&self, query: &QueryState) -> Result<Vec<firestore::DocumentSnapshot>> {
        if query.limit_to_last && query.orders.is_empty() {
            return Err(FirestoreError::InvalidArgument(
                "limit_to_last requires at least one order_by".to_string(),
            ));
        }
        let state = self.state();
        Self::check_read(&state)?;

        let mut matched: Vec<(&String, &StoredDocument)> = state
            .documents
            .iter()
            .filter(|(path, _)| parent_collection(path) == Some(query.collection.as_str()))
            .filter(|(path, doc)| {
                query
                    .filters
                    .iter()
                    .all(|(field, op, value)| matches_filter(path, doc, field, *op, value))
            })
            .filter(|(path, doc)| {
                query
                    .orders
                    .iter()
                    .all(|(field, _)| field_value(path, doc, field).is_some())
            })
            .collect();

        matched.sort_by(|a, b| compare_documents(&query.orders, a, b));

        matched.retain(|doc| {
            let after_start = query.start.as_ref().map_or(true, |(values, inclusive)| {
                match compare_to_cursor(&query.orders, doc, values) {
                    Ordering::Greater => true,
                    Ordering::Equal => *inclusive,
                    Ordering::Less => false,
                }
            });
            let before_end = query.end.as_ref().map_or(true, |(values, inclusive)| {
                match compare_to_cursor(&query.orders, doc, values) {
                    Ordering::Less => true,
                    Ordering::Equal => *inclusive,
                    Ordering::Greater => false,
                }
            });
            after_start && before_end
        });

        // limit_to_last runs reversed on the wire: offset and limit count from the end
        if query.limit_to_last {
            matched.reverse();
        }
        let offset = usize::try_from(query.offset).unwrap_or(0);
        let mut matched: Vec<_> = matched.into_iter().skip(offset).collect();
        if let Some(limit) = query.limit {
            matched.truncate(usize::try_from(limit).unwrap_or(0));
        }
        if query.limit_to_last {
            matched.reverse();
        }

        Ok(matched
            .into_iter()
            .map(|(path, _)| {
                let mut snapshot = self.snapshot(&state, path);
                if let (Some(paths), Some(data)) = (&query.projection, snapshot.data.as_mut()) {
                    *data = project(data, paths);
                }
                snapshot
            })
            .collect())
    }

    /// Ids of the collections directly below `parent`, or at the root
    pub(crate) fn collection_ids(&self, parent: Option<&str>) -> Result<Vec<String>> {
        let state = self.state();
        Self::check_read(&state)?;

        let ids: BTreeSet<String> = state
            .documents
            .keys()
            .filter_map(|path| match parent {
                Some(parent) => path.strip_prefix(parent)?.strip_prefix('/'),
                None => Some(path.as_str()),
            })
            .filter_map(|rest| rest.split_once('/').map(|(id, _)| id.to_string()))
            .collect();
        Ok(ids.into_iter().collect())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("mock-project")
    }
}

fn parent_collection(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

fn not_found(path: &str) -> FirestoreError {
    FirestoreError::Status(tonic::Status::not_found(format!("no document at {}", path)))
}

fn apply(
    documents: &mut BTreeMap<String, StoredDocument>,
    path: &str,
    write: PendingWrite,
    now: Timestamp,
) -> Result<WriteResult> {
    write.validate()?;
    let existing = documents.get(path);
    let create_time = existing.map_or(now, |doc| doc.create_time);

    let fields = match write {
        PendingWrite::Create(data) => {
            if existing.is_some() {
                return Err(FirestoreError::Status(tonic::Status::already_exists(format!(
                    "document already exists: {}",
                    path
                ))));
            }
            data
        }
        PendingWrite::Set(data, options) => {
            let mut fields = existing.map(|doc| doc.fields.clone()).unwrap_or_default();
            match options {
                SetOptions::Overwrite => fields = data,
                SetOptions::MergeAll => merge_into(&mut fields, data),
                SetOptions::Merge(paths) => {
                    for field in paths {
                        match field_at(&data, &field) {
                            Some(value) => set_field(&mut fields, &field, value.clone()),
                            None => remove_field(&mut fields, &field),
                        }
                    }
                }
            }
            fields
        }
        PendingWrite::Update(updates, precondition) => {
            check_precondition(path, existing, precondition.unwrap_or(Precondition::Exists(true)))?;
            let mut fields = existing.map(|doc| doc.fields.clone()).unwrap_or_default();
            for update in updates {
                match update.op {
                    UpdateOp::Set(value) => set_field(&mut fields, &update.path, value),
                    UpdateOp::Delete => remove_field(&mut fields, &update.path),
                    UpdateOp::ServerTimestamp => set_field(&mut fields, &update.path, now.into()),
                    UpdateOp::Increment(by) => {
                        let value = increment(field_at(&fields, &update.path), &by);
                        set_field(&mut fields, &update.path, value);
                    }
                }
            }
            fields
        }
        PendingWrite::Delete(precondition) => {
            if let Some(precondition) = precondition {
                check_precondition(path, existing, precondition)?;
            }
            let removed = documents.remove(path);
            return Ok(WriteResult {
                update_time: removed.map(|_| now),
            });
        }
    };

    documents.insert(
        path.to_string(),
        StoredDocument {
            fields,
            create_time,
            update_time: now,
        },
    );
    Ok(WriteResult {
        update_time: Some(now),
    })
}

fn check_precondition(
    path: &str,
    existing: Option<&StoredDocument>,
    precondition: Precondition,
) -> Result<()> {
    match (precondition, existing) {
        (Precondition::Exists(true), None) => Err(not_found(path)),
        (Precondition::Exists(false), Some(_)) => Err(FirestoreError::Status(
            tonic::Status::already_exists(format!("document already exists: {}", path)),
        )),
        (Precondition::UpdateTime(expected), Some(doc)) if doc.update_time == expected => Ok(()),
        (Precondition::UpdateTime(_), _) => Err(FirestoreError::Status(
            tonic::Status::failed_precondition(format!("update time mismatch: {}", path)),
        )),
        _ => Ok(()),
    }
}

fn merge_into(target: &mut MapValue, data: MapValue) {
    for (key, value) in data.fields {
        let existing = target.fields.get_mut(&key).and_then(|v| v.value_type.as_mut());
        if let (Some(ValueType::MapValue(existing)), Some(ValueType::MapValue(incoming))) =
            (existing, &value.value_type)
        {
            merge_into(existing, incoming.clone());
            continue;
        }
        target.fields.insert(key, value);
    }
}

fn set_field(map: &mut MapValue, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.fields.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .fields
                .entry(head.to_string())
                .or_insert_with(|| MapValue::default().into());
            if !matches!(entry.value_type, Some(ValueType::MapValue(_))) {
                *entry = MapValue::default().into();
            }
            if let Some(ValueType::MapValue(child)) = entry.value_type.as_mut() {
                set_field(child, rest, value);
            }
        }
    }
}

fn remove_field(map: &mut MapValue, path: &str) {
    match path.split_once('.') {
        None => {
            map.fields.remove(path);
        }
        Some((head, rest)) => {
            if let Some(ValueType::MapValue(child)) =
                map.fields.get_mut(head).and_then(|v| v.value_type.as_mut())
            {
                remove_field(child, rest);
            }
        }
    }
}

fn increment(current: Option<&Value>, by: &Value) -> Value {
    match (current.and_then(|v| v.value_type.as_ref()), by.value_type.as_ref()) {
        (Some(ValueType::IntegerValue(a)), Some(ValueType::IntegerValue(b))) => {
            a.saturating_add(*b).into()
        }
        (Some(ValueType::IntegerValue(_) | ValueType::DoubleValue(_)), Some(_)) => {
            match (current.and_then(Value::as_f64), by.as_f64()) {
                (Some(a), Some(b)) => (a + b).into(),
                _ => by.clone(),
            }
        }
        _ => by.clone(),
    }
}

fn project(data: &MapValue, paths: &[String]) -> MapValue {
    let mut projected = MapValue::default();
    for path in paths {
        if let Some(value) = field_at(data, path) {
            set_field(&mut projected, path, value.clone());
        }
    }
    projected
}

fn field_value(path: &str, doc: &StoredDocument, field: &str) -> Option<Value> {
    if field == DOCUMENT_ID {
        return Some(Value::from(path));
    }
    field_at(&doc.fields, field).cloned()
}

fn matches_filter(path: &str, doc: &StoredDocument, field: &str, op: Operator, value: &Value) -> bool {
    let Some(stored) = field_value(path, doc, field) else {
        return false;
    };
    let comparable = type_rank(&stored) == type_rank(value);
    let ordered = comparable && !stored.is_nan() && !value.is_nan();
    let ordering = compare_values(&stored, value);
    let contains = |values: &[Value], v: &Value| {
        values.iter().any(|x| compare_values(x, v) == Ordering::Equal)
    };

    match op {
        Operator::Equal => comparable && ordering == Ordering::Equal,
        Operator::NotEqual => !stored.is_null() && !(comparable && ordering == Ordering::Equal),
        Operator::LessThan => ordered && ordering == Ordering::Less,
        Operator::LessThanOrEqual => ordered && ordering != Ordering::Greater,
        Operator::GreaterThan => ordered && ordering == Ordering::Greater,
        Operator::GreaterThanOrEqual => ordered && ordering != Ordering::Less,
        Operator::ArrayContains => stored.as_array().is_some_and(|items| contains(items, value)),
        Operator::ArrayContainsAny => match (stored.as_array(), value.as_array()) {
            (Some(items), Some(wanted)) => wanted.iter().any(|w| contains(items, w)),
            _ => false,
        },
        Operator::In => value.as_array().is_some_and(|wanted| contains(wanted, &stored)),
        Operator::NotIn => {
            !stored.is_null() && value.as_array().is_some_and(|excluded| !contains(excluded, &stored))
        }
    }
}

fn compare_documents(
    orders: &[(String, Direction)],
    (path_a, doc_a): &(&String, &StoredDocument),
    (path_b, doc_b): &(&String, &StoredDocument),
) -> Ordering {
    for (field, direction) in orders {
        let a = field_value(path_a, doc_a, field).unwrap_or_else(Value::null);
        let b = field_value(path_b, doc_b, field).unwrap_or_else(Value::null);
        let ordering = compare_values(&a, &b);
        let ordering = if *direction == Direction::Descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    path_a.cmp(path_b)
}

fn compare_to_cursor(
    orders: &[(String, Direction)],
    (path, doc): &(&String, &StoredDocument),
    cursor: &[Value],
) -> Ordering {
    for ((field, direction), bound) in orders.iter().zip(cursor) {
        let value = field_value(path, doc, field).unwrap_or_else(Value::null);
        let ordering = compare_values(&value, bound);
        let ordering = if *direction == Direction::Descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Count, sum and average over the documents matched by `query`
pub(crate) fn aggregate(
    documents: &[firestore::DocumentSnapshot],
    kind: &AggregationKind,
) -> Value {
    match kind {
        AggregationKind::Count => (documents.len() as i64).into(),
        AggregationKind::Sum(path) | AggregationKind::Avg(path) => {
            let numbers: Vec<&Value> = documents
                .iter()
                .filter_map(|doc| doc.data.as_ref().and_then(|data| field_at(data, path)))
                .filter(|value| value.as_f64().is_some())
                .collect();
            if let AggregationKind::Avg(_) = kind {
                if numbers.is_empty() {
                    return Value::null();
                }
                let total: f64 = numbers.iter().filter_map(|v| v.as_f64()).sum();
                return (total / numbers.len() as f64).into();
            }
            // Integer sums that overflow are reported as doubles
            let integer_sum = numbers
                .iter()
                .try_fold(0i64, |total, v| v.as_i64().and_then(|n| total.checked_add(n)));
            match integer_sum {
                Some(total) => total.into(),
                None => numbers.iter().filter_map(|v| v.as_f64()).sum::<f64>().into(),
            }
        }
    }
}

/// One aggregation of a fake aggregation query
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AggregationKind {
    Count,
    Sum(String),
    Avg(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::value::map_value;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::default();
        store
            .commit(vec![
                (
                    "users/a".to_string(),
                    PendingWrite::Create(map_value([("age", 30i64.into()), ("team", "red".into())])),
                ),
                (
                    "users/b".to_string(),
                    PendingWrite::Create(map_value([("age", 20i64.into()), ("team", "blue".into())])),
                ),
                (
                    "users/c".to_string(),
                    PendingWrite::Create(map_value([("age", 40i64.into()), ("team", "red".into())])),
                ),
                (
                    "users/a/orders/o1".to_string(),
                    PendingWrite::Create(map_value([("total", 5i64.into())])),
                ),
            ])
            .unwrap();
        store
    }

    fn ids(docs: &[firestore::DocumentSnapshot]) -> Vec<&str> {
        docs.iter().map(|d| d.reference.id()).collect()
    }

    #[test]
    fn test_commit_is_atomic() {
        let store = seeded();
        let result = store.commit(vec![
            ("users/d".to_string(), PendingWrite::Create(MapValue::default())),
            ("users/a".to_string(), PendingWrite::Create(MapValue::default())),
        ]);

        assert!(matches!(result, Err(FirestoreError::Status(ref s)) if s.code() == tonic::Code::AlreadyExists));
        assert!(store.fields("users/d").is_none());
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_update_requires_existing_document() {
        let store = seeded();
        let result = store.commit(vec![(
            "users/zz".to_string(),
            PendingWrite::Update(vec![Update::set("age", 1i64)], None),
        )]);
        assert!(matches!(result, Err(FirestoreError::Status(ref s)) if s.code() == tonic::Code::NotFound));
    }

    #[test]
    fn test_update_ops() {
        let store = seeded();
        store
            .commit(vec![(
                "users/a".to_string(),
                PendingWrite::Update(
                    vec![
                        Update::increment("age", 1i64),
                        Update::set("address.city", "Paris"),
                        Update::delete("team"),
                    ],
                    None,
                ),
            )])
            .unwrap();

        let fields = store.fields("users/a").unwrap();
        assert_eq!(field_at(&fields, "age").and_then(Value::as_i64), Some(31));
        assert_eq!(field_at(&fields, "address.city").and_then(Value::as_str), Some("Paris"));
        assert!(field_at(&fields, "team").is_none());
    }

    #[test]
    fn test_merge_keeps_other_fields() {
        let store = seeded();
        store
            .commit(vec![(
                "users/a".to_string(),
                PendingWrite::Set(map_value([("age", 31i64.into())]), SetOptions::MergeAll),
            )])
            .unwrap();

        let fields = store.fields("users/a").unwrap();
        assert_eq!(field_at(&fields, "age").and_then(Value::as_i64), Some(31));
        assert_eq!(field_at(&fields, "team").and_then(Value::as_str), Some("red"));
    }

    #[test]
    fn test_query_filters_orders_and_limits() {
        let store = seeded();
        let query = QueryState {
            collection: "users".to_string(),
            filters: vec![("team".to_string(), Operator::Equal, "red".into())],
            orders: vec![("age".to_string(), Direction::Descending)],
            ..Default::default()
        };
        assert_eq!(ids(&store.run_query(&query).unwrap()), vec!["c", "a"]);

        let limited = QueryState {
            filters: vec![],
            orders: vec![("age".to_string(), Direction::Ascending)],
            limit: Some(2),
            limit_to_last: true,
            ..query.clone()
        };
        assert_eq!(ids(&store.run_query(&limited).unwrap()), vec!["a", "c"]);

        let cursor = QueryState {
            filters: vec![],
            orders: vec![("age".to_string(), Direction::Ascending)],
            start: Some((vec![30i64.into()], false)),
            ..query
        };
        assert_eq!(ids(&store.run_query(&cursor).unwrap()), vec!["c"]);
    }

    #[test]
    fn test_offset_counts_from_the_end_with_limit_to_last() {
        let store = MemoryStore::default();
        for n in 1..=4i64 {
            store
                .commit(vec![(format!("items/i{}", n), PendingWrite::Create(map_value([("n", n.into())])))])
                .unwrap();
        }
        let query = QueryState {
            collection: "items".to_string(),
            orders: vec![("n".to_string(), Direction::Ascending)],
            offset: 1,
            limit: Some(2),
            limit_to_last: true,
            ..Default::default()
        };
        assert_eq!(ids(&store.run_query(&query).unwrap()), vec!["i2", "i3"]);

        let from_start = QueryState {
            limit_to_last: false,
            ..query
        };
        assert_eq!(ids(&store.run_query(&from_start).unwrap()), vec!["i2", "i3"]);
    }

    #[test]
    fn test_range_filters_skip_nan() {
        let store = MemoryStore::default();
        store
            .commit(vec![
                ("values/nan".to_string(), PendingWrite::Create(map_value([("x", f64::NAN.into())]))),
                ("values/one".to_string(), PendingWrite::Create(map_value([("x", 1.0.into())]))),
            ])
            .unwrap();
        let filtered = |op: Operator| {
            let query = QueryState {
                collection: "values".to_string(),
                filters: vec![("x".to_string(), op, 5.0.into())],
                ..Default::default()
            };
            ids(&store.run_query(&query).unwrap())
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        };

        assert_eq!(filtered(Operator::LessThan), vec!["one"]);
        assert_eq!(filtered(Operator::LessThanOrEqual), vec!["one"]);
        assert!(filtered(Operator::GreaterThan).is_empty());
        assert!(filtered(Operator::GreaterThanOrEqual).is_empty());
    }

    #[test]
    fn test_commit_after_reads_aborts_on_changed_document() {
        let store = seeded();
        let read = store.get("users/a").unwrap().update_time;
        store
            .commit(vec![(
                "users/a".to_string(),
                PendingWrite::Update(vec![Update::set("age", 99i64)], None),
            )])
            .unwrap();

        let write = || vec![("users/b".to_string(), PendingWrite::Delete(None))];
        let result = store.commit_after_reads(write(), &[("users/a".to_string(), read)]);
        assert!(result.is_err_and(|e| e.is_aborted()));
        assert!(store.fields("users/b").is_some());

        let fresh = store.get("users/a").unwrap().update_time;
        store
            .commit_after_reads(write(), &[("users/a".to_string(), fresh), ("users/zz".to_string(), None)])
            .unwrap();
        assert!(store.fields("users/b").is_none());
    }

    #[test]
    fn test_collection_ids() {
        let store = seeded();
        assert_eq!(store.collection_ids(None).unwrap(), vec!["users"]);
        assert_eq!(store.collection_ids(Some("users/a")).unwrap(), vec!["orders"]);
        assert!(store.collection_ids(Some("users/b")).unwrap().is_empty());
    }

    #[test]
    fn test_aggregate() {
        let store = seeded();
        let docs = store
            .run_query(&QueryState {
                collection: "users".to_string(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(aggregate(&docs, &AggregationKind::Count).as_i64(), Some(3));
        assert_eq!(aggregate(&docs, &AggregationKind::Sum("age".to_string())).as_i64(), Some(90));
        assert_eq!(aggregate(&docs, &AggregationKind::Avg("age".to_string())).as_f64(), Some(30.0));
    }

    #[test]
    fn test_integer_sum_overflow_becomes_double() {
        let store = MemoryStore::default();
        store
            .commit(vec![
                ("big/a".to_string(), PendingWrite::Create(map_value([("n", i64::MAX.into())]))),
                ("big/b".to_string(), PendingWrite::Create(map_value([("n", 1i64.into())]))),
            ])
            .unwrap();
        let docs = store
            .run_query(&QueryState {
                collection: "big".to_string(),
                ..Default::default()
            })
            .unwrap();

        let sum = aggregate(&docs, &AggregationKind::Sum("n".to_string()));
        assert!(sum.as_i64().is_none());
        assert_eq!(sum.as_f64(), Some(i64::MAX as f64 + 1.0));
    }
}
