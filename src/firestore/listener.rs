//! Real-time listeners over the `Listen` bidirectional stream
//!
//! A listener adds one target (a query or a single document) to a `Listen`
//! stream and folds the document changes the server sends into a local view.
//! A snapshot of that view is produced each time the server marks it
//! consistent: the target is `CURRENT` and a `NO_CHANGE` target change
//! arrives with no target ids. Transient stream failures reconnect with the
//! last resume token.

use std::cmp::Ordering;
use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Streaming;
use tracing::{debug, warn};

use super::client::Client;
use super::document_reference::DocumentReference;
use super::document_snapshot::DocumentSnapshot;
use super::query::{Direction, Query, DOCUMENT_ID};
use super::query_snapshot::{DocumentChange, DocumentChangeKind, QuerySnapshot};
use super::timestamp::Timestamp;
use super::value::{compare_values, field_at, proto, Value};
use crate::error::{FirestoreError, Result};

use proto::google::firestore::v1 as firestore_proto;
use firestore_proto::listen_request::TargetChange as ListenTargetChange;
use firestore_proto::listen_response::ResponseType;
use firestore_proto::target::{DocumentsTarget, ResumeType, TargetType};
use firestore_proto::target_change::TargetChangeType;
use firestore_proto::{Document, ListenRequest, ListenResponse, Target, TargetChange};

const WATCH_TARGET_ID: i32 = 0x676f;

/// Consecutive reconnects tolerated before a transient error is returned
const MAX_RECONNECTS: u32 = 5;

struct ConsistentPoint {
    read_time: Option<prost_types::Timestamp>,
}

/// State of one listen target
struct Watch {
    client: Client,
    target: Option<TargetType>,
    /// Reported by the first `next` when the target could not be built
    target_error: Option<FirestoreError>,
    /// Kept alive so the server keeps the stream open
    requests: Option<mpsc::Sender<ListenRequest>>,
    stream: Option<Streaming<ListenResponse>>,
    resume_token: Vec<u8>,
    current: bool,
    /// Documents as of the last consistent point, keyed by resource name
    docs: HashMap<String, Document>,
    /// Changes received since; `None` marks a deletion
    pending: HashMap<String, Option<Document>>,
    emitted: bool,
    reconnects: u32,
    stopped: bool,
}

impl Watch {
    fn new(client: Client, target: Result<TargetType>) -> Self {
        let (target, target_error) = match target {
            Ok(target) => (Some(target), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            client,
            target,
            target_error,
            requests: None,
            stream: None,
            resume_token: Vec::new(),
            current: false,
            docs: HashMap::new(),
            pending: HashMap::new(),
            emitted: false,
            reconnects: 0,
            stopped: false,
        }
    }

    async fn next_consistent(&mut self) -> Result<Option<ConsistentPoint>> {
        loop {
            if self.stopped {
                return Ok(None);
            }
            if self.stream.is_none() {
                if let Err(e) = self.open().await {
                    self.stop();
                    return Err(e);
                }
            }
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };

            let response = match stream.message().await {
                Ok(Some(response)) => response,
                Ok(None) => {
                    debug!("Listen stream closed by server");
                    self.stop();
                    return Ok(None);
                }
                Err(status) => {
                    let error = FirestoreError::from(status);
                    if error.is_retryable() && self.reconnects < MAX_RECONNECTS {
                        self.reconnects += 1;
                        warn!(attempt = self.reconnects, error = %error, "Listen stream failed, reconnecting");
                        self.disconnect();
                        continue;
                    }
                    self.stop();
                    return Err(error);
                }
            };
            self.reconnects = 0;

            match response.response_type {
                Some(ResponseType::TargetChange(change)) => match self.on_target_change(change) {
                    Ok(Some(point)) => return Ok(Some(point)),
                    Ok(None) => {}
                    Err(e) => {
                        self.stop();
                        return Err(e);
                    }
                },
                Some(ResponseType::DocumentChange(change)) => {
                    if let Some(document) = change.document {
                        if change.target_ids.contains(&WATCH_TARGET_ID) {
                            self.pending.insert(document.name.clone(), Some(document));
                        } else if change.removed_target_ids.contains(&WATCH_TARGET_ID) {
                            self.pending.insert(document.name, None);
                        }
                    }
                }
                Some(ResponseType::DocumentDelete(delete)) => {
                    self.pending.insert(delete.document, None);
                }
                Some(ResponseType::DocumentRemove(remove)) => {
                    self.pending.insert(remove.document, None);
                }
                Some(ResponseType::Filter(filter)) => {
                    if filter.count as usize != self.projected_len() {
                        debug!(expected = filter.count, "Existence filter mismatch, relistening");
                        self.resume_token.clear();
                        self.reset_docs();
                        self.disconnect();
                    }
                }
                None => {}
            }
        }
    }

    async fn open(&mut self) -> Result<()> {
        if let Some(e) = self.target_error.take() {
            return Err(e);
        }
        let Some(target_type) = self.target.clone() else {
            return Err(FirestoreError::internal("listen target missing"));
        };
        let mut grpc = self.client.grpc()?;

        let target = Target {
            target_id: WATCH_TARGET_ID,
            target_type: Some(target_type),
            resume_type: (!self.resume_token.is_empty())
                .then(|| ResumeType::ResumeToken(self.resume_token.clone())),
            ..Default::default()
        };
        let request = ListenRequest {
            database: self.client.database_path().to_string(),
            target_change: Some(ListenTargetChange::AddTarget(target)),
            ..Default::default()
        };

        let (tx, rx) = mpsc::channel(1);
        tx.send(request)
            .await
            .map_err(|_| FirestoreError::internal("listen request channel closed"))?;
        debug!(resume = !self.resume_token.is_empty(), "Listen");
        let stream = grpc.listen(ReceiverStream::new(rx)).await?.into_inner();

        self.requests = Some(tx);
        self.stream = Some(stream);
        self.current = false;
        Ok(())
    }

    fn on_target_change(&mut self, change: TargetChange) -> Result<Option<ConsistentPoint>> {
        let change_type = change.target_change_type();
        if let Some(cause) = change.cause {
            return Err(tonic::Status::new(tonic::Code::from(cause.code), cause.message).into());
        }

        match change_type {
            TargetChangeType::NoChange => {
                if change.target_ids.is_empty() && self.current {
                    return Ok(self.consistent_point(change.read_time, change.resume_token));
                }
            }
            TargetChangeType::Add => {}
            TargetChangeType::Remove => {
                return Err(FirestoreError::internal("listen target removed by server"));
            }
            TargetChangeType::Current => self.current = true,
            TargetChangeType::Reset => self.reset_docs(),
        }
        Ok(None)
    }

    /// Apply pending changes; `None` if nothing changed since the last point
    fn consistent_point(
        &mut self,
        read_time: Option<prost_types::Timestamp>,
        resume_token: Vec<u8>,
    ) -> Option<ConsistentPoint> {
        if !resume_token.is_empty() {
            self.resume_token = resume_token;
        }

        let mut changed = false;
        for (name, update) in self.pending.drain() {
            match update {
                Some(document) => {
                    changed |= self
                        .docs
                        .get(&name)
                        .map_or(true, |old| old.update_time != document.update_time);
                    self.docs.insert(name, document);
                }
                None => changed |= self.docs.remove(&name).is_some(),
            }
        }

        if self.emitted && !changed {
            return None;
        }
        self.emitted = true;
        Some(ConsistentPoint { read_time })
    }

    /// Mark every known document deleted until the server sends it again
    fn reset_docs(&mut self) {
        self.pending = self.docs.keys().map(|name| (name.clone(), None)).collect();
    }

    fn projected_len(&self) -> usize {
        let mut len = self.docs.len();
        for (name, update) in &self.pending {
            match (self.docs.contains_key(name), update.is_some()) {
                (false, true) => len += 1,
                (true, false) => len -= 1,
                _ => {}
            }
        }
        len
    }

    fn disconnect(&mut self) {
        self.stream = None;
        self.requests = None;
        self.current = false;
        self.pending.clear();
    }

    fn stop(&mut self) {
        self.disconnect();
        self.stopped = true;
    }
}

/// Stream of snapshots of a query's result set
pub struct QuerySnapshotIterator {
    query: Query,
    watch: Watch,
    previous: Vec<DocumentSnapshot>,
}

impl QuerySnapshotIterator {
    pub(crate) fn new(query: Query) -> Self {
        let target = query.query_target().map(TargetType::Query);
        Self {
            watch: Watch::new(query.client.clone(), target),
            query,
            previous: Vec::new(),
        }
    }

    /// Wait for the next snapshot
    ///
    /// The first call returns the current result set; later calls return once
    /// it has changed. `None` after `stop` or when the server ends the stream.
    pub async fn next(&mut self) -> Result<Option<QuerySnapshot>> {
        let Some(point) = self.watch.next_consistent().await? else {
            return Ok(None);
        };

        let client = &self.query.client;
        let mut documents: Vec<DocumentSnapshot> = self
            .watch
            .docs
            .values()
            .map(|doc| {
                let reference = client.doc(client.relative_path(&doc.name).to_string());
                DocumentSnapshot::found(reference, doc.clone(), point.read_time.clone())
            })
            .collect();
        let orders = self.query.orders();
        documents.sort_by(|a, b| query_order(orders, a, b));
        if let Some(limit) = self.query.limit_value() {
            let limit = usize::try_from(limit).unwrap_or(0);
            if self.query.is_limit_to_last() {
                let skip = documents.len().saturating_sub(limit);
                documents.drain(..skip);
            } else {
                documents.truncate(limit);
            }
        }

        let changes = diff(&self.previous, &documents);
        self.previous = documents.clone();

        Ok(Some(QuerySnapshot {
            documents,
            changes,
            read_time: point.read_time.map(Timestamp::from),
        }))
    }

    /// Close the listen stream; later calls to `next` return `None`
    pub fn stop(&mut self) {
        self.watch.stop();
    }
}

/// Stream of snapshots of a single document
pub struct DocumentSnapshotIterator {
    reference: DocumentReference,
    watch: Watch,
}

impl DocumentSnapshotIterator {
    pub(crate) fn new(reference: DocumentReference) -> Self {
        let target = TargetType::Documents(DocumentsTarget {
            documents: vec![reference.name()],
        });
        Self {
            watch: Watch::new(reference.client.clone(), Ok(target)),
            reference,
        }
    }

    /// Wait for the next state of the document
    ///
    /// A deleted or never-created document yields a snapshot with
    /// `exists() == false`.
    pub async fn next(&mut self) -> Result<Option<DocumentSnapshot>> {
        let Some(point) = self.watch.next_consistent().await? else {
            return Ok(None);
        };

        let snapshot = match self.watch.docs.get(&self.reference.name()) {
            Some(doc) => DocumentSnapshot::found(self.reference.clone(), doc.clone(), point.read_time),
            None => DocumentSnapshot::missing(self.reference.clone(), point.read_time),
        };
        Ok(Some(snapshot))
    }

    /// Close the listen stream; later calls to `next` return `None`
    pub fn stop(&mut self) {
        self.watch.stop();
    }
}

fn query_order(orders: &[(String, Direction)], a: &DocumentSnapshot, b: &DocumentSnapshot) -> Ordering {
    let null = Value::null();
    for (path, direction) in orders {
        let ord = if path == DOCUMENT_ID {
            compare_paths(a.reference.path(), b.reference.path())
        } else {
            let lookup = |doc: &DocumentSnapshot| {
                doc.data
                    .as_ref()
                    .and_then(|data| field_at(data, path))
                    .cloned()
                    .unwrap_or_else(|| null.clone())
            };
            compare_values(&lookup(a), &lookup(b))
        };
        let ord = if *direction == Direction::Descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    let ord = compare_paths(a.reference.path(), b.reference.path());
    match orders.last() {
        Some((_, Direction::Descending)) => ord.reverse(),
        _ => ord,
    }
}

fn compare_paths(a: &str, b: &str) -> Ordering {
    a.split('/').cmp(b.split('/'))
}

fn diff(old: &[DocumentSnapshot], new: &[DocumentSnapshot]) -> Vec<DocumentChange> {
    let position = |docs: &[DocumentSnapshot]| -> HashMap<String, usize> {
        docs.iter()
            .enumerate()
            .map(|(i, doc)| (doc.reference.path().to_string(), i))
            .collect()
    };
    let old_positions = position(old);
    let new_positions = position(new);

    let mut changes = Vec::new();
    for (i, doc) in old.iter().enumerate() {
        if !new_positions.contains_key(doc.reference.path()) {
            changes.push(DocumentChange {
                kind: DocumentChangeKind::Removed,
                document: doc.clone(),
                old_index: Some(i),
                new_index: None,
            });
        }
    }
    for (i, doc) in new.iter().enumerate() {
        let kind = match old_positions.get(doc.reference.path()) {
            None => DocumentChangeKind::Added,
            Some(&j) if old[j].update_time != doc.update_time => DocumentChangeKind::Modified,
            Some(_) => continue,
        };
        changes.push(DocumentChange {
            kind,
            document: doc.clone(),
            old_index: old_positions.get(doc.reference.path()).copied(),
            new_index: Some(i),
        });
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::client::test_client;
    use crate::firestore::value::map_value;

    fn proto_ts(seconds: i64) -> prost_types::Timestamp {
        prost_types::Timestamp { seconds, nanos: 0 }
    }

    fn document(client: &Client, path: &str, age: i64, updated: i64) -> Document {
        Document {
            name: client.resource_name(path),
            fields: map_value([("age", Value::from(age))]).fields,
            update_time: Some(proto_ts(updated)),
            ..Default::default()
        }
    }

    fn change(change_type: TargetChangeType, target_ids: Vec<i32>) -> TargetChange {
        TargetChange {
            target_change_type: change_type as i32,
            target_ids,
            read_time: Some(proto_ts(100)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_consistent_point_requires_current() {
        let client = test_client();
        let mut watch = Watch::new(client.clone(), Err(FirestoreError::internal("unused")));
        watch.pending.insert(
            client.resource_name("users/a"),
            Some(document(&client, "users/a", 1, 1)),
        );

        let global_no_change = change(TargetChangeType::NoChange, vec![]);
        assert!(watch.on_target_change(global_no_change.clone()).unwrap().is_none());

        watch.on_target_change(change(TargetChangeType::Current, vec![WATCH_TARGET_ID])).unwrap();
        let point = watch.on_target_change(global_no_change.clone()).unwrap();
        assert!(point.is_some());
        assert_eq!(watch.docs.len(), 1);

        // Nothing changed since the last point
        assert!(watch.on_target_change(global_no_change).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_and_removal() {
        let client = test_client();
        let mut watch = Watch::new(client.clone(), Err(FirestoreError::internal("unused")));
        watch.current = true;
        for path in ["users/a", "users/b"] {
            watch.pending.insert(client.resource_name(path), Some(document(&client, path, 1, 1)));
        }
        watch.on_target_change(change(TargetChangeType::NoChange, vec![])).unwrap();
        assert_eq!(watch.docs.len(), 2);

        watch.on_target_change(change(TargetChangeType::Reset, vec![WATCH_TARGET_ID])).unwrap();
        assert_eq!(watch.projected_len(), 0);
        watch.pending.insert(
            client.resource_name("users/a"),
            Some(document(&client, "users/a", 1, 1)),
        );
        assert_eq!(watch.projected_len(), 1);

        watch.on_target_change(change(TargetChangeType::NoChange, vec![])).unwrap();
        assert_eq!(watch.docs.len(), 1);
    }

    #[tokio::test]
    async fn test_target_change_cause_is_an_error() {
        let client = test_client();
        let mut watch = Watch::new(client, Err(FirestoreError::internal("unused")));
        let mut failed = change(TargetChangeType::Remove, vec![WATCH_TARGET_ID]);
        failed.cause = Some(proto::google::rpc::Status {
            code: tonic::Code::PermissionDenied as i32,
            message: "denied".into(),
            ..Default::default()
        });

        let err = watch.on_target_change(failed).err().unwrap();
        assert_eq!(err.code(), Some(tonic::Code::PermissionDenied));
    }

    #[tokio::test]
    async fn test_diff_reports_changes() {
        let client = test_client();
        let snap = |path: &str, updated: i64| {
            DocumentSnapshot::found(client.doc(path), document(&client, path, 1, updated), None)
        };
        let old = vec![snap("users/a", 1), snap("users/b", 1)];
        let new = vec![snap("users/b", 2), snap("users/c", 1)];

        let changes = diff(&old, &new);
        let kinds: Vec<_> = changes.iter().map(|c| (c.kind, c.document.id().to_string())).collect();
        assert_eq!(
            kinds,
            vec![
                (DocumentChangeKind::Removed, "a".to_string()),
                (DocumentChangeKind::Modified, "b".to_string()),
                (DocumentChangeKind::Added, "c".to_string()),
            ]
        );
        assert_eq!(changes[1].old_index, Some(1));
        assert_eq!(changes[1].new_index, Some(0));
    }

    #[tokio::test]
    async fn test_query_order_uses_fields_then_name() {
        let client = test_client();
        let snap = |path: &str, age: i64| {
            DocumentSnapshot::found(client.doc(path), document(&client, path, age, 1), None)
        };
        let mut docs = vec![snap("users/c", 30), snap("users/a", 40), snap("users/b", 30)];

        let orders = vec![("age".to_string(), Direction::Descending)];
        docs.sort_by(|a, b| query_order(&orders, a, b));

        let ids: Vec<_> = docs.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_stopped_listeners_end() {
        let client = test_client();
        let mut query_iter = client.collection("users").snapshots();
        query_iter.stop();
        query_iter.stop();
        assert!(query_iter.next().await.unwrap().is_none());

        let mut doc_iter = client.doc("users/a").snapshots();
        doc_iter.stop();
        doc_iter.stop();
        assert!(doc_iter.next().await.unwrap().is_none());
    }
}
