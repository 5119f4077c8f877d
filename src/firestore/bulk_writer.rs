//! Bulk writer: high-throughput, non-atomic writes
//!
//! Writes are queued and sent with `BatchWrite` in batches of at most
//! [`MAX_BATCH_SIZE`]. A batch is dispatched on a background task as soon as
//! it fills; [`BulkWriter::flush`] dispatches the remainder and waits for
//! every batch in flight. Each write succeeds or fails on its own, and its
//! outcome is delivered through the [`BulkWriterJob`] returned when it was
//! queued.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::client::Client;
use super::document_reference::DocumentReference;
use super::value::{proto, MapValue};
use super::write::{self, Precondition, SetOptions, Update, WriteResult};
use crate::error::{FirestoreError, Result};

use proto::google::firestore::v1::{BatchWriteRequest, Write};

/// Maximum number of writes sent in one `BatchWrite` call
pub const MAX_BATCH_SIZE: usize = 20;

pub(crate) type JobSender = oneshot::Sender<Result<WriteResult>>;

/// Queues writes and sends them in the background
///
/// Must be used from within a Tokio runtime. Cloning yields another handle to
/// the same writer.
#[derive(Clone)]
pub struct BulkWriter {
    inner: Arc<BulkWriterInner>,
}

struct BulkWriterInner {
    client: Client,
    state: Mutex<BulkState>,
}

#[derive(Default)]
struct BulkState {
    pending: Vec<(Write, JobSender)>,
    in_flight: Vec<JoinHandle<()>>,
    closed: bool,
}

/// Outcome of one write queued on a [`BulkWriter`]
#[derive(Debug)]
pub struct BulkWriterJob {
    result: oneshot::Receiver<Result<WriteResult>>,
}

impl BulkWriterJob {
    /// A job and the sender that resolves it
    pub(crate) fn pending() -> (JobSender, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { result: rx })
    }

    /// Wait for the write to be applied or rejected
    pub async fn results(self) -> Result<WriteResult> {
        self.result
            .await
            .map_err(|_| FirestoreError::internal("bulk writer dropped the write"))?
    }
}

impl BulkWriter {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            inner: Arc::new(BulkWriterInner {
                client,
                state: Mutex::new(BulkState::default()),
            }),
        }
    }

    /// Queue creation of `doc`
    pub fn create(&self, doc: &DocumentReference, data: MapValue) -> Result<BulkWriterJob> {
        self.enqueue(Ok(write::create_write(doc.name(), data)))
    }

    /// Queue a write of `doc`
    pub fn set(&self, doc: &DocumentReference, data: MapValue, options: SetOptions) -> Result<BulkWriterJob> {
        self.enqueue(Ok(write::set_write(doc.name(), data, &options)))
    }

    /// Queue field updates of `doc`
    pub fn update(
        &self,
        doc: &DocumentReference,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> Result<BulkWriterJob> {
        self.enqueue(write::update_write(doc.name(), updates, precondition))
    }

    /// Queue deletion of `doc`
    pub fn delete(&self, doc: &DocumentReference, precondition: Option<Precondition>) -> Result<BulkWriterJob> {
        self.enqueue(Ok(write::delete_write(doc.name(), precondition)))
    }

    fn enqueue(&self, write: Result<Write>) -> Result<BulkWriterJob> {
        let mut state = self.state();
        if state.closed {
            return Err(FirestoreError::BulkWriterClosed);
        }
        let write = write?;

        let (tx, job) = BulkWriterJob::pending();
        state.pending.push((write, tx));
        if state.pending.len() >= MAX_BATCH_SIZE {
            self.dispatch(&mut state);
        }
        Ok(job)
    }

    /// Send pending writes on a background task
    fn dispatch(&self, state: &mut BulkState) {
        if state.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut state.pending);
        let client = self.inner.client.clone();
        state.in_flight.retain(|handle| !handle.is_finished());
        state.in_flight.push(tokio::spawn(send_batch(client, batch)));
    }

    /// Send every queued write and wait until all writes in flight complete
    pub async fn flush(&self) {
        let handles = {
            let mut state = self.state();
            self.dispatch(&mut state);
            std::mem::take(&mut state.in_flight)
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Bulk writer batch task failed");
            }
        }
    }

    /// Flush, then reject any further writes
    ///
    /// Calling `end` again has no effect.
    pub async fn end(&self) {
        self.state().closed = true;
        self.flush().await;
    }

    fn state(&self) -> MutexGuard<'_, BulkState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for BulkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("BulkWriter")
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight.len())
            .field("closed", &state.closed)
            .finish()
    }
}

async fn send_batch(client: Client, batch: Vec<(Write, JobSender)>) {
    let (writes, senders): (Vec<Write>, Vec<JobSender>) = batch.into_iter().unzip();
    let request = BatchWriteRequest {
        database: client.database_path().to_string(),
        writes,
        ..Default::default()
    };
    debug!(writes = request.writes.len(), "BatchWrite");

    let response = match client.grpc() {
        Ok(mut grpc) => grpc.batch_write(request).await.map_err(FirestoreError::from),
        Err(e) => Err(e),
    };

    match response {
        Ok(response) => {
            let response = response.into_inner();
            for (i, sender) in senders.into_iter().enumerate() {
                let outcome = match response.status.get(i) {
                    Some(status) if status.code != tonic::Code::Ok as i32 => Err(FirestoreError::Status(
                        tonic::Status::new(tonic::Code::from(status.code), status.message.clone()),
                    )),
                    _ => Ok(response
                        .write_results
                        .get(i)
                        .cloned()
                        .map(WriteResult::from)
                        .unwrap_or_default()),
                };
                let _ = sender.send(outcome);
            }
        }
        Err(e) => {
            warn!(error = %e, "BatchWrite failed");
            for sender in senders {
                let _ = sender.send(Err(batch_error(&e)));
            }
        }
    }
}

/// Copy of a whole-batch failure for each job of the batch
fn batch_error(e: &FirestoreError) -> FirestoreError {
    match e {
        FirestoreError::Status(status) => FirestoreError::Status(status.clone()),
        FirestoreError::ClientClosed => FirestoreError::ClientClosed,
        other => FirestoreError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::client::test_client;
    use crate::firestore::value::map_value;

    #[tokio::test]
    async fn test_end_rejects_later_writes() {
        let client = test_client();
        let writer = client.bulk_writer();
        writer.end().await;
        writer.end().await;

        let result = writer.delete(&client.doc("users/a"), None);
        assert!(matches!(result, Err(FirestoreError::BulkWriterClosed)));
    }

    #[tokio::test]
    async fn test_invalid_write_is_rejected_at_enqueue() {
        let client = test_client();
        let writer = client.bulk_writer();

        let result = writer.update(&client.doc("users/a"), vec![], None);
        assert!(matches!(result, Err(FirestoreError::InvalidArgument(_))));
        assert!(writer.state().pending.is_empty());
    }

    #[tokio::test]
    async fn test_full_batch_is_dispatched() {
        let client = test_client();
        client.close().unwrap();
        let writer = client.bulk_writer();

        let jobs: Vec<_> = (0..MAX_BATCH_SIZE + 1)
            .map(|i| {
                writer
                    .set(&client.doc(format!("users/u{}", i)), map_value([("i", (i as i64).into())]), SetOptions::Overwrite)
                    .unwrap()
            })
            .collect();
        {
            let state = writer.state();
            assert_eq!(state.pending.len(), 1);
            assert_eq!(state.in_flight.len(), 1);
        }

        writer.flush().await;
        for job in jobs {
            assert!(matches!(job.results().await, Err(FirestoreError::ClientClosed)));
        }
    }
}
