//! Firestore WriteBatch type

use tracing::debug;

use super::client::Client;
use super::document_reference::DocumentReference;
use super::value::{proto, MapValue};
use super::write::{self, Precondition, SetOptions, Update, WriteResult};
use crate::error::{FirestoreError, Result};

use proto::google::firestore::v1::Write;

/// Writes applied atomically by a single commit
///
/// Each write method returns the batch for chaining. A write that cannot be
/// encoded is remembered and reported by [`commit`](Self::commit), which then
/// sends nothing.
///
/// # Example
/// ```no_run
/// # use firestore_adapters::firestore::{Client, Settings, SetOptions};
/// # use firestore_adapters::firestore::value::map_value;
/// # async fn example() -> firestore_adapters::Result<()> {
/// let client = Client::connect(Settings::from_env()?).await?;
/// let mut batch = client.batch();
/// batch
///     .set(&client.doc("cities/LA"), map_value([("name", "Los Angeles".into())]), SetOptions::Overwrite)
///     .delete(&client.doc("cities/SF"), None);
/// batch.commit().await?;
/// # Ok(())
/// # }
/// ```
pub struct WriteBatch {
    client: Client,
    writes: Vec<Write>,
    error: Option<FirestoreError>,
}

impl WriteBatch {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            writes: Vec::new(),
            error: None,
        }
    }

    /// Create `doc`; the commit fails if it already exists
    pub fn create(&mut self, doc: &DocumentReference, data: MapValue) -> &mut Self {
        self.push(Ok(write::create_write(doc.name(), data)))
    }

    /// Write `doc`, replacing or merging per `options`
    pub fn set(&mut self, doc: &DocumentReference, data: MapValue, options: SetOptions) -> &mut Self {
        self.push(Ok(write::set_write(doc.name(), data, &options)))
    }

    /// Apply field updates to `doc`
    pub fn update(
        &mut self,
        doc: &DocumentReference,
        updates: Vec<Update>,
        precondition: Option<Precondition>,
    ) -> &mut Self {
        self.push(write::update_write(doc.name(), updates, precondition))
    }

    /// Delete `doc`
    pub fn delete(&mut self, doc: &DocumentReference, precondition: Option<Precondition>) -> &mut Self {
        self.push(Ok(write::delete_write(doc.name(), precondition)))
    }

    fn push(&mut self, write: Result<Write>) -> &mut Self {
        match write {
            Ok(write) => self.writes.push(write),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Check if no write is queued
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply every queued write atomically
    ///
    /// Returns one result per write, in the order the writes were added.
    pub async fn commit(&mut self) -> Result<Vec<WriteResult>> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        if self.writes.is_empty() {
            return Err(FirestoreError::InvalidArgument(
                "cannot commit an empty write batch".to_string(),
            ));
        }
        debug!(writes = self.writes.len(), "Committing write batch");
        self.client.commit(std::mem::take(&mut self.writes), Vec::new()).await
    }
}

impl std::fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBatch")
            .field("writes", &self.writes.len())
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::client::test_client;
    use crate::firestore::value::map_value;

    #[tokio::test]
    async fn test_chained_writes_are_queued() {
        let client = test_client();
        let mut batch = client.batch();
        batch
            .create(&client.doc("users/a"), map_value([("n", 1i64.into())]))
            .set(&client.doc("users/b"), map_value([("n", 2i64.into())]), SetOptions::MergeAll)
            .update(&client.doc("users/c"), vec![Update::delete("n")], None)
            .delete(&client.doc("users/d"), None);

        assert_eq!(batch.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_batch_commit_is_rejected() {
        let client = test_client();
        let result = client.batch().commit().await;
        assert!(matches!(result, Err(FirestoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_invalid_write_is_reported_at_commit() {
        let client = test_client();
        client.close().unwrap();

        let mut batch = client.batch();
        batch
            .update(&client.doc("users/a"), vec![], None)
            .delete(&client.doc("users/b"), None);
        assert_eq!(batch.len(), 1);

        // The encoding error wins over the closed client.
        let result = batch.commit().await;
        assert!(matches!(result, Err(FirestoreError::InvalidArgument(_))));
    }
}
