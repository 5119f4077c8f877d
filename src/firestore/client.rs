//! gRPC-based Firestore client
//!
//! `Client` owns the channel to the Firestore backend. References, queries,
//! batches and transactions created from it share that channel through a
//! cheap `Arc` clone.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::Request;
use tracing::{debug, warn};

use super::bulk_writer::BulkWriter;
use super::collection_reference::CollectionReference;
use super::document_reference::DocumentReference;
use super::document_snapshot::DocumentSnapshot;
use super::iterators::CollectionIterator;
use super::query::Query;
use super::settings::Settings;
use super::transaction::{Transaction, TransactionOptions};
use super::value::proto;
use super::write::WriteResult;
use super::write_batch::WriteBatch;
use crate::error::{FirestoreError, Result};

use proto::google::firestore::v1 as firestore_proto;
use firestore_proto::batch_get_documents_request::ConsistencySelector;
use firestore_proto::batch_get_documents_response::Result as BatchGetResult;
use firestore_proto::firestore_client::FirestoreClient as GrpcStub;
use firestore_proto::transaction_options::{Mode, ReadOnly, ReadWrite};
use firestore_proto::{
    BatchGetDocumentsRequest, BeginTransactionRequest, CommitRequest, RollbackRequest, Write,
};

/// Generated gRPC stub with the auth/routing interceptor applied
pub(crate) type GrpcClient = GrpcStub<InterceptedService<Channel, FirestoreInterceptor>>;

/// Firestore database client
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    project_id: String,
    database_id: String,
    database_path: String,
    /// `None` for a detached client
    grpc_client: Option<GrpcClient>,
    closed: AtomicBool,
}

/// gRPC interceptor adding the bearer token and the routing header
#[derive(Clone)]
pub(crate) struct FirestoreInterceptor {
    access_token: Option<String>,
    database_path: String,
}

impl Interceptor for FirestoreInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, tonic::Status> {
        if let Some(ref token) = self.access_token {
            let bearer = format!("Bearer {}", token)
                .parse()
                .map_err(|_| tonic::Status::unauthenticated("Invalid access token"))?;
            request.metadata_mut().insert("authorization", bearer);
        }

        let routing = format!("database={}", self.database_path)
            .parse()
            .map_err(|_| tonic::Status::invalid_argument("Invalid database path"))?;
        request.metadata_mut().insert("x-goog-request-params", routing);

        Ok(request)
    }
}

impl Client {
    /// Connect to Firestore, establishing the channel before returning
    pub async fn connect(settings: Settings) -> Result<Self> {
        let channel = endpoint(&settings)?.connect().await?;
        debug!(host = %settings.host, database = %settings.database_path(), "Connected to Firestore");
        Ok(Self::from_channel(channel, &settings))
    }

    /// Create a client whose channel connects on the first RPC
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect_lazy(settings: Settings) -> Result<Self> {
        let channel = endpoint(&settings)?.connect_lazy();
        Ok(Self::from_channel(channel, &settings))
    }

    /// Create a client over an existing channel
    pub fn from_channel(channel: Channel, settings: &Settings) -> Self {
        let interceptor = FirestoreInterceptor {
            access_token: settings.access_token.clone(),
            database_path: settings.database_path(),
        };
        Self::build(settings, Some(GrpcStub::with_interceptor(channel, interceptor)))
    }

    /// Create a client with no connection
    ///
    /// It builds references, queries and resource names like any other
    /// client, but every RPC fails with `ClientClosed`. In-memory fakes use it
    /// to hand out real `DocumentReference` values.
    pub fn detached(settings: &Settings) -> Self {
        Self::build(settings, None)
    }

    fn build(settings: &Settings, grpc_client: Option<GrpcClient>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                project_id: settings.project_id.clone(),
                database_id: settings.database_id.clone(),
                database_path: settings.database_path(),
                grpc_client,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Get the project ID
    pub fn project_id(&self) -> &str {
        &self.inner.project_id
    }

    /// Get the database ID
    pub fn database_id(&self) -> &str {
        &self.inner.database_id
    }

    /// `projects/{project}/databases/{database}`
    pub fn database_path(&self) -> &str {
        &self.inner.database_path
    }

    /// `projects/{project}/databases/{database}/documents`
    pub(crate) fn documents_root(&self) -> String {
        format!("{}/documents", self.inner.database_path)
    }

    /// Full resource name of a path relative to the documents root
    pub(crate) fn resource_name(&self, path: &str) -> String {
        format!("{}/documents/{}", self.inner.database_path, path)
    }

    /// Path relative to the documents root, given a full resource name
    pub(crate) fn relative_path<'a>(&self, name: &'a str) -> &'a str {
        let prefix = self.documents_root();
        name.strip_prefix(prefix.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(name)
    }

    /// A stub for one RPC; fails once the client is closed
    pub(crate) fn grpc(&self) -> Result<GrpcClient> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(FirestoreError::ClientClosed);
        }
        self.inner.grpc_client.clone().ok_or(FirestoreError::ClientClosed)
    }

    /// Reference to the collection at `path` (e.g. "users" or "users/u1/orders")
    pub fn collection(&self, path: impl Into<String>) -> CollectionReference {
        CollectionReference::new(self.clone(), path.into())
    }

    /// Reference to the document at `path` (e.g. "users/u1")
    pub fn doc(&self, path: impl Into<String>) -> DocumentReference {
        DocumentReference::new(self.clone(), path.into())
    }

    /// Query over every collection or subcollection named `collection_id`
    pub fn collection_group(&self, collection_id: impl Into<String>) -> Query {
        Query::new(self.clone(), self.documents_root(), collection_id.into(), true)
    }

    /// Create a new write batch
    pub fn batch(&self) -> WriteBatch {
        WriteBatch::new(self.clone())
    }

    /// Create a bulk writer
    pub fn bulk_writer(&self) -> BulkWriter {
        BulkWriter::new(self.clone())
    }

    /// Iterate over the root collections of the database
    pub fn collections(&self) -> CollectionIterator {
        CollectionIterator::new(self.clone(), self.documents_root(), None)
    }

    /// Read several documents at once
    ///
    /// Snapshots come back in the order of `refs`; missing documents yield
    /// snapshots with `exists() == false`.
    pub async fn get_all(&self, refs: &[DocumentReference]) -> Result<Vec<DocumentSnapshot>> {
        self.batch_get(refs, None).await
    }

    pub(crate) async fn batch_get(
        &self,
        refs: &[DocumentReference],
        consistency_selector: Option<ConsistencySelector>,
    ) -> Result<Vec<DocumentSnapshot>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }

        let request = BatchGetDocumentsRequest {
            database: self.inner.database_path.clone(),
            documents: refs.iter().map(DocumentReference::name).collect(),
            consistency_selector,
            ..Default::default()
        };
        debug!(count = refs.len(), "BatchGetDocuments");

        let mut stream = self.grpc()?.batch_get_documents(request).await?.into_inner();
        let mut by_name = HashMap::with_capacity(refs.len());
        while let Some(response) = stream.message().await? {
            match response.result {
                Some(BatchGetResult::Found(document)) => {
                    let reference = self.doc(self.relative_path(&document.name).to_string());
                    by_name.insert(
                        document.name.clone(),
                        DocumentSnapshot::found(reference, document, response.read_time),
                    );
                }
                Some(BatchGetResult::Missing(name)) => {
                    let reference = self.doc(self.relative_path(&name).to_string());
                    by_name.insert(name, DocumentSnapshot::missing(reference, response.read_time));
                }
                None => {}
            }
        }

        refs.iter()
            .map(|r| {
                by_name.get(&r.name()).cloned().ok_or_else(|| {
                    FirestoreError::InvalidData(format!("no result for document {}", r.path()))
                })
            })
            .collect()
    }

    /// Run `update_fn` inside a transaction
    ///
    /// The function receives a fresh [`Transaction`] on every attempt. Its
    /// queued writes are committed when it returns `Ok`; on `Err` the
    /// transaction is rolled back and the error returned. Attempts that fail
    /// with `ABORTED` (contention) are retried up to `options.max_attempts`.
    pub async fn run_transaction<F, Fut>(&self, update_fn: F, options: TransactionOptions) -> Result<()>
    where
        F: Fn(Transaction) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let max_attempts = options.max_attempts.max(1);
        let mut retry_transaction: Option<Vec<u8>> = None;

        for attempt in 1..=max_attempts {
            let transaction_id = self
                .begin_transaction(&options, retry_transaction.take())
                .await?;
            let transaction = Transaction::new(self.clone(), transaction_id.clone(), options.read_only);

            let outcome = match update_fn(transaction.clone()).await {
                Ok(()) => self
                    .commit(transaction.take_writes(), transaction_id.clone())
                    .await
                    .map(|_| ()),
                Err(e) => {
                    if let Err(rollback_err) = self.rollback(&transaction_id).await {
                        warn!(error = %rollback_err, "Transaction rollback failed");
                    }
                    Err(e)
                }
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(e) if e.is_aborted() && attempt < max_attempts => {
                    warn!(attempt, error = %e, "Transaction aborted, retrying");
                    retry_transaction = Some(transaction_id);
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::internal("transaction made no attempt"))
    }

    async fn begin_transaction(
        &self,
        options: &TransactionOptions,
        retry_transaction: Option<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let mode = if options.read_only {
            Mode::ReadOnly(ReadOnly::default())
        } else {
            Mode::ReadWrite(ReadWrite {
                retry_transaction: retry_transaction.unwrap_or_default(),
            })
        };
        let request = BeginTransactionRequest {
            database: self.inner.database_path.clone(),
            options: Some(firestore_proto::TransactionOptions { mode: Some(mode) }),
        };
        debug!(read_only = options.read_only, "BeginTransaction");

        let response = self.grpc()?.begin_transaction(request).await?.into_inner();
        Ok(response.transaction)
    }

    /// Send `writes` in one Commit RPC, inside `transaction` if non-empty
    pub(crate) async fn commit(&self, writes: Vec<Write>, transaction: Vec<u8>) -> Result<Vec<WriteResult>> {
        let request = CommitRequest {
            database: self.inner.database_path.clone(),
            writes,
            transaction,
        };
        debug!(writes = request.writes.len(), "Commit");

        let response = self.grpc()?.commit(request).await?.into_inner();
        Ok(response.write_results.into_iter().map(WriteResult::from).collect())
    }

    async fn rollback(&self, transaction: &[u8]) -> Result<()> {
        let request = RollbackRequest {
            database: self.inner.database_path.clone(),
            transaction: transaction.to_vec(),
        };
        self.grpc()?.rollback(request).await?;
        Ok(())
    }

    /// Close the client; later RPCs through it fail with `ClientClosed`
    ///
    /// In-flight calls and open iterators keep their own channel handle and
    /// run to completion.
    pub fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!(database = %self.inner.database_path, "Closed Firestore client");
        }
        Ok(())
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("project_id", &self.inner.project_id)
            .field("database_id", &self.inner.database_id)
            .finish()
    }
}

fn endpoint(settings: &Settings) -> Result<Endpoint> {
    let mut endpoint = Endpoint::from_shared(settings.endpoint_uri())?
        .timeout(settings.timeout)
        .connect_timeout(settings.connect_timeout);
    if settings.ssl_enabled {
        let tls_config = ClientTlsConfig::new()
            .with_webpki_roots()
            .domain_name(settings.domain_name());
        endpoint = endpoint.tls_config(tls_config)?;
    }
    Ok(endpoint)
}

#[cfg(test)]
pub(crate) fn test_client() -> Client {
    let settings = Settings::emulator("test-project", "localhost:8080");
    Client::connect_lazy(settings).expect("lazy channel")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paths() {
        let client = test_client();
        assert_eq!(client.database_path(), "projects/test-project/databases/(default)");
        assert_eq!(
            client.resource_name("users/u1"),
            "projects/test-project/databases/(default)/documents/users/u1"
        );
        assert_eq!(
            client.relative_path("projects/test-project/databases/(default)/documents/users/u1"),
            "users/u1"
        );
        assert_eq!(client.relative_path("elsewhere/x"), "elsewhere/x");
    }

    #[tokio::test]
    async fn test_close_rejects_later_rpcs() {
        let client = test_client();
        assert!(client.grpc().is_ok());

        client.close().unwrap();
        client.close().unwrap();

        assert!(client.is_closed());
        assert!(matches!(client.grpc(), Err(FirestoreError::ClientClosed)));
    }

    #[tokio::test]
    async fn test_get_all_with_no_refs_skips_rpc() {
        let client = test_client();
        client.close().unwrap();
        // No RPC is attempted, so the closed client is not consulted.
        let snapshots = client.get_all(&[]).await.unwrap();
        assert!(snapshots.is_empty());
    }

    #[test]
    fn test_detached_client_builds_references_only() {
        let client = Client::detached(&Settings::new("offline"));
        assert_eq!(client.doc("users/u1").name(), "projects/offline/databases/(default)/documents/users/u1");
        assert!(!client.is_closed());
        assert!(matches!(client.grpc(), Err(FirestoreError::ClientClosed)));
    }

    #[test]
    fn test_interceptor_adds_headers() {
        let mut interceptor = FirestoreInterceptor {
            access_token: Some("owner".to_string()),
            database_path: "projects/p/databases/(default)".to_string(),
        };
        let request = interceptor.call(Request::new(())).unwrap();

        assert_eq!(request.metadata().get("authorization").unwrap(), "Bearer owner");
        assert_eq!(
            request.metadata().get("x-goog-request-params").unwrap(),
            "database=projects/p/databases/(default)"
        );
    }
}
