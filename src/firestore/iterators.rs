//! Pull-based iterators over query results and collection listings
//!
//! Both iterators fetch lazily: no RPC is made until the first call to
//! `next`. After the last item, or after `stop`, `next` keeps returning
//! `Ok(None)`.

use std::collections::VecDeque;

use tonic::Streaming;
use tracing::debug;

use super::client::Client;
use super::collection_reference::CollectionReference;
use super::document_snapshot::DocumentSnapshot;
use super::query::Query;
use super::value::proto;
use crate::error::Result;

use proto::google::firestore::v1::{ListCollectionIdsRequest, RunQueryResponse};

enum DocumentState {
    NotStarted,
    Streaming(Streaming<RunQueryResponse>),
    /// Results read up front (`limit_to_last` reverses them client-side)
    Buffered(std::vec::IntoIter<DocumentSnapshot>),
    Done,
}

/// Iterator over the documents matched by a query
pub struct DocumentIterator {
    query: Query,
    transaction: Option<Vec<u8>>,
    state: DocumentState,
}

impl DocumentIterator {
    pub(crate) fn new(query: Query, transaction: Option<Vec<u8>>) -> Self {
        Self {
            query,
            transaction,
            state: DocumentState::NotStarted,
        }
    }

    /// Next matching document, or `None` when the results are exhausted
    ///
    /// An error ends the iteration.
    pub async fn next(&mut self) -> Result<Option<DocumentSnapshot>> {
        let result = self.advance().await;
        if result.is_err() {
            self.state = DocumentState::Done;
        }
        result
    }

    async fn advance(&mut self) -> Result<Option<DocumentSnapshot>> {
        loop {
            match self.state {
                DocumentState::NotStarted => {
                    let request = self.query.run_query_request(self.transaction.clone())?;
                    debug!(parent = %request.parent, "RunQuery");
                    let stream = self.query.client.grpc()?.run_query(request).await?.into_inner();
                    self.state = DocumentState::Streaming(stream);

                    if self.query.is_limit_to_last() {
                        let mut documents = Vec::new();
                        while let Some(doc) = self.read_streamed().await? {
                            documents.push(doc);
                        }
                        documents.reverse();
                        self.state = DocumentState::Buffered(documents.into_iter());
                    }
                }
                DocumentState::Streaming(_) => {
                    let next = self.read_streamed().await?;
                    if next.is_none() {
                        self.state = DocumentState::Done;
                    }
                    return Ok(next);
                }
                DocumentState::Buffered(ref mut documents) => {
                    let next = documents.next();
                    if next.is_none() {
                        self.state = DocumentState::Done;
                    }
                    return Ok(next);
                }
                DocumentState::Done => return Ok(None),
            }
        }
    }

    /// Read the stream until the next response carrying a document
    async fn read_streamed(&mut self) -> Result<Option<DocumentSnapshot>> {
        let DocumentState::Streaming(stream) = &mut self.state else {
            return Ok(None);
        };
        while let Some(response) = stream.message().await? {
            if let Some(document) = response.document {
                let client = &self.query.client;
                let reference = client.doc(client.relative_path(&document.name).to_string());
                return Ok(Some(DocumentSnapshot::found(
                    reference,
                    document,
                    response.read_time,
                )));
            }
        }
        Ok(None)
    }

    /// Read every remaining document, then stop
    pub async fn get_all(&mut self) -> Result<Vec<DocumentSnapshot>> {
        let mut documents = Vec::new();
        while let Some(doc) = self.next().await? {
            documents.push(doc);
        }
        self.stop();
        Ok(documents)
    }

    /// Release the server stream; later calls to `next` return `None`
    pub fn stop(&mut self) {
        self.state = DocumentState::Done;
    }
}

/// Iterator over the collections under a document or the database root
pub struct CollectionIterator {
    client: Client,
    /// Full resource name listed
    parent_name: String,
    /// Relative path of the parent document, `None` at the root
    parent_path: Option<String>,
    ids: VecDeque<String>,
    page_token: Option<String>,
    done: bool,
}

impl CollectionIterator {
    pub(crate) fn new(client: Client, parent_name: String, parent_path: Option<String>) -> Self {
        Self {
            client,
            parent_name,
            parent_path,
            ids: VecDeque::new(),
            page_token: None,
            done: false,
        }
    }

    /// Next collection, or `None` when every page has been read
    pub async fn next(&mut self) -> Result<Option<CollectionReference>> {
        while self.ids.is_empty() && !self.done {
            if let Err(e) = self.fetch_page().await {
                self.stop();
                return Err(e);
            }
        }

        Ok(self.ids.pop_front().map(|id| {
            let path = match &self.parent_path {
                Some(parent) => format!("{}/{}", parent, id),
                None => id,
            };
            self.client.collection(path)
        }))
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let request = ListCollectionIdsRequest {
            parent: self.parent_name.clone(),
            page_token: self.page_token.take().unwrap_or_default(),
            ..Default::default()
        };
        debug!(parent = %request.parent, "ListCollectionIds");

        let response = self.client.grpc()?.list_collection_ids(request).await?.into_inner();
        self.ids.extend(response.collection_ids);
        if response.next_page_token.is_empty() {
            self.done = true;
        } else {
            self.page_token = Some(response.next_page_token);
        }
        Ok(())
    }

    /// Drop buffered results; later calls to `next` return `None`
    pub fn stop(&mut self) {
        self.ids.clear();
        self.page_token = None;
        self.done = true;
    }
}

#[cfg(test)]
mod tests {
    use crate::error::FirestoreError;
    use crate::firestore::client::test_client;

    #[tokio::test]
    async fn test_stopped_document_iterator_is_exhausted() {
        let mut iter = test_client().collection("users").documents();
        iter.stop();
        iter.stop();

        assert!(iter.next().await.unwrap().is_none());
        assert!(iter.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_document_iterator_error_ends_iteration() {
        let client = test_client();
        client.close().unwrap();

        let mut iter = client.collection("users").documents();
        assert!(matches!(iter.next().await, Err(FirestoreError::ClientClosed)));
        assert!(iter.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stopped_collection_iterator_is_exhausted() {
        let client = test_client();
        let mut iter = client.doc("users/alice").collections();
        iter.stop();
        iter.stop();
        assert!(iter.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_query_reports_on_first_next() {
        let mut iter = test_client().collection("users").limit_to_last(1).documents();
        assert!(matches!(iter.next().await, Err(FirestoreError::InvalidArgument(_))));
    }
}
