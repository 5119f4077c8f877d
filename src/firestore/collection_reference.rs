//! Firestore CollectionReference type

use std::ops::Deref;

use rand::distributions::Alphanumeric;
use rand::Rng;

use super::client::Client;
use super::document_reference::DocumentReference;
use super::query::Query;
use super::value::MapValue;
use super::write::WriteResult;
use crate::error::Result;

const AUTO_ID_LENGTH: usize = 20;

/// Reference to a Firestore collection
///
/// A collection reference is also the query returning every document of the
/// collection; it dereferences to [`Query`] so filters, orderings and
/// iteration are available directly.
#[derive(Clone)]
pub struct CollectionReference {
    path: String,
    query: Query,
}

impl CollectionReference {
    pub(crate) fn new(client: Client, path: String) -> Self {
        let path = path.trim_matches('/').to_string();
        let (parent_name, collection_id) = match path.rsplit_once('/') {
            Some((parent, id)) => (client.resource_name(parent), id.to_string()),
            None => (client.documents_root(), path.clone()),
        };
        Self {
            query: Query::new(client, parent_name, collection_id, false),
            path,
        }
    }

    /// Collection ID (last segment of path)
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Path relative to the database root
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Document containing this collection, `None` for a root collection
    pub fn parent(&self) -> Option<DocumentReference> {
        self.path
            .rsplit_once('/')
            .map(|(parent, _)| DocumentReference::new(self.query.client.clone(), parent.to_string()))
    }

    /// Reference to the document `id` within this collection
    pub fn doc(&self, id: &str) -> DocumentReference {
        DocumentReference::new(self.query.client.clone(), format!("{}/{}", self.path, id))
    }

    /// Reference to a new document with an auto-generated ID
    pub fn new_doc(&self) -> DocumentReference {
        self.doc(&auto_id())
    }

    /// Create a document with an auto-generated ID holding `data`
    pub async fn add(&self, data: MapValue) -> Result<(DocumentReference, WriteResult)> {
        let doc = self.new_doc();
        let result = doc.create(data).await?;
        Ok((doc, result))
    }

    /// The query over every document of this collection
    pub fn query(&self) -> &Query {
        &self.query
    }
}

impl Deref for CollectionReference {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl std::fmt::Debug for CollectionReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionReference")
            .field("path", &self.path)
            .finish()
    }
}

impl PartialEq for CollectionReference {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.query.client.database_path() == other.query.client.database_path()
    }
}

fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LENGTH)
        .map(char::from)
        .collect()
}
