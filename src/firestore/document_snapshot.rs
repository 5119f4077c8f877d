//! Firestore DocumentSnapshot type

use serde::de::DeserializeOwned;

use super::document_reference::DocumentReference;
use super::timestamp::Timestamp;
use super::value::{self, proto, MapValue, Value};
use crate::error::{FirestoreError, Result};

/// Point-in-time read of a single document
///
/// A snapshot of a missing document has no data and reports
/// `exists() == false`; its read time is still set.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    /// Reference of the document that was read
    pub reference: DocumentReference,

    /// Document fields (None if document doesn't exist)
    pub data: Option<MapValue>,

    /// Time the document was created
    pub create_time: Option<Timestamp>,

    /// Time the document was last changed
    pub update_time: Option<Timestamp>,

    /// Time the read was performed
    pub read_time: Option<Timestamp>,
}

impl DocumentSnapshot {
    pub(crate) fn found(
        reference: DocumentReference,
        document: proto::google::firestore::v1::Document,
        read_time: Option<prost_types::Timestamp>,
    ) -> Self {
        Self {
            reference,
            data: Some(MapValue {
                fields: document.fields,
            }),
            create_time: document.create_time.map(Timestamp::from),
            update_time: document.update_time.map(Timestamp::from),
            read_time: read_time.map(Timestamp::from),
        }
    }

    pub(crate) fn missing(
        reference: DocumentReference,
        read_time: Option<prost_types::Timestamp>,
    ) -> Self {
        Self {
            reference,
            data: None,
            create_time: None,
            update_time: None,
            read_time: read_time.map(Timestamp::from),
        }
    }

    /// Check if document exists
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    /// Document ID
    pub fn id(&self) -> &str {
        self.reference.id()
    }

    /// Value at a dot-separated field path
    pub fn data_at(&self, path: &str) -> Result<Value> {
        let Some(data) = &self.data else {
            return Err(FirestoreError::NotFound(self.reference.path().to_string()));
        };
        value::field_at(data, path)
            .cloned()
            .ok_or_else(|| FirestoreError::FieldNotFound(path.to_string()))
    }

    /// Decode the document's fields into `T`
    pub fn data_to<T: DeserializeOwned>(&self) -> Result<T> {
        let Some(data) = &self.data else {
            return Err(FirestoreError::NotFound(self.reference.path().to_string()));
        };
        value::from_map_value(data)
    }
}
