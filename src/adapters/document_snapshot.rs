use serde::de::DeserializeOwned;

use crate::error::{FirestoreError, Result};
use crate::firestore::value::from_map_value;
use crate::firestore::{self, DocumentReference, MapValue, Timestamp, Value};

/// Point-in-time read of one document
pub trait DocumentSnapshot: Send + Sync {
    /// All fields, `None` when the document does not exist
    fn data(&self) -> Option<MapValue>;

    /// Value at a dot-separated field path
    fn data_at(&self, path: &str) -> Result<Value>;

    /// Whether the document existed at read time
    fn exists(&self) -> bool;

    /// Creation time of the document
    fn create_time(&self) -> Option<Timestamp>;

    /// Time of the document's last change
    fn update_time(&self) -> Option<Timestamp>;

    /// Time the read was performed
    fn read_time(&self) -> Option<Timestamp>;

    /// Reference of the document that was read
    fn reference(&self) -> DocumentReference;
}

/// Typed decoding for every [`DocumentSnapshot`]
pub trait DocumentSnapshotExt: DocumentSnapshot {
    /// Decode the document's fields into `T`
    ///
    /// Fails with `NotFound` when the document does not exist.
    fn data_to<T: DeserializeOwned>(&self) -> Result<T> {
        match self.data() {
            Some(data) => from_map_value(&data),
            None => Err(FirestoreError::NotFound(self.reference().path().to_string())),
        }
    }
}

impl<S: DocumentSnapshot + ?Sized> DocumentSnapshotExt for S {}

/// [`DocumentSnapshot`] backed by a [`firestore::DocumentSnapshot`]
#[derive(Debug, Clone)]
pub struct DocumentSnapshotAdapter {
    snapshot: firestore::DocumentSnapshot,
}

impl DocumentSnapshotAdapter {
    /// Wrap `snapshot`
    pub fn new(snapshot: firestore::DocumentSnapshot) -> Self {
        Self { snapshot }
    }

    /// The wrapped snapshot
    pub fn into_inner(self) -> firestore::DocumentSnapshot {
        self.snapshot
    }
}

impl DocumentSnapshot for DocumentSnapshotAdapter {
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

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::firestore::client::test_client;
    use crate::firestore::value::map_value;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        name: String,
        age: i64,
    }

    fn snapshot(data: Option<MapValue>) -> DocumentSnapshotAdapter {
        DocumentSnapshotAdapter::new(firestore::DocumentSnapshot {
            reference: test_client().doc("users/u1"),
            data,
            create_time: Some(Timestamp::new(10, 0).unwrap()),
            update_time: Some(Timestamp::new(20, 0).unwrap()),
            read_time: Some(Timestamp::new(30, 0).unwrap()),
        })
    }

    #[tokio::test]
    async fn test_accessors_forward() {
        let snap = snapshot(Some(map_value([
            ("name", "Ada".into()),
            ("age", 36i64.into()),
            ("address", Value::from(map_value([("city", "London".into())]))),
        ])));

        assert!(snap.exists());
        assert_eq!(snap.data_at("address.city").unwrap().as_str(), Some("London"));
        assert!(matches!(snap.data_at("email"), Err(FirestoreError::FieldNotFound(_))));
        assert_eq!(snap.create_time().map(|t| t.seconds), Some(10));
        assert_eq!(snap.update_time().map(|t| t.seconds), Some(20));
        assert_eq!(snap.read_time().map(|t| t.seconds), Some(30));
        assert_eq!(snap.reference().path(), "users/u1");
    }

    #[tokio::test]
    async fn test_data_to_through_trait_object() {
        let snap: Box<dyn DocumentSnapshot> = Box::new(snapshot(Some(map_value([
            ("name", "Ada".into()),
            ("age", 36i64.into()),
        ]))));

        let user: User = snap.data_to().unwrap();
        assert_eq!(
            user,
            User {
                name: "Ada".to_string(),
                age: 36
            }
        );
    }

    #[tokio::test]
    async fn test_missing_document() {
        let snap = snapshot(None);

        assert!(!snap.exists());
        assert!(snap.data().is_none());
        assert!(matches!(snap.data_to::<User>(), Err(FirestoreError::NotFound(_))));
    }
}
