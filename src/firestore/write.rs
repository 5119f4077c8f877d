//! Write options and their encoding into `google.firestore.v1.Write`
//!
//! Shared by document references, write batches, transactions and the bulk
//! writer, so a given call encodes to the same mutation whichever path sends it.

use std::collections::HashMap;

use super::timestamp::Timestamp;
use super::value::{proto, MapValue, Value, ValueType};
use crate::error::{FirestoreError, Result};

use proto::google::firestore::v1 as firestore_proto;
use firestore_proto::document_transform::field_transform::{ServerValue, TransformType};
use firestore_proto::document_transform::FieldTransform;
use firestore_proto::precondition::ConditionType;
use firestore_proto::write::Operation;
use firestore_proto::{Document, DocumentMask, Write};

/// How `set` treats fields already stored in the document
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SetOptions {
    /// Replace the whole document
    #[default]
    Overwrite,
    /// Merge every field present in the data, leave the rest untouched
    MergeAll,
    /// Merge only the listed dot-separated field paths
    Merge(Vec<String>),
}

/// Condition the stored document must meet for a write to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The document must (or must not) exist
    Exists(bool),
    /// The document must have been last updated at exactly this time
    UpdateTime(Timestamp),
}

/// What an [`Update`] does to its field
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Store the value
    Set(Value),
    /// Remove the field
    Delete,
    /// Store the commit time as set by the server
    ServerTimestamp,
    /// Add the numeric value to the stored one
    Increment(Value),
}

/// A single field change applied by `update`
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Dot-separated field path
    pub path: String,
    /// Change applied at that path
    pub op: UpdateOp,
}

impl Update {
    /// Set `path` to `value`
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            op: UpdateOp::Set(value.into()),
        }
    }

    /// Remove the field at `path`
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            op: UpdateOp::Delete,
        }
    }

    /// Set `path` to the server's commit time
    pub fn server_timestamp(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            op: UpdateOp::ServerTimestamp,
        }
    }

    /// Add `by` to the number stored at `path`
    pub fn increment(path: impl Into<String>, by: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            op: UpdateOp::Increment(by.into()),
        }
    }
}

/// Outcome of one applied write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Time the document was last updated; `None` when the write was a no-op
    /// delete of a missing document
    pub update_time: Option<Timestamp>,
}

impl From<firestore_proto::WriteResult> for WriteResult {
    fn from(result: firestore_proto::WriteResult) -> Self {
        Self {
            update_time: result.update_time.map(Timestamp::from),
        }
    }
}

impl From<Precondition> for firestore_proto::Precondition {
    fn from(precondition: Precondition) -> Self {
        let condition_type = match precondition {
            Precondition::Exists(exists) => ConditionType::Exists(exists),
            Precondition::UpdateTime(ts) => ConditionType::UpdateTime(ts.to_proto()),
        };
        Self {
            condition_type: Some(condition_type),
        }
    }
}

fn document(name: String, fields: HashMap<String, Value>) -> Operation {
    Operation::Update(Document {
        name,
        fields,
        ..Default::default()
    })
}

pub(crate) fn create_write(name: String, data: MapValue) -> Write {
    Write {
        operation: Some(document(name, data.fields)),
        current_document: Some(Precondition::Exists(false).into()),
        ..Default::default()
    }
}

pub(crate) fn set_write(name: String, data: MapValue, options: &SetOptions) -> Write {
    let update_mask = match options {
        SetOptions::Overwrite => None,
        SetOptions::MergeAll => Some(DocumentMask {
            field_paths: leaf_paths(&data),
        }),
        SetOptions::Merge(paths) => Some(DocumentMask {
            field_paths: paths.clone(),
        }),
    };
    Write {
        operation: Some(document(name, data.fields)),
        update_mask,
        ..Default::default()
    }
}

pub(crate) fn update_write(
    name: String,
    updates: Vec<Update>,
    precondition: Option<Precondition>,
) -> Result<Write> {
    if updates.is_empty() {
        return Err(FirestoreError::InvalidArgument(
            "update requires at least one field".to_string(),
        ));
    }

    let mut fields = HashMap::new();
    let mut field_paths = Vec::new();
    let mut update_transforms = Vec::new();
    for Update { path, op } in updates {
        match op {
            UpdateOp::Set(value) => {
                insert_at_path(&mut fields, &path, value);
                field_paths.push(path);
            }
            UpdateOp::Delete => field_paths.push(path),
            UpdateOp::ServerTimestamp => update_transforms.push(FieldTransform {
                field_path: path,
                transform_type: Some(TransformType::SetToServerValue(
                    ServerValue::RequestTime as i32,
                )),
            }),
            UpdateOp::Increment(by) => update_transforms.push(FieldTransform {
                field_path: path,
                transform_type: Some(TransformType::Increment(by)),
            }),
        }
    }

    Ok(Write {
        operation: Some(document(name, fields)),
        update_mask: Some(DocumentMask { field_paths }),
        update_transforms,
        current_document: Some(precondition.unwrap_or(Precondition::Exists(true)).into()),
        ..Default::default()
    })
}

pub(crate) fn delete_write(name: String, precondition: Option<Precondition>) -> Write {
    Write {
        operation: Some(Operation::Delete(name)),
        current_document: precondition.map(Into::into),
        ..Default::default()
    }
}

/// Every leaf field path of `data`; non-empty nested maps are descended into
fn leaf_paths(data: &MapValue) -> Vec<String> {
    let mut paths = Vec::new();
    for (key, value) in &data.fields {
        match value.as_map() {
            Some(nested) if !nested.fields.is_empty() => {
                paths.extend(
                    leaf_paths(nested)
                        .into_iter()
                        .map(|child| format!("{}.{}", key, child)),
                );
            }
            _ => paths.push(key.clone()),
        }
    }
    paths.sort();
    paths
}

fn insert_at_path(fields: &mut HashMap<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            fields.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = fields
                .entry(head.to_string())
                .or_insert_with(|| MapValue::default().into());
            if entry.as_map().is_none() {
                *entry = MapValue::default().into();
            }
            if let Some(ValueType::MapValue(nested)) = entry.value_type.as_mut() {
                insert_at_path(&mut nested.fields, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::value::{field_at, map_value};

    const NAME: &str = "projects/p/databases/(default)/documents/users/u1";

    #[test]
    fn test_create_requires_missing_document() {
        let write = create_write(NAME.into(), map_value([("a", 1i64.into())]));
        assert_eq!(
            write.current_document,
            Some(Precondition::Exists(false).into())
        );
        assert!(write.update_mask.is_none());
    }

    #[test]
    fn test_set_overwrite_has_no_mask() {
        let write = set_write(NAME.into(), map_value([("a", 1i64.into())]), &SetOptions::Overwrite);
        assert!(write.update_mask.is_none());
        assert!(write.current_document.is_none());
    }

    #[test]
    fn test_set_merge_all_masks_leaf_paths() {
        let nested = map_value([("city", Value::from("Paris")), ("zip", "75001".into())]);
        let data = map_value([("name", Value::from("Alice")), ("address", nested.into())]);

        let write = set_write(NAME.into(), data, &SetOptions::MergeAll);

        assert_eq!(
            write.update_mask.unwrap().field_paths,
            vec!["address.city", "address.zip", "name"]
        );
    }

    #[test]
    fn test_set_merge_uses_given_paths() {
        let data = map_value([("a", 1i64.into()), ("b", 2i64.into())]);
        let write = set_write(NAME.into(), data, &SetOptions::Merge(vec!["a".into()]));
        assert_eq!(write.update_mask.unwrap().field_paths, vec!["a"]);
    }

    #[test]
    fn test_update_encodes_each_op() {
        let write = update_write(
            NAME.into(),
            vec![
                Update::set("address.city", "Lyon"),
                Update::delete("nickname"),
                Update::server_timestamp("updated_at"),
                Update::increment("visits", 1i64),
            ],
            None,
        )
        .unwrap();

        assert_eq!(
            write.update_mask.as_ref().unwrap().field_paths,
            vec!["address.city", "nickname"]
        );
        assert_eq!(write.update_transforms.len(), 2);
        assert_eq!(write.current_document, Some(Precondition::Exists(true).into()));

        let Some(Operation::Update(doc)) = write.operation else {
            panic!("Expected Update operation");
        };
        let fields = MapValue { fields: doc.fields };
        assert_eq!(field_at(&fields, "address.city").and_then(Value::as_str), Some("Lyon"));
        assert!(field_at(&fields, "nickname").is_none());
    }

    #[test]
    fn test_update_keeps_explicit_precondition() {
        let ts = Timestamp::new(10, 0).unwrap();
        let write = update_write(
            NAME.into(),
            vec![Update::set("a", 1i64)],
            Some(Precondition::UpdateTime(ts)),
        )
        .unwrap();
        assert_eq!(write.current_document, Some(Precondition::UpdateTime(ts).into()));
    }

    #[test]
    fn test_update_without_fields_is_rejected() {
        let result = update_write(NAME.into(), vec![], None);
        assert!(matches!(result, Err(FirestoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_delete_write() {
        let write = delete_write(NAME.into(), Some(Precondition::Exists(true)));
        assert_eq!(write.operation, Some(Operation::Delete(NAME.to_string())));
        assert_eq!(write.current_document, Some(Precondition::Exists(true).into()));
    }
}
