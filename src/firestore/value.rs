//! Firestore field values
//!
//! Document fields are the protobuf `Value` and `MapValue` messages of
//! `google.firestore.v1`. Rust data crosses into and out of them through
//! `serde_json`, so any `Serialize`/`Deserialize` type can be stored.

use std::cmp::Ordering;
use std::collections::HashMap;

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FirestoreError, Result};

/// Generated `google.firestore.v1` protobuf and gRPC types
#[allow(clippy::all, missing_docs)]
pub mod proto {
    include!(concat!(env!("OUT_DIR"), "/proto.rs"));
}

/// A single Firestore field value
pub use proto::google::firestore::v1::Value;

/// A map of field values; a document's fields are one of these
pub use proto::google::firestore::v1::MapValue;

/// An array of field values
pub use proto::google::firestore::v1::ArrayValue;

/// The variants a `Value` can hold
pub use proto::google::firestore::v1::value::ValueType;

impl Value {
    /// The null value
    pub fn null() -> Self {
        Self {
            value_type: Some(ValueType::NullValue(0)),
        }
    }

    /// A reference to another document by its full resource name
    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            value_type: Some(ValueType::ReferenceValue(name.into())),
        }
    }

    /// A byte string
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            value_type: Some(ValueType::BytesValue(bytes.into())),
        }
    }

    /// Check for the null value (an unset value counts as null)
    pub fn is_null(&self) -> bool {
        matches!(self.value_type, None | Some(ValueType::NullValue(_)))
    }

    /// Check for a double holding NaN
    pub fn is_nan(&self) -> bool {
        matches!(self.value_type, Some(ValueType::DoubleValue(d)) if d.is_nan())
    }

    /// Integer content, if this is an integer value
    pub fn as_i64(&self) -> Option<i64> {
        match self.value_type {
            Some(ValueType::IntegerValue(i)) => Some(i),
            _ => None,
        }
    }

    /// Numeric content as a double (integers are widened)
    pub fn as_f64(&self) -> Option<f64> {
        match self.value_type {
            Some(ValueType::DoubleValue(d)) => Some(d),
            Some(ValueType::IntegerValue(i)) => Some(i as f64),
            _ => None,
        }
    }

    /// String content, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match &self.value_type {
            Some(ValueType::StringValue(s)) => Some(s),
            _ => None,
        }
    }

    /// Boolean content, if this is a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self.value_type {
            Some(ValueType::BooleanValue(b)) => Some(b),
            _ => None,
        }
    }

    /// Map content, if this is a map value
    pub fn as_map(&self) -> Option<&MapValue> {
        match &self.value_type {
            Some(ValueType::MapValue(map)) => Some(map),
            _ => None,
        }
    }

    /// Array elements, if this is an array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match &self.value_type {
            Some(ValueType::ArrayValue(array)) => Some(&array.values),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self {
            value_type: Some(ValueType::BooleanValue(b)),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self {
            value_type: Some(ValueType::IntegerValue(i)),
        }
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        i64::from(i).into()
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self {
            value_type: Some(ValueType::DoubleValue(d)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self {
            value_type: Some(ValueType::StringValue(s)),
        }
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self {
            value_type: Some(ValueType::ArrayValue(ArrayValue { values })),
        }
    }
}

impl From<MapValue> for Value {
    fn from(map: MapValue) -> Self {
        Self {
            value_type: Some(ValueType::MapValue(map)),
        }
    }
}

/// Build a `MapValue` from `(field, value)` pairs
///
/// # Example
/// ```
/// use firestore_adapters::firestore::value::map_value;
///
/// let data = map_value([("name", "Alice".into()), ("age", 30i64.into())]);
/// assert_eq!(data.fields.len(), 2);
/// ```
pub fn map_value<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> MapValue {
    MapValue {
        fields: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
    }
}

/// Convert any serializable record into document fields
///
/// The record must serialize to a JSON object.
pub fn to_map_value<T: Serialize + ?Sized>(data: &T) -> Result<MapValue> {
    let json = serde_json::to_value(data)?;
    let serde_json::Value::Object(object) = json else {
        return Err(FirestoreError::InvalidArgument(
            "document data must serialize to a map".to_string(),
        ));
    };
    Ok(MapValue {
        fields: json_object_to_fields(object)?,
    })
}

/// Convert document fields into a deserializable record
pub fn from_map_value<T: DeserializeOwned>(map: &MapValue) -> Result<T> {
    Ok(serde_json::from_value(fields_to_json(&map.fields))?)
}

/// Convert a JSON value into a Firestore value
pub fn json_to_value(json: serde_json::Value) -> Result<Value> {
    let value_type = match json {
        serde_json::Value::Null => ValueType::NullValue(0),
        serde_json::Value::Bool(b) => ValueType::BooleanValue(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ValueType::IntegerValue(i)
            } else if n.is_u64() {
                return Err(FirestoreError::InvalidArgument(format!(
                    "integer {} overflows a signed 64-bit field",
                    n
                )));
            } else {
                ValueType::DoubleValue(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => ValueType::StringValue(s),
        serde_json::Value::Array(items) => ValueType::ArrayValue(ArrayValue {
            values: items
                .into_iter()
                .map(json_to_value)
                .collect::<Result<Vec<_>>>()?,
        }),
        serde_json::Value::Object(object) => ValueType::MapValue(MapValue {
            fields: json_object_to_fields(object)?,
        }),
    };
    Ok(Value {
        value_type: Some(value_type),
    })
}

fn json_object_to_fields(
    object: serde_json::Map<String, serde_json::Value>,
) -> Result<HashMap<String, Value>> {
    object
        .into_iter()
        .map(|(k, v)| Ok((k, json_to_value(v)?)))
        .collect()
}

/// Convert a Firestore value into JSON
///
/// Timestamps become RFC 3339 strings, bytes become base64 strings, geo
/// points become `{latitude, longitude}` objects and references become their
/// resource name.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match &value.value_type {
        Some(ValueType::NullValue(_)) | None => serde_json::Value::Null,
        Some(ValueType::BooleanValue(b)) => serde_json::Value::Bool(*b),
        Some(ValueType::IntegerValue(i)) => serde_json::json!(i),
        Some(ValueType::DoubleValue(d)) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(ValueType::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(ValueType::BytesValue(b)) => {
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
        Some(ValueType::ReferenceValue(r)) => serde_json::Value::String(r.clone()),
        Some(ValueType::TimestampValue(ts)) => {
            match chrono::DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32) {
                Some(dt) => serde_json::Value::String(dt.to_rfc3339()),
                None => serde_json::Value::Null,
            }
        }
        Some(ValueType::GeoPointValue(geo)) => serde_json::json!({
            "latitude": geo.latitude,
            "longitude": geo.longitude,
        }),
        Some(ValueType::ArrayValue(array)) => {
            serde_json::Value::Array(array.values.iter().map(value_to_json).collect())
        }
        Some(ValueType::MapValue(map)) => fields_to_json(&map.fields),
        // Pipeline-only expression values have no JSON form.
        #[allow(unreachable_patterns)]
        Some(_) => serde_json::Value::Null,
    }
}

fn fields_to_json(fields: &HashMap<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), value_to_json(v)))
            .collect(),
    )
}

/// Order two values the way Firestore orders query results
///
/// Values of different types sort by type: null, booleans, numbers,
/// timestamps, strings, bytes, references, geo points, arrays, maps. NaN
/// sorts before every other number.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (rank_a, rank_b) = (type_rank(a), type_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }

    match (&a.value_type, &b.value_type) {
        (Some(ValueType::BooleanValue(x)), Some(ValueType::BooleanValue(y))) => x.cmp(y),
        (Some(ValueType::IntegerValue(x)), Some(ValueType::IntegerValue(y))) => x.cmp(y),
        (Some(ValueType::TimestampValue(x)), Some(ValueType::TimestampValue(y))) => {
            (x.seconds, x.nanos).cmp(&(y.seconds, y.nanos))
        }
        (Some(ValueType::StringValue(x)), Some(ValueType::StringValue(y))) => x.cmp(y),
        (Some(ValueType::BytesValue(x)), Some(ValueType::BytesValue(y))) => x.cmp(y),
        (Some(ValueType::ReferenceValue(x)), Some(ValueType::ReferenceValue(y))) => {
            x.split('/').cmp(y.split('/'))
        }
        (Some(ValueType::GeoPointValue(x)), Some(ValueType::GeoPointValue(y))) => x
            .latitude
            .total_cmp(&y.latitude)
            .then(x.longitude.total_cmp(&y.longitude)),
        (Some(ValueType::ArrayValue(x)), Some(ValueType::ArrayValue(y))) => {
            compare_sequences(&x.values, &y.values)
        }
        (Some(ValueType::MapValue(x)), Some(ValueType::MapValue(y))) => {
            let mut keys_x: Vec<_> = x.fields.iter().collect();
            let mut keys_y: Vec<_> = y.fields.iter().collect();
            keys_x.sort_by(|l, r| l.0.cmp(r.0));
            keys_y.sort_by(|l, r| l.0.cmp(r.0));
            for ((kx, vx), (ky, vy)) in keys_x.iter().zip(keys_y.iter()) {
                let ord = kx.cmp(ky).then_with(|| compare_values(vx, vy));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            keys_x.len().cmp(&keys_y.len())
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            },
            _ => Ordering::Equal,
        },
    }
}

fn compare_sequences(x: &[Value], y: &[Value]) -> Ordering {
    for (vx, vy) in x.iter().zip(y.iter()) {
        let ord = compare_values(vx, vy);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    x.len().cmp(&y.len())
}

pub(crate) fn type_rank(value: &Value) -> u8 {
    match value.value_type {
        None | Some(ValueType::NullValue(_)) => 0,
        Some(ValueType::BooleanValue(_)) => 1,
        Some(ValueType::IntegerValue(_)) | Some(ValueType::DoubleValue(_)) => 2,
        Some(ValueType::TimestampValue(_)) => 3,
        Some(ValueType::StringValue(_)) => 4,
        Some(ValueType::BytesValue(_)) => 5,
        Some(ValueType::ReferenceValue(_)) => 6,
        Some(ValueType::GeoPointValue(_)) => 7,
        Some(ValueType::ArrayValue(_)) => 8,
        Some(ValueType::MapValue(_)) => 9,
        #[allow(unreachable_patterns)]
        Some(_) => 10,
    }
}

/// Look up a dot-separated field path (`address.city`) inside a map
pub fn field_at<'a>(map: &'a MapValue, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = map.fields.get(first)?;
    for segment in segments {
        current = current.as_map()?.fields.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct User {
        name: String,
        age: i64,
        tags: Vec<String>,
        score: f64,
        nickname: Option<String>,
    }

    #[test]
    fn test_record_converts_to_fields() {
        let user = User {
            name: "Alice".into(),
            age: 30,
            tags: vec!["admin".into()],
            score: 4.5,
            nickname: None,
        };

        let map = to_map_value(&user).unwrap();

        assert_eq!(map.fields["name"].as_str(), Some("Alice"));
        assert_eq!(map.fields["age"].as_i64(), Some(30));
        assert_eq!(map.fields["score"].as_f64(), Some(4.5));
        assert!(map.fields["nickname"].is_null());
        assert_eq!(map.fields["tags"].as_array().map(|a| a.len()), Some(1));

        let back: User = from_map_value(&map).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn test_non_object_record_is_rejected() {
        let result = to_map_value(&vec![1, 2, 3]);
        assert!(matches!(result, Err(FirestoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_u64_overflow_is_rejected() {
        let result = json_to_value(serde_json::json!(u64::MAX));
        assert!(matches!(result, Err(FirestoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_bytes_render_as_base64() {
        let json = value_to_json(&Value::bytes(vec![0xde, 0xad]));
        assert_eq!(json, serde_json::json!("3q0="));
    }

    #[test]
    fn test_field_at_walks_nested_maps() {
        let address = map_value([("city", Value::from("Paris"))]);
        let doc = map_value([("address", Value::from(address)), ("age", 3i64.into())]);

        assert_eq!(field_at(&doc, "address.city").and_then(Value::as_str), Some("Paris"));
        assert_eq!(field_at(&doc, "age").and_then(Value::as_i64), Some(3));
        assert!(field_at(&doc, "address.zip").is_none());
        assert!(field_at(&doc, "age.inner").is_none());
    }

    #[test]
    fn test_null_and_nan() {
        assert!(Value::null().is_null());
        assert!(Value::default().is_null());
        assert!(Value::from(f64::NAN).is_nan());
        assert!(!Value::from(1.0).is_nan());
    }

    #[test]
    fn test_value_ordering() {
        let ordered = [
            Value::null(),
            Value::from(false),
            Value::from(f64::NAN),
            Value::from(-1.5),
            Value::from(2i64),
            Value::from(2.5),
            Value::from("a"),
            Value::from("b"),
            Value::from(vec![Value::from(1i64)]),
            Value::from(map_value([("k", Value::from(1i64))])),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(compare_values(&pair[0], &pair[1]), Ordering::Less, "{:?}", pair);
        }
        assert_eq!(compare_values(&Value::from(2i64), &Value::from(2.0)), Ordering::Equal);
    }
}
