//! Geographic points

use serde::{Deserialize, Serialize};

use super::value::{proto, Value, ValueType};
use crate::error::FirestoreError;

/// Latitude/longitude pair stored as a Firestore geo point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees (range: -90 to 90)
    pub latitude: f64,

    /// Longitude in degrees (range: -180 to 180)
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new geographic point
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, FirestoreError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(FirestoreError::InvalidArgument(format!(
                "latitude must be in range [-90, 90], got {}",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(FirestoreError::InvalidArgument(format!(
                "longitude must be in range [-180, 180], got {}",
                longitude
            )));
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl From<GeoPoint> for Value {
    fn from(point: GeoPoint) -> Self {
        Value {
            value_type: Some(ValueType::GeoPointValue(proto::google::r#type::LatLng {
                latitude: point.latitude,
                longitude: point.longitude,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geopoint_bounds() {
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(-90.0, -180.0).is_ok());
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -181.0).is_err());
    }

    #[test]
    fn test_geopoint_to_value() {
        let value: Value = GeoPoint::new(37.7749, -122.4194).unwrap().into();

        match value.value_type {
            Some(ValueType::GeoPointValue(geo)) => {
                assert_eq!(geo.latitude, 37.7749);
                assert_eq!(geo.longitude, -122.4194);
            }
            _ => panic!("Expected GeoPointValue"),
        }
    }
}
