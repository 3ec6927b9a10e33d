use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{AGGREGATE_COLLECTION, CLEAN_COLLECTION, RAW_COLLECTION};
use crate::storage::Document;

/// Raw brewery record as delivered by the ingestion collaborator (bronze layer).
///
/// Only field names are enforced. Everything but `id` may be missing, and any
/// JSON scalar in the other fields is kept as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub brewery_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub street: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address_1: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address_2: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address_3: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub state_province: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub county_province: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub postal_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub longitude: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub latitude: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub website_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub updated_at: Option<String>,
}

impl RawRecord {
    /// Bare record with only an identifier, handy for building fixtures.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            brewery_type: None,
            street: None,
            address_1: None,
            address_2: None,
            address_3: None,
            city: None,
            state: None,
            state_province: None,
            county_province: None,
            postal_code: None,
            country: None,
            longitude: None,
            latitude: None,
            phone: None,
            website_url: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Accept any JSON value and keep it as text; null stays absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Data quality flags computed for every clean record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub has_coordinates: bool,
    pub has_website: bool,
    pub has_phone: bool,
    /// Fraction of the five key fields present (0.0 to 1.0)
    pub completeness_score: f64,
}

/// Normalized, quality-scored brewery (silver layer), keyed by the raw `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub id: String,
    pub name: Option<String>,
    pub brewery_type: Option<String>,
    pub address_1: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub state_province: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub phone: Option<String>,
    pub website_url: Option<String>,
    pub data_quality: QualityMetrics,
    pub ingestion_date: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Sample brewery carried on an aggregate for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleBrewery {
    pub name: Option<String>,
    pub city: Option<String>,
}

/// Composite gold key. Every component may be null and still forms a group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub country: Option<String>,
    pub state: Option<String>,
    pub brewery_type: Option<String>,
}

impl GroupKey {
    /// Stable string form used as the store key. JSON keeps a null component
    /// distinct from the literal string "null".
    pub fn store_key(&self) -> String {
        serde_json::json!([self.country, self.state, self.brewery_type]).to_string()
    }
}

/// Grouped summary over clean records (gold layer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub country: Option<String>,
    pub state: Option<String>,
    pub brewery_type: Option<String>,
    pub total_breweries: u64,
    pub breweries_with_website: u64,
    pub breweries_with_phone: u64,
    pub breweries_with_coordinates: u64,
    /// Percentages rounded to two decimals
    pub website_coverage: f64,
    pub phone_coverage: f64,
    pub coordinates_coverage: f64,
    pub avg_completeness_score: f64,
    pub example_breweries: Vec<ExampleBrewery>,
    /// `YYYY-MM-DD` in UTC
    pub aggregation_date: String,
}

impl AggregateRecord {
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            country: self.country.clone(),
            state: self.state.clone(),
            brewery_type: self.brewery_type.clone(),
        }
    }
}

/// One row of the top-states report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCount {
    pub state: Option<String>,
    pub total_breweries: u64,
}

/// One row of the brewery type distribution report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDistribution {
    pub brewery_type: Option<String>,
    pub count: u64,
    /// Distinct states this type appears in, a missing state counting as one
    pub states_covered: u64,
}

/// Mapping projection of a clean record that has coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub name: Option<String>,
    pub brewery_type: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub website_url: Option<String>,
}

/// Document counts per layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LayerCounts {
    pub raw: u64,
    pub clean: u64,
    pub aggregated: u64,
}

impl Document for RawRecord {
    const COLLECTION: &'static str = RAW_COLLECTION;
}

impl Document for CleanRecord {
    const COLLECTION: &'static str = CLEAN_COLLECTION;
}

impl Document for AggregateRecord {
    const COLLECTION: &'static str = AGGREGATE_COLLECTION;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_record_accepts_numeric_and_missing_coordinates() {
        let raw: RawRecord = serde_json::from_value(serde_json::json!({
            "id": "b-1",
            "name": "Numeric Coords",
            "longitude": -84.4137736,
            "latitude": null,
            "unexpected": "ignored"
        }))
        .unwrap();

        assert_eq!(raw.longitude.as_deref(), Some("-84.4137736"));
        assert_eq!(raw.latitude, None);
        assert_eq!(raw.city, None);
    }

    #[test]
    fn raw_record_keeps_non_string_scalars_as_text() {
        let raw: RawRecord = serde_json::from_value(serde_json::json!({
            "id": "b-2",
            "name": 1919,
            "postal_code": 45202,
            "phone": 5135551234u64,
            "website_url": false
        }))
        .unwrap();

        assert_eq!(raw.name.as_deref(), Some("1919"));
        assert_eq!(raw.postal_code.as_deref(), Some("45202"));
        assert_eq!(raw.phone.as_deref(), Some("5135551234"));
        assert_eq!(raw.website_url.as_deref(), Some("false"));
    }

    #[test]
    fn group_key_distinguishes_null_from_null_string() {
        let null_state = GroupKey {
            country: Some("US".into()),
            state: None,
            brewery_type: Some("micro".into()),
        };
        let literal_state = GroupKey {
            state: Some("null".into()),
            ..null_state.clone()
        };
        assert_ne!(null_state.store_key(), literal_state.store_key());
        assert_eq!(null_state.store_key(), r#"["US",null,"micro"]"#);
    }
}
