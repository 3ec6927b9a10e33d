//! Silver layer: normalize and quality-score every raw record.

use chrono::{DateTime, Duration as TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{bounded, StageReport};
use crate::constants::{
    CLEAN_COLLECTION, COMPLETENESS_FIELD_COUNT, UNITED_STATES_LONG, UNITED_STATES_SHORT,
};
use crate::error::{PipelineError, Result, Stage};
use crate::observability::metrics;
use crate::storage::{Collection, Document, DocumentStore};
use crate::types::{CleanRecord, QualityMetrics, RawRecord};

/// Timestamps carried over from an existing clean record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CleanStamp {
    id: String,
    ingestion_date: Option<DateTime<Utc>>,
    last_updated: Option<DateTime<Utc>>,
}

impl Document for CleanStamp {
    const COLLECTION: &'static str = CLEAN_COLLECTION;
}

/// Reads the raw layer and re-materializes the clean layer in one bulk upsert.
pub struct SilverTransformer<'a> {
    store: &'a dyn DocumentStore,
    deadline: Duration,
}

impl<'a> SilverTransformer<'a> {
    pub fn new(store: &'a dyn DocumentStore, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    pub async fn transform_all(&self) -> Result<StageReport> {
        self.transform_all_at(Utc::now()).await
    }

    /// Transform with an explicit clock reading.
    ///
    /// Clean entries whose raw source disappeared are left in place.
    #[instrument(skip(self))]
    pub async fn transform_all_at(&self, now: DateTime<Utc>) -> Result<StageReport> {
        let run_id = Uuid::new_v4();
        let stage = Stage::Silver;
        info!(%run_id, "Running silver layer transformation");

        let raw_records = bounded(
            stage,
            self.deadline,
            Collection::<RawRecord>::new(self.store).find_all(),
            PipelineError::read,
        )
        .await?;
        metrics::silver::records_read(raw_records.len());

        let previous: HashMap<String, CleanStamp> = bounded(
            stage,
            self.deadline,
            Collection::<CleanStamp>::new(self.store).find_all(),
            PipelineError::read,
        )
        .await?
        .into_iter()
        .map(|stamp| (stamp.id.clone(), stamp))
        .collect();

        // One clean record per identifier; a repeated id keeps its last occurrence
        let mut by_id: BTreeMap<&str, &RawRecord> = BTreeMap::new();
        for raw in &raw_records {
            if by_id.insert(raw.id.as_str(), raw).is_some() {
                warn!(id = %raw.id, "Duplicate raw identifier, keeping last occurrence");
            }
        }

        let clean_records: Vec<CleanRecord> = by_id
            .into_values()
            .map(|raw| {
                let stamp = previous.get(&raw.id);
                let ingestion_date = stamp.and_then(|s| s.ingestion_date).unwrap_or(now);
                let last_updated = next_last_updated(stamp.and_then(|s| s.last_updated), now);
                let clean = normalize_record(raw, ingestion_date, last_updated);

                metrics::silver::completeness_recorded(clean.data_quality.completeness_score);
                if !clean.data_quality.has_coordinates {
                    metrics::silver::missing_coordinates();
                }
                clean
            })
            .collect();

        let outcome = bounded(
            stage,
            self.deadline,
            Collection::<CleanRecord>::new(self.store).upsert_many(&clean_records, |c| c.id.clone()),
            PipelineError::write,
        )
        .await?;
        metrics::silver::records_written(outcome.inserted, outcome.replaced);

        info!(
            %run_id,
            read = raw_records.len(),
            inserted = outcome.inserted,
            replaced = outcome.replaced,
            "Silver layer completed"
        );

        Ok(StageReport {
            run_id,
            stage,
            started_at: now,
            finished_at: Utc::now(),
            records_read: raw_records.len(),
            records_excluded: 0,
            inserted: outcome.inserted,
            replaced: outcome.replaced,
        })
    }
}

/// `last_updated` for this run: the clock reading, bumped past the previous
/// value when the clock has not moved forward.
fn next_last_updated(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if prev >= now => {
            debug!("Clock did not advance past previous last_updated, bumping");
            prev + TimeDelta::microseconds(1)
        }
        _ => now,
    }
}

/// Build the clean form of one raw record.
pub fn normalize_record(
    raw: &RawRecord,
    ingestion_date: DateTime<Utc>,
    last_updated: DateTime<Utc>,
) -> CleanRecord {
    let city = trim_field(raw.city.as_deref());
    let state = trim_field(raw.state.as_deref());
    let state_province = trim_field(raw.state_province.as_deref());
    let country = normalize_country(raw.country.as_deref());
    let longitude = parse_coordinate(raw.longitude.as_deref());
    let latitude = parse_coordinate(raw.latitude.as_deref());

    let data_quality = QualityMetrics {
        has_coordinates: longitude.is_some() && latitude.is_some(),
        has_website: raw.website_url.is_some(),
        has_phone: raw.phone.is_some(),
        completeness_score: completeness_score(&[
            raw.name.is_some(),
            raw.brewery_type.is_some(),
            city.is_some(),
            state.is_some(),
            country.is_some(),
        ]),
    };

    CleanRecord {
        id: raw.id.clone(),
        name: raw.name.clone(),
        brewery_type: raw.brewery_type.clone(),
        address_1: raw.address_1.clone(),
        street: raw.street.clone(),
        city,
        state,
        state_province,
        country,
        postal_code: raw.postal_code.clone(),
        longitude,
        latitude,
        phone: raw.phone.clone(),
        website_url: raw.website_url.clone(),
        data_quality,
        ingestion_date,
        last_updated,
    }
}

/// Strip surrounding whitespace; absent stays absent.
pub fn trim_field(value: Option<&str>) -> Option<String> {
    value.map(|s| s.trim().to_string())
}

/// Exact, case-sensitive rewrite of the long US country name.
pub fn normalize_country(value: Option<&str>) -> Option<String> {
    match value {
        Some(UNITED_STATES_LONG) => Some(UNITED_STATES_SHORT.to_string()),
        other => other.map(str::to_string),
    }
}

/// Parse a coordinate string. Anything that is not a finite number becomes `None`.
pub fn parse_coordinate(value: Option<&str>) -> Option<f64> {
    value?.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Share of present key fields. The denominator is fixed to the five key
/// fields of the clean schema.
pub fn completeness_score(present: &[bool; COMPLETENESS_FIELD_COUNT as usize]) -> f64 {
    let count = present.iter().filter(|p| **p).count() as f64;
    count / f64::from(COMPLETENESS_FIELD_COUNT)
}
