//! Gold layer: grouped summaries over sufficiently complete clean records.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{bounded, StageReport};
use crate::constants::EXAMPLE_BREWERIES_PER_GROUP;
use crate::error::{PipelineError, Result, Stage};
use crate::observability::metrics;
use crate::storage::{Collection, DocumentStore};
use crate::types::{AggregateRecord, CleanRecord, ExampleBrewery, GroupKey};

pub struct GoldAggregator<'a> {
    store: &'a dyn DocumentStore,
    deadline: Duration,
    min_completeness: f64,
}

impl<'a> GoldAggregator<'a> {
    pub fn new(store: &'a dyn DocumentStore, deadline: Duration, min_completeness: f64) -> Self {
        Self {
            store,
            deadline,
            min_completeness,
        }
    }

    pub async fn aggregate(&self) -> Result<StageReport> {
        self.aggregate_at(Utc::now()).await
    }

    /// Group the clean layer as it is right now and upsert one aggregate per
    /// group. Whether silver ran first is not checked.
    #[instrument(skip(self))]
    pub async fn aggregate_at(&self, now: DateTime<Utc>) -> Result<StageReport> {
        let run_id = Uuid::new_v4();
        let stage = Stage::Gold;
        info!(%run_id, min_completeness = self.min_completeness, "Running gold layer aggregation");

        let clean_records = bounded(
            stage,
            self.deadline,
            Collection::<CleanRecord>::new(self.store).find_all(),
            PipelineError::read,
        )
        .await?;
        let total_read = clean_records.len();

        let eligible: Vec<CleanRecord> = clean_records
            .into_iter()
            .filter(|c| c.data_quality.completeness_score >= self.min_completeness)
            .collect();
        let excluded = total_read - eligible.len();
        metrics::gold::records_filtered(eligible.len(), excluded);

        let aggregates = build_aggregates(&eligible, now.date_naive());

        let outcome = bounded(
            stage,
            self.deadline,
            Collection::<AggregateRecord>::new(self.store)
                .upsert_many(&aggregates, |a| a.group_key().store_key()),
            PipelineError::write,
        )
        .await?;
        metrics::gold::groups_written(outcome.written());

        info!(
            %run_id,
            eligible = eligible.len(),
            excluded,
            groups = aggregates.len(),
            "Gold layer completed"
        );

        Ok(StageReport {
            run_id,
            stage,
            started_at: now,
            finished_at: Utc::now(),
            records_read: total_read,
            records_excluded: excluded,
            inserted: outcome.inserted,
            replaced: outcome.replaced,
        })
    }
}

#[derive(Default)]
struct GroupTotals {
    total: u64,
    with_website: u64,
    with_phone: u64,
    with_coordinates: u64,
    completeness_sum: f64,
    examples: Vec<ExampleBrewery>,
}

/// Group records by (country, state, brewery_type). Callers filter first.
///
/// Null components form their own groups. Example breweries are the first
/// few records of each group in identifier order.
pub fn build_aggregates(records: &[CleanRecord], aggregation_date: NaiveDate) -> Vec<AggregateRecord> {
    let mut ordered: Vec<&CleanRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let mut groups: BTreeMap<GroupKey, GroupTotals> = BTreeMap::new();
    for record in ordered {
        let key = GroupKey {
            country: record.country.clone(),
            state: record.state.clone(),
            brewery_type: record.brewery_type.clone(),
        };
        let totals = groups.entry(key).or_default();
        totals.total += 1;
        totals.with_website += u64::from(record.website_url.is_some());
        totals.with_phone += u64::from(record.phone.is_some());
        totals.with_coordinates += u64::from(record.data_quality.has_coordinates);
        totals.completeness_sum += record.data_quality.completeness_score;
        if totals.examples.len() < EXAMPLE_BREWERIES_PER_GROUP {
            totals.examples.push(ExampleBrewery {
                name: record.name.clone(),
                city: record.city.clone(),
            });
        }
    }

    let date = aggregation_date.format("%Y-%m-%d").to_string();
    groups
        .into_iter()
        .map(|(key, totals)| AggregateRecord {
            country: key.country,
            state: key.state,
            brewery_type: key.brewery_type,
            total_breweries: totals.total,
            breweries_with_website: totals.with_website,
            breweries_with_phone: totals.with_phone,
            breweries_with_coordinates: totals.with_coordinates,
            website_coverage: coverage(totals.with_website, totals.total),
            phone_coverage: coverage(totals.with_phone, totals.total),
            coordinates_coverage: coverage(totals.with_coordinates, totals.total),
            avg_completeness_score: round_to(totals.completeness_sum / totals.total as f64, 3),
            example_breweries: totals.examples,
            aggregation_date: date.clone(),
        })
        .collect()
}

/// Percentage of `part` in `total`, two decimals. Groups are never empty.
fn coverage(part: u64, total: u64) -> f64 {
    round_to(part as f64 / total as f64 * 100.0, 2)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
