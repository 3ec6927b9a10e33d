//! Read-only reporting projections over the clean and aggregate layers.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, instrument};

use super::bounded;
use crate::error::{PipelineError, Result, Stage};
use crate::observability::metrics;
use crate::storage::{Collection, DocumentStore};
use crate::types::{AggregateRecord, CleanRecord, GeoPoint, LayerCounts, RawRecord, StateCount, TypeDistribution};

pub struct ReportingQueries<'a> {
    store: &'a dyn DocumentStore,
    deadline: Duration,
}

impl<'a> ReportingQueries<'a> {
    pub fn new(store: &'a dyn DocumentStore, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    async fn clean_records(&self, stage: Stage) -> Result<Vec<CleanRecord>> {
        metrics::reporting::query_executed(stage.as_str());
        bounded(
            stage,
            self.deadline,
            Collection::<CleanRecord>::new(self.store).find_all(),
            PipelineError::read,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn top_states(&self, limit: usize) -> Result<Vec<StateCount>> {
        let records = self.clean_records(Stage::TopStates).await?;
        Ok(top_states(&records, limit))
    }

    #[instrument(skip(self))]
    pub async fn type_distribution(&self) -> Result<Vec<TypeDistribution>> {
        let records = self.clean_records(Stage::TypeDistribution).await?;
        Ok(type_distribution(&records))
    }

    #[instrument(skip(self))]
    pub async fn geographic_subset(&self, cap: usize) -> Result<Vec<GeoPoint>> {
        let records = self.clean_records(Stage::GeographicSubset).await?;
        Ok(geographic_subset(&records, cap))
    }

    /// Current contents of the gold layer in key order.
    #[instrument(skip(self))]
    pub async fn aggregates(&self) -> Result<Vec<AggregateRecord>> {
        metrics::reporting::query_executed(Stage::Aggregates.as_str());
        bounded(
            Stage::Aggregates,
            self.deadline,
            Collection::<AggregateRecord>::new(self.store).find_all(),
            PipelineError::read,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn layer_counts(&self) -> Result<LayerCounts> {
        let stage = Stage::Status;
        metrics::reporting::query_executed(stage.as_str());
        let raw = bounded(
            stage,
            self.deadline,
            Collection::<RawRecord>::new(self.store).count(),
            PipelineError::read,
        )
        .await?;
        let clean = bounded(
            stage,
            self.deadline,
            Collection::<CleanRecord>::new(self.store).count(),
            PipelineError::read,
        )
        .await?;
        let aggregated = bounded(
            stage,
            self.deadline,
            Collection::<AggregateRecord>::new(self.store).count(),
            PipelineError::read,
        )
        .await?;
        debug!(raw, clean, aggregated, "Layer counts");
        Ok(LayerCounts { raw, clean, aggregated })
    }
}

/// Count records per state, highest first. Equal counts are ordered by state
/// name ascending, with a missing state before any named one.
pub fn top_states(records: &[CleanRecord], limit: usize) -> Vec<StateCount> {
    let mut counts: BTreeMap<Option<&str>, u64> = BTreeMap::new();
    for record in records {
        *counts.entry(record.state.as_deref()).or_default() += 1;
    }

    let mut rows: Vec<StateCount> = counts
        .into_iter()
        .map(|(state, total)| StateCount {
            state: state.map(str::to_string),
            total_breweries: total,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_breweries
            .cmp(&a.total_breweries)
            .then_with(|| a.state.cmp(&b.state))
    });
    rows.truncate(limit);
    rows
}

/// Records per brewery type with the number of distinct states it appears in.
/// A missing state is one more distinct value, as in [`top_states`].
pub fn type_distribution(records: &[CleanRecord]) -> Vec<TypeDistribution> {
    let mut groups: BTreeMap<Option<&str>, (u64, BTreeSet<Option<&str>>)> = BTreeMap::new();
    for record in records {
        let (count, states) = groups.entry(record.brewery_type.as_deref()).or_default();
        *count += 1;
        states.insert(record.state.as_deref());
    }

    let mut rows: Vec<TypeDistribution> = groups
        .into_iter()
        .map(|(brewery_type, (count, states))| TypeDistribution {
            brewery_type: brewery_type.map(str::to_string),
            count,
            states_covered: states.len() as u64,
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.brewery_type.cmp(&b.brewery_type)));
    rows
}

/// Up to `cap` records that have both coordinates.
pub fn geographic_subset(records: &[CleanRecord], cap: usize) -> Vec<GeoPoint> {
    records
        .iter()
        .filter(|r| r.data_quality.has_coordinates)
        .filter_map(|r| {
            Some(GeoPoint {
                name: r.name.clone(),
                brewery_type: r.brewery_type.clone(),
                city: r.city.clone(),
                state: r.state.clone(),
                country: r.country.clone(),
                longitude: r.longitude?,
                latitude: r.latitude?,
                website_url: r.website_url.clone(),
            })
        })
        .take(cap)
        .collect()
}
