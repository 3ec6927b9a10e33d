//! Metric names and recording helpers for the pipeline stages.
//!
//! Recording goes through the `metrics` facade. The library never installs a
//! recorder, so these calls are no-ops unless the embedding process sets one up.

use std::fmt;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Silver metrics
    SilverRecordsRead,
    SilverRecordsWritten,
    SilverCompletenessScore,
    SilverMissingCoordinates,

    // Gold metrics
    GoldRecordsEligible,
    GoldRecordsExcluded,
    GoldGroupsWritten,

    // Shared
    StageDuration,
    StageFailures,
    QueriesExecuted,
    RawRecordsLoaded,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SilverRecordsRead => "brewpipe_silver_records_read_total",
            MetricName::SilverRecordsWritten => "brewpipe_silver_records_written_total",
            MetricName::SilverCompletenessScore => "brewpipe_silver_completeness_score",
            MetricName::SilverMissingCoordinates => "brewpipe_silver_missing_coordinates_total",

            MetricName::GoldRecordsEligible => "brewpipe_gold_records_eligible_total",
            MetricName::GoldRecordsExcluded => "brewpipe_gold_records_excluded_total",
            MetricName::GoldGroupsWritten => "brewpipe_gold_groups_written_total",

            MetricName::StageDuration => "brewpipe_stage_duration_seconds",
            MetricName::StageFailures => "brewpipe_stage_failures_total",
            MetricName::QueriesExecuted => "brewpipe_queries_executed_total",
            MetricName::RawRecordsLoaded => "brewpipe_raw_records_loaded_total",
        }
    }

    /// Get all metric names as an iterator
    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            SilverRecordsRead,
            SilverRecordsWritten,
            SilverCompletenessScore,
            SilverMissingCoordinates,
            GoldRecordsEligible,
            GoldRecordsExcluded,
            GoldGroupsWritten,
            StageDuration,
            StageFailures,
            QueriesExecuted,
            RawRecordsLoaded,
        ]
        .into_iter()
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record how long a stage or query took
pub fn stage_duration(stage: &str, secs: f64) {
    ::metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage.to_string()).record(secs);
}

/// Record a failed stage with the error kind
pub fn stage_failed(stage: &str, kind: &str) {
    ::metrics::counter!(MetricName::StageFailures.as_str(),
        "stage" => stage.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

// ============================================================================
// Silver Metrics
// ============================================================================

pub mod silver {
    use super::MetricName;

    pub fn records_read(count: usize) {
        ::metrics::counter!(MetricName::SilverRecordsRead.as_str()).increment(count as u64);
    }

    pub fn records_written(inserted: usize, replaced: usize) {
        let metric_name = MetricName::SilverRecordsWritten.as_str();
        ::metrics::counter!(metric_name, "outcome" => "inserted").increment(inserted as u64);
        ::metrics::counter!(metric_name, "outcome" => "replaced").increment(replaced as u64);
    }

    pub fn completeness_recorded(score: f64) {
        ::metrics::histogram!(MetricName::SilverCompletenessScore.as_str()).record(score);
    }

    pub fn missing_coordinates() {
        ::metrics::counter!(MetricName::SilverMissingCoordinates.as_str()).increment(1);
    }
}

// ============================================================================
// Gold Metrics
// ============================================================================

pub mod gold {
    use super::MetricName;

    pub fn records_filtered(eligible: usize, excluded: usize) {
        ::metrics::counter!(MetricName::GoldRecordsEligible.as_str()).increment(eligible as u64);
        ::metrics::counter!(MetricName::GoldRecordsExcluded.as_str()).increment(excluded as u64);
    }

    pub fn groups_written(count: usize) {
        ::metrics::counter!(MetricName::GoldGroupsWritten.as_str()).increment(count as u64);
    }
}

// ============================================================================
// Reporting Metrics
// ============================================================================

pub mod reporting {
    use super::MetricName;

    pub fn query_executed(query: &str) {
        ::metrics::counter!(MetricName::QueriesExecuted.as_str(), "query" => query.to_string()).increment(1);
    }
}

pub mod ingest {
    use super::MetricName;

    pub fn raw_records_loaded(count: usize) {
        ::metrics::counter!(MetricName::RawRecordsLoaded.as_str()).increment(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn metric_names_are_unique_and_prefixed() {
        let names: Vec<&str> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), unique.len());
        assert!(names.iter().all(|n| n.starts_with("brewpipe_")));
    }

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        stage_duration("silver", 0.25);
        stage_failed("gold", "timeout");
        silver::records_written(3, 1);
        gold::groups_written(2);
    }
}
