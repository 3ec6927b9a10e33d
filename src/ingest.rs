//! Loader that seeds the raw layer from an OpenBreweryDB-style export.
//!
//! Stands in for the external ingestion service: it is the only code that
//! writes `breweries_raw`, and none of the layer stages depend on it.

use chrono::Utc;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{PipelineError, Result, Stage};
use crate::observability::metrics;
use crate::pipeline::{bounded, StageReport};
use crate::storage::{Collection, DocumentStore};
use crate::types::RawRecord;

/// Accepted export shapes: a bare array or a paged `{"data": [...]}` response.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawExport {
    List(Vec<RawRecord>),
    Paged { data: Vec<RawRecord> },
}

pub fn parse_raw_export(content: &str) -> Result<Vec<RawRecord>> {
    let export: RawExport = serde_json::from_str(content)?;
    Ok(match export {
        RawExport::List(records) => records,
        RawExport::Paged { data } => data,
    })
}

/// Upsert every record of the export into the raw layer, keyed by `id`.
#[instrument(skip(store))]
pub async fn load_raw_file(store: &dyn DocumentStore, path: &Path, deadline: Duration) -> Result<StageReport> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        PipelineError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read {}: {}", path.display(), e),
        ))
    })?;
    let records = parse_raw_export(&content)?;

    let outcome = bounded(
        Stage::LoadRaw,
        deadline,
        Collection::<RawRecord>::new(store).upsert_many(&records, |r| r.id.clone()),
        PipelineError::write,
    )
    .await?;
    metrics::ingest::raw_records_loaded(outcome.written());

    info!(%run_id, file = %path.display(), loaded = records.len(), "Raw layer seeded");
    Ok(StageReport {
        run_id,
        stage: Stage::LoadRaw,
        started_at,
        finished_at: Utc::now(),
        records_read: records.len(),
        records_excluded: 0,
        inserted: outcome.inserted,
        replaced: outcome.replaced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_array_and_paged_exports() {
        let bare = parse_raw_export(r#"[{"id": "a"}, {"id": "b", "city": "Austin"}]"#).unwrap();
        assert_eq!(bare.len(), 2);
        assert_eq!(bare[1].city.as_deref(), Some("Austin"));

        let paged = parse_raw_export(
            r#"{"data": [{"id": "c", "longitude": "-97.7"}], "meta": {"total": "1", "page": "1", "per_page": "200"}}"#,
        )
        .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].longitude.as_deref(), Some("-97.7"));
    }

    #[test]
    fn record_without_id_is_rejected() {
        assert!(parse_raw_export(r#"[{"name": "Anonymous"}]"#).is_err());
    }
}
