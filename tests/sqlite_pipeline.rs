use brewpipe::config::{PipelineConfig, StoreBackend};
use brewpipe::constants::{AGGREGATE_COLLECTION, CLEAN_COLLECTION};
use brewpipe::storage::{Collection, DocumentStore, SqliteStore};
use brewpipe::types::CleanRecord;
use brewpipe::Pipeline;
use std::path::{Path, PathBuf};

fn sample_export() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/sample_breweries.json")
}

fn sqlite_config(path: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.store.backend = StoreBackend::Sqlite;
    config.store.sqlite_path = path.to_path_buf();
    config
}

#[tokio::test]
async fn sample_export_flows_through_every_layer() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested/breweries.db");
    let pipeline = Pipeline::connect(sqlite_config(&db)).await.unwrap();

    let loaded = pipeline.load_raw(&sample_export()).await.unwrap();
    assert_eq!((loaded.records_read, loaded.inserted), (8, 8));

    let silver = pipeline.run_silver().await.unwrap();
    assert_eq!(silver.inserted, 8);

    let gold = pipeline.run_gold().await.unwrap();
    assert_eq!(gold.records_read, 8);
    assert_eq!(gold.records_excluded, 1);
    assert_eq!(gold.inserted, 7);

    let top = pipeline.top_states(1).await.unwrap();
    assert_eq!(top[0].state.as_deref(), Some("California"));
    assert_eq!(top[0].total_breweries, 3);

    let points = pipeline.geographic_subset(100).await.unwrap();
    assert_eq!(points.len(), 5);

    let irish = Collection::<CleanRecord>::new(pipeline.store())
        .find_where(|c| c.id == "e2e78bd8-80ff-4a61-a65c-3bfbd9d76ce2")
        .await
        .unwrap();
    assert_eq!(irish[0].country.as_deref(), Some("Ireland"));
    assert_eq!(irish[0].state.as_deref(), Some("Cork"));
    assert_eq!(irish[0].city.as_deref(), Some("Cork"));
    assert!(!irish[0].data_quality.has_coordinates);

    pipeline.close().await.unwrap();
}

#[tokio::test]
async fn layers_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("breweries.db");

    let first = Pipeline::connect(sqlite_config(&db)).await.unwrap();
    first.load_raw(&sample_export()).await.unwrap();
    first.run_silver().await.unwrap();
    first.run_gold().await.unwrap();
    let before: Vec<CleanRecord> = Collection::new(first.store()).find_all().await.unwrap();
    first.close().await.unwrap();

    let second = Pipeline::connect(sqlite_config(&db)).await.unwrap();
    let counts = second.status().await.unwrap();
    assert_eq!((counts.raw, counts.clean, counts.aggregated), (8, 8, 7));

    // A second silver run keeps ingestion dates and replaces in place
    let rerun = second.run_silver().await.unwrap();
    assert_eq!((rerun.inserted, rerun.replaced), (0, 8));
    let after: Vec<CleanRecord> = Collection::new(second.store()).find_all().await.unwrap();
    for (old, new) in before.iter().zip(after.iter()) {
        assert_eq!(old.id, new.id);
        assert_eq!(old.ingestion_date, new.ingestion_date);
        assert!(new.last_updated > old.last_updated);
    }
    second.close().await.unwrap();
}

#[tokio::test]
async fn sqlite_backend_counts_per_collection() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert_eq!(store.count(CLEAN_COLLECTION).await.unwrap(), 0);
    assert_eq!(store.count(AGGREGATE_COLLECTION).await.unwrap(), 0);
    assert_eq!(store.backend_name(), "sqlite");
}
