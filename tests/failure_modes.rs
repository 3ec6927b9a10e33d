use async_trait::async_trait;
use brewpipe::config::{PipelineConfig, StoreBackend};
use brewpipe::constants::{CLEAN_COLLECTION, RAW_COLLECTION};
use brewpipe::pipeline::{GoldAggregator, ReportingQueries, SilverTransformer};
use brewpipe::storage::{Collection, DocumentStore, InMemoryStore, StoredDocument, UpsertOutcome};
use brewpipe::types::{CleanRecord, RawRecord};
use brewpipe::{Pipeline, PipelineError, Stage, StoreError};
use std::sync::Arc;
use std::time::Duration;

/// Wraps the in-memory store and misbehaves on request
struct FaultyStore {
    inner: InMemoryStore,
    reject_writes_to: Option<&'static str>,
    read_delay: Option<Duration>,
    unreachable: bool,
}

impl FaultyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            reject_writes_to: None,
            read_delay: None,
            unreachable: false,
        }
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    fn backend_name(&self) -> &'static str {
        "faulty"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_reachable()
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        self.check_reachable()?;
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.find_all(collection).await
    }

    async fn upsert_many(
        &self,
        collection: &str,
        documents: Vec<StoredDocument>,
    ) -> Result<UpsertOutcome, StoreError> {
        self.check_reachable()?;
        if self.reject_writes_to == Some(collection) {
            return Err(StoreError::Rejected(format!("{collection} is read-only")));
        }
        self.inner.upsert_many(collection, documents).await
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        self.check_reachable()?;
        self.inner.count(collection).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.close().await
    }
}

async fn seed_raw(store: &dyn DocumentStore) {
    let mut raw = RawRecord::with_id("b-1");
    raw.name = Some("Rhinegeist".to_string());
    raw.brewery_type = Some("regional".to_string());
    raw.city = Some("Cincinnati".to_string());
    raw.state = Some("Ohio".to_string());
    raw.country = Some("United States".to_string());
    Collection::<RawRecord>::new(store)
        .upsert_many(&[raw], |r| r.id.clone())
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_clean_write_is_a_silver_stage_failure() {
    let mut store = FaultyStore::new();
    store.reject_writes_to = Some(CLEAN_COLLECTION);
    seed_raw(&store).await;

    let store = Arc::new(store);
    let pipeline = Pipeline::new(store.clone(), PipelineConfig::default());
    let err = pipeline.run_silver().await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::StageFailure { stage: Stage::Silver, source: StoreError::Rejected(_) }
    ));
    // The raw layer is untouched and nothing half-written appears downstream
    assert_eq!(store.count(RAW_COLLECTION).await.unwrap(), 1);
    assert_eq!(store.count(CLEAN_COLLECTION).await.unwrap(), 0);
}

#[tokio::test]
async fn gold_failure_leaves_silver_output_in_place() {
    let mut store = FaultyStore::new();
    store.reject_writes_to = Some("breweries_aggregated");
    seed_raw(&store).await;

    let store = Arc::new(store);
    let pipeline = Pipeline::new(store.clone(), PipelineConfig::default());
    pipeline.run_silver().await.unwrap();
    let err = pipeline.run_gold().await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Gold));
    assert_eq!(err.kind(), "stage");
    assert_eq!(store.count(CLEAN_COLLECTION).await.unwrap(), 1);
}

#[tokio::test]
async fn slow_reads_time_out_instead_of_hanging() {
    let mut store = FaultyStore::new();
    store.read_delay = Some(Duration::from_secs(5));

    let deadline = Duration::from_millis(50);
    let err = SilverTransformer::new(&store, deadline)
        .transform_all()
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::TimeoutFailure { stage: Stage::Silver, deadline: d } if d == deadline));

    let err = ReportingQueries::new(&store, deadline)
        .type_distribution()
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::TimeoutFailure { stage: Stage::TypeDistribution, .. }));

    let err = GoldAggregator::new(&store, deadline, 0.6).aggregate().await.unwrap_err();
    assert!(matches!(err, PipelineError::TimeoutFailure { stage: Stage::Gold, .. }));
}

#[tokio::test]
async fn unreachable_store_is_a_connection_failure_for_every_operation() {
    let mut store = FaultyStore::new();
    store.unreachable = true;
    let pipeline = Pipeline::new(Arc::new(store), PipelineConfig::default());

    let silver = pipeline.run_silver().await.unwrap_err();
    assert!(matches!(silver, PipelineError::ConnectionFailure { stage: Stage::Silver, .. }));

    let top = pipeline.top_states(5).await.unwrap_err();
    assert!(matches!(top, PipelineError::ConnectionFailure { stage: Stage::TopStates, .. }));

    let status = pipeline.status().await.unwrap_err();
    assert_eq!(status.kind(), "connection");
}

#[tokio::test]
async fn undecodable_clean_document_is_a_query_failure() {
    let store = InMemoryStore::new();
    store
        .upsert_many(
            CLEAN_COLLECTION,
            vec![StoredDocument {
                key: "corrupt".to_string(),
                body: serde_json::json!({ "id": "corrupt", "data_quality": "oops" }),
            }],
        )
        .await
        .unwrap();

    let err = ReportingQueries::new(&store, Duration::from_secs(1))
        .top_states(3)
        .await
        .unwrap_err();
    match err {
        PipelineError::QueryFailure { stage, source: StoreError::Decode { key, .. } } => {
            assert_eq!(stage, Stage::TopStates);
            assert_eq!(key, "corrupt");
        }
        other => panic!("unexpected error: {other}"),
    }

    // Reading it as a typed clean record fails the same way
    assert!(Collection::<CleanRecord>::new(&store).find_all().await.is_err());
}

#[tokio::test]
async fn closed_pipeline_reports_connection_failure() {
    let pipeline = Pipeline::new(Arc::new(InMemoryStore::new()), PipelineConfig::default());
    pipeline.close().await.unwrap();

    let err = pipeline.run_gold().await.unwrap_err();
    assert!(matches!(err, PipelineError::ConnectionFailure { stage: Stage::Gold, .. }));
}

#[tokio::test]
async fn connecting_to_an_unusable_sqlite_path_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.store.backend = StoreBackend::Sqlite;
    // A directory cannot be opened as a database file
    config.store.sqlite_path = dir.path().to_path_buf();

    let err = Pipeline::connect(config).await.unwrap_err();
    assert!(matches!(err, PipelineError::ConnectionFailure { stage: Stage::Connect, .. }));
}
