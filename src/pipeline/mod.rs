// Layer stages (silver, gold), reporting queries, and the handle that sequences them

pub mod gold;
pub mod reporting;
pub mod silver;

pub use gold::GoldAggregator;
pub use reporting::ReportingQueries;
pub use silver::SilverTransformer;

use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{PipelineConfig, StoreBackend};
use crate::error::{PipelineError, Result, Stage, StoreError};
use crate::ingest;
use crate::observability::metrics;
use crate::storage::{DocumentStore, InMemoryStore, SqliteStore};
use crate::types::{AggregateRecord, GeoPoint, LayerCounts, StateCount, TypeDistribution};

/// Summary of one write stage run
#[derive(Debug, Clone)]
pub struct StageReport {
    pub run_id: Uuid,
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records_read: usize,
    /// Records read but left out of the output (gold threshold)
    pub records_excluded: usize,
    pub inserted: usize,
    pub replaced: usize,
}

impl StageReport {
    pub fn written(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Run one store call under a deadline and classify its failure.
pub(crate) async fn bounded<T, F, C>(stage: Stage, deadline: Duration, call: F, classify: C) -> Result<T>
where
    F: Future<Output = std::result::Result<T, StoreError>>,
    C: FnOnce(Stage, StoreError) -> PipelineError,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(classify(stage, source)),
        Err(_) => Err(PipelineError::TimeoutFailure { stage, deadline }),
    }
}

/// Record duration and failure metrics around an operation.
async fn observe<T, F>(stage: Stage, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let result = operation.await;
    metrics::stage_duration(stage.as_str(), started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        metrics::stage_failed(stage.as_str(), e.kind());
        error!(stage = %stage, kind = e.kind(), "Operation failed: {}", e);
    }
    result
}

/// Store handle plus configuration, constructed once by the orchestrator and
/// lent to each stage.
pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    config: PipelineConfig,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("store", &self.store.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

impl Pipeline {
    pub fn new(store: Arc<dyn DocumentStore>, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    /// Open the configured backend and check it answers.
    pub async fn connect(config: PipelineConfig) -> Result<Self> {
        let as_connection_failure =
            |stage: Stage, source: StoreError| PipelineError::ConnectionFailure { stage, source };

        let store: Arc<dyn DocumentStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(InMemoryStore::new()),
            StoreBackend::Sqlite => Arc::new(
                SqliteStore::open(&config.store.sqlite_path)
                    .map_err(|source| as_connection_failure(Stage::Connect, source))?,
            ),
        };

        bounded(
            Stage::Connect,
            config.deadlines.stage_timeout(),
            store.ping(),
            as_connection_failure,
        )
        .await?;
        info!(backend = store.backend_name(), "Connected to document store");
        Ok(Self::new(store, config))
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn stage_deadline(&self) -> Duration {
        self.config.deadlines.stage_timeout()
    }

    fn queries(&self) -> ReportingQueries<'_> {
        ReportingQueries::new(self.store(), self.config.deadlines.query_timeout())
    }

    /// Bronze → silver
    pub async fn run_silver(&self) -> Result<StageReport> {
        observe(
            Stage::Silver,
            SilverTransformer::new(self.store(), self.stage_deadline()).transform_all(),
        )
        .await
    }

    /// Silver → gold
    pub async fn run_gold(&self) -> Result<StageReport> {
        let aggregator = GoldAggregator::new(
            self.store(),
            self.stage_deadline(),
            self.config.gold.min_completeness,
        );
        observe(Stage::Gold, aggregator.aggregate()).await
    }

    pub async fn top_states(&self, limit: usize) -> Result<Vec<StateCount>> {
        observe(Stage::TopStates, self.queries().top_states(limit)).await
    }

    pub async fn type_distribution(&self) -> Result<Vec<TypeDistribution>> {
        observe(Stage::TypeDistribution, self.queries().type_distribution()).await
    }

    pub async fn geographic_subset(&self, cap: usize) -> Result<Vec<GeoPoint>> {
        observe(Stage::GeographicSubset, self.queries().geographic_subset(cap)).await
    }

    pub async fn aggregates(&self) -> Result<Vec<AggregateRecord>> {
        observe(Stage::Aggregates, self.queries().aggregates()).await
    }

    pub async fn status(&self) -> Result<LayerCounts> {
        observe(Stage::Status, self.queries().layer_counts()).await
    }

    /// Seed the raw layer from an export file
    pub async fn load_raw(&self, path: &Path) -> Result<StageReport> {
        observe(
            Stage::LoadRaw,
            ingest::load_raw_file(self.store(), path, self.stage_deadline()),
        )
        .await
    }

    pub async fn close(&self) -> Result<()> {
        self.store
            .close()
            .await
            .map_err(|source| PipelineError::ConnectionFailure { stage: Stage::Connect, source })
    }
}
