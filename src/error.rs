use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Identity of the operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Connect,
    LoadRaw,
    Silver,
    Gold,
    TopStates,
    TypeDistribution,
    GeographicSubset,
    Aggregates,
    Status,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Connect => "connect",
            Stage::LoadRaw => "load_raw",
            Stage::Silver => "silver",
            Stage::Gold => "gold",
            Stage::TopStates => "top_states",
            Stage::TypeDistribution => "type_distribution",
            Stage::GeographicSubset => "geographic_subset",
            Stage::Aggregates => "aggregates",
            Stage::Status => "status",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a document store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("failed to decode {collection}/{key}: {source}")]
    Decode {
        collection: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage}: store unreachable: {source}")]
    ConnectionFailure {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error("{stage}: bulk write rejected: {source}")]
    StageFailure {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error("{stage}: store call exceeded deadline of {deadline:?}")]
    TimeoutFailure { stage: Stage, deadline: Duration },

    #[error("{stage}: read failed: {source}")]
    QueryFailure {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    /// Classify a failed read. An unreachable store is a connection failure,
    /// anything else is a query failure.
    pub fn read(stage: Stage, source: StoreError) -> Self {
        if source.is_unavailable() {
            PipelineError::ConnectionFailure { stage, source }
        } else {
            PipelineError::QueryFailure { stage, source }
        }
    }

    /// Classify a failed bulk write.
    pub fn write(stage: Stage, source: StoreError) -> Self {
        if source.is_unavailable() {
            PipelineError::ConnectionFailure { stage, source }
        } else {
            PipelineError::StageFailure { stage, source }
        }
    }

    /// The stage this error was raised in, if it came from a store call.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::ConnectionFailure { stage, .. }
            | PipelineError::StageFailure { stage, .. }
            | PipelineError::TimeoutFailure { stage, .. }
            | PipelineError::QueryFailure { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ConnectionFailure { .. } => "connection",
            PipelineError::StageFailure { .. } => "stage",
            PipelineError::TimeoutFailure { .. } => "timeout",
            PipelineError::QueryFailure { .. } => "query",
            PipelineError::Config(_) => "config",
            PipelineError::Io(_) => "io",
            PipelineError::Json(_) => "json",
            PipelineError::Toml(_) => "toml",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
