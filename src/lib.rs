pub mod config;
pub mod constants;
pub mod error;
pub mod ingest;
pub mod observability;
pub mod pipeline;
pub mod storage;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result, Stage, StoreError};
pub use pipeline::{Pipeline, StageReport};
