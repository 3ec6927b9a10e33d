use crate::constants::{
    DEFAULT_GEO_CAP, DEFAULT_GOLD_MIN_COMPLETENESS, DEFAULT_LOG_DIR, DEFAULT_QUERY_TIMEOUT_SECS,
    DEFAULT_SQLITE_PATH, DEFAULT_STAGE_TIMEOUT_SECS, DEFAULT_TOP_STATES_LIMIT,
};
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Which document store backend the orchestrator opens.
///
/// `Memory` keeps nothing between processes, so separate CLI invocations
/// only share layers through `Sqlite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(PipelineError::Config(format!("unknown store backend '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub store: StoreConfig,
    pub deadlines: DeadlineConfig,
    pub gold: GoldConfig,
    pub reporting: ReportingConfig,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub sqlite_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeadlineConfig {
    /// Per store call, for the silver and gold stages
    pub stage_timeout_secs: u64,
    /// Per store call, for reporting queries
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoldConfig {
    pub min_completeness: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub top_states_limit: usize,
    pub geo_cap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            deadlines: DeadlineConfig::default(),
            gold: GoldConfig::default(),
            reporting: ReportingConfig::default(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            sqlite_path: PathBuf::from(DEFAULT_SQLITE_PATH),
        }
    }
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: DEFAULT_STAGE_TIMEOUT_SECS,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
        }
    }
}

impl Default for GoldConfig {
    fn default() -> Self {
        Self {
            min_completeness: DEFAULT_GOLD_MIN_COMPLETENESS,
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            top_states_limit: DEFAULT_TOP_STATES_LIMIT,
            geo_cap: DEFAULT_GEO_CAP,
        }
    }
}

impl DeadlineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// A missing file at the default location is not an error; a missing file
    /// that was asked for explicitly is.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
            })?;
            Self::from_toml(&content)?
        } else if required {
            return Err(PipelineError::Config(format!(
                "config file '{}' does not exist",
                path.display()
            )));
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `BREWPIPE_*` overrides using the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BREWPIPE_STORE") {
            self.store.backend = v.parse()?;
        }
        if let Some(v) = lookup("BREWPIPE_SQLITE_PATH") {
            self.store.sqlite_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("BREWPIPE_STAGE_TIMEOUT_SECS") {
            self.deadlines.stage_timeout_secs = parse_env("BREWPIPE_STAGE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("BREWPIPE_QUERY_TIMEOUT_SECS") {
            self.deadlines.query_timeout_secs = parse_env("BREWPIPE_QUERY_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("BREWPIPE_LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.deadlines.stage_timeout_secs == 0 || self.deadlines.query_timeout_secs == 0 {
            return Err(PipelineError::Config("deadlines must be at least one second".to_string()));
        }
        if !(0.0..=1.0).contains(&self.gold.min_completeness) {
            return Err(PipelineError::Config(format!(
                "gold.min_completeness must be within [0, 1], got {}",
                self.gold.min_completeness
            )));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PipelineError::Config(format!("{} has invalid value '{}'", key, value)))
}
