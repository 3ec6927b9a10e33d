/// Collection names for each layer of the store.
/// These constants keep the loader, stages, and status report pointed at the same data.

// Bronze: unvalidated records from the ingestion collaborator
pub const RAW_COLLECTION: &str = "breweries_raw";
// Silver: normalized, quality-scored records
pub const CLEAN_COLLECTION: &str = "breweries_clean";
// Gold: grouped summaries
pub const AGGREGATE_COLLECTION: &str = "breweries_aggregated";

/// Country literal rewritten by the silver stage (exact, case-sensitive match).
pub const UNITED_STATES_LONG: &str = "United States";
pub const UNITED_STATES_SHORT: &str = "US";

/// Number of key fields in the completeness score. Coupled to the clean schema:
/// name, brewery_type, city, state, country.
pub const COMPLETENESS_FIELD_COUNT: u32 = 5;

/// Minimum completeness score for a clean record to count in any gold group.
pub const DEFAULT_GOLD_MIN_COMPLETENESS: f64 = 0.6;

/// Number of `{name, city}` samples kept on each aggregate.
pub const EXAMPLE_BREWERIES_PER_GROUP: usize = 3;

// Per-call deadlines
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

// Reporting defaults
pub const DEFAULT_TOP_STATES_LIMIT: usize = 10;
pub const DEFAULT_GEO_CAP: usize = 100;

pub const DEFAULT_CONFIG_PATH: &str = "brewpipe.toml";
pub const DEFAULT_SQLITE_PATH: &str = "data/breweries.db";
pub const DEFAULT_LOG_DIR: &str = "logs";
