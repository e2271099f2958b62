//! Pipeline configuration.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Which path a lead takes out of the Enriched stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineVariant {
    /// Run another enrichment pass before messaging.
    EnrichFirst,
    /// Go straight to message generation.
    MessageDirect,
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of rows pulled from the store per queue fetch.
    pub batch_size: usize,
    /// Maximum dispatches per minute (fixed-cadence rate limit).
    pub max_per_minute: u32,
    /// Retry budget for failed messages. Single source of truth for both
    /// `should_proceed` and the dispatch loop's budget gate.
    pub max_retries: u32,
    /// Queue size below which the dispatch loop triggers one refill.
    pub refill_threshold: usize,
    /// Minimum confidence score a lead needs to be eligible for message
    /// generation. Consumed upstream; carried here read-only.
    pub min_confidence_score: i64,
    /// Simulation mode: record dispatches without real transport.
    pub dry_run: bool,
    /// Stage routing out of Enriched.
    pub variant: PipelineVariant,
    /// libSQL database file.
    pub database_path: PathBuf,
    /// Directory where the storage sender writes simulated deliveries.
    pub storage_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_per_minute: 10,
            max_retries: 2,
            refill_threshold: 10,
            min_confidence_score: 60,
            dry_run: true,
            variant: PipelineVariant::MessageDirect,
            database_path: PathBuf::from("./data/leadflow.db"),
            storage_dir: PathBuf::from("./storage/messages"),
        }
    }
}

impl PipelineConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let batch_size = env_parse("LEADFLOW_BATCH_SIZE", defaults.batch_size);
        let max_per_minute = env_parse("LEADFLOW_MAX_PER_MINUTE", defaults.max_per_minute);
        let max_retries = env_parse("LEADFLOW_MAX_RETRIES", defaults.max_retries);
        let refill_threshold = env_parse("LEADFLOW_REFILL_THRESHOLD", defaults.refill_threshold);
        let min_confidence_score =
            env_parse("LEADFLOW_MIN_CONFIDENCE", defaults.min_confidence_score);

        let dry_run = std::env::var("LEADFLOW_DRY_RUN")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(defaults.dry_run);

        let variant = match std::env::var("LEADFLOW_VARIANT").as_deref() {
            Ok("enrich_first") => PipelineVariant::EnrichFirst,
            _ => defaults.variant,
        };

        let database_path = std::env::var("LEADFLOW_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let storage_dir = std::env::var("LEADFLOW_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_dir);

        let config = Self {
            batch_size,
            max_per_minute,
            max_retries,
            refill_threshold,
            min_confidence_score,
            dry_run,
            variant,
            database_path,
            storage_dir,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LEADFLOW_BATCH_SIZE".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.max_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LEADFLOW_MAX_PER_MINUTE".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
