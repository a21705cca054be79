//! Configuration System
//!
//! Layered configuration for the pipeline: built-in defaults, the global config file, workspace
//! config files and `COPILOT__*` environment overrides, merged with the `config` crate.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use crate::provider::{ProviderConfig, ProviderType};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopilotConfig {
    /// Language-model backend
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Retry budget, retrieval depth and per-call timeouts
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Locations of the corpus, database and few-shot artifact
    #[serde(default)]
    pub paths: PathsConfig,

    /// Facts about the underlying dataset
    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Chunks must score strictly above this to be returned
    #[serde(default)]
    pub min_score: f64,
    /// Few-shot demonstrations placed in each generation prompt
    #[serde(default = "default_demonstrations")]
    pub demonstrations: usize,
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    /// Cost of goods approximated as this fraction of unit price
    #[serde(default = "default_cost_fraction")]
    pub cost_fraction: f64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_top_k() -> usize {
    3
}

fn default_demonstrations() -> usize {
    3
}

fn default_generation_timeout_secs() -> u64 {
    120
}

fn default_execution_timeout_ms() -> u64 {
    5_000
}

fn default_max_rows() -> usize {
    200
}

fn default_cost_fraction() -> f64 {
    0.7
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            top_k: default_top_k(),
            min_score: 0.0,
            demonstrations: default_demonstrations(),
            generation_timeout_secs: default_generation_timeout_secs(),
            execution_timeout_ms: default_execution_timeout_ms(),
            max_rows: default_max_rows(),
            cost_fraction: default_cost_fraction(),
        }
    }
}

impl PipelineConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.top_k == 0 {
            return Err("top_k must be at least 1".to_string());
        }
        if self.execution_timeout_ms == 0 || self.generation_timeout_secs == 0 {
            return Err("timeouts must be greater than zero".to_string());
        }
        if !(0.0..=1.0).contains(&self.cost_fraction) {
            return Err(format!(
                "cost_fraction must be within 0.0..=1.0, got {}",
                self.cost_fraction
            ));
        }
        if self.max_rows == 0 {
            return Err("max_rows must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Optimized few-shot demonstrations; zero-shot generation when unset
    #[serde(default)]
    pub few_shot_artifact: Option<PathBuf>,
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("docs")
}

fn default_database() -> PathBuf {
    PathBuf::from("data/northwind.sqlite")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            database: default_database(),
            few_shot_artifact: None,
        }
    }
}

impl PathsConfig {
    /// Resolve relative paths against the workspace root.
    pub fn resolved(&self, workspace_root: &Path) -> PathsConfig {
        let resolve = |path: &Path| -> PathBuf {
            let joined = if path.is_absolute() {
                path.to_path_buf()
            } else {
                workspace_root.join(path)
            };
            dunce::canonicalize(&joined).unwrap_or(joined)
        };
        PathsConfig {
            docs_dir: resolve(&self.docs_dir),
            database: resolve(&self.database),
            few_shot_artifact: self.few_shot_artifact.as_deref().map(resolve),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// First order date present in the dataset (inclusive, ISO 8601)
    #[serde(default = "default_valid_start")]
    pub valid_start: String,
    /// Last order date present in the dataset (inclusive, ISO 8601)
    #[serde(default = "default_valid_end")]
    pub valid_end: String,
    /// Tables described to the query generator
    #[serde(default = "default_tables")]
    pub tables: Vec<String>,
    /// Product categories recognised as filters
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
}

fn default_valid_start() -> String {
    "2012-07-04".to_string()
}

fn default_valid_end() -> String {
    "2023-10-28".to_string()
}

fn default_tables() -> Vec<String> {
    ["orders", "order_items", "products", "customers", "categories", "suppliers"]
        .iter()
        .map(|t| t.to_string())
        .collect()
}

fn default_categories() -> Vec<String> {
    [
        "Beverages",
        "Condiments",
        "Confections",
        "Dairy Products",
        "Grains/Cereals",
        "Meat/Poultry",
        "Produce",
        "Seafood",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            valid_start: default_valid_start(),
            valid_end: default_valid_end(),
            tables: default_tables(),
            categories: default_categories(),
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<(), String> {
        let start = chrono::NaiveDate::parse_from_str(&self.valid_start, "%Y-%m-%d")
            .map_err(|e| format!("valid_start '{}': {}", self.valid_start, e))?;
        let end = chrono::NaiveDate::parse_from_str(&self.valid_end, "%Y-%m-%d")
            .map_err(|e| format!("valid_end '{}': {}", self.valid_end, e))?;
        if start > end {
            return Err("valid_start must not be after valid_end".to_string());
        }
        if self.tables.is_empty() {
            return Err("at least one table must be described".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Pipelines running at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    1
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Provider(String),
    Pipeline(String),
    Dataset(String),
    Batch(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Pipeline(msg) => write!(f, "Pipeline: {}", msg),
            ValidationError::Dataset(msg) => write!(f, "Dataset: {}", msg),
            ValidationError::Batch(msg) => write!(f, "Batch: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl CopilotConfig {
    /// Validate the entire configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }
        if let Err(e) = self.pipeline.validate() {
            errors.push(ValidationError::Pipeline(e));
        }
        if let Err(e) = self.dataset.validate() {
            errors.push(ValidationError::Dataset(e));
        }
        if self.batch.concurrency == 0 {
            errors.push(ValidationError::Batch(
                "concurrency must be at least 1".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, crate::error::CopilotError> {
        toml::to_string_pretty(self)
            .map_err(|e| crate::error::CopilotError::ConfigError(e.to_string()))
    }
}
