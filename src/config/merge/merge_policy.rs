//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key, so a workspace file that only sets
/// `pipeline.top_k` keeps every other default.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("paths.docs_dir", "docs")?
        .set_default("paths.database", "data/northwind.sqlite")?
        .set_default("pipeline.max_retries", 2_i64)?
        .set_default("pipeline.top_k", 3_i64)
}
