//! Environment source: `COPILOT__PIPELINE__MAX_RETRIES=3` overrides `pipeline.max_retries`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("COPILOT")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
