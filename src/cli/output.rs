//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::CopilotError;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &CopilotError) -> String {
    match e {
        CopilotError::ConfigError(msg) => format!("Configuration problem: {}", msg),
        CopilotError::CorpusError(msg) => format!("Document corpus problem: {}", msg),
        other => other.to_string(),
    }
}
