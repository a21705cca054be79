//! Error types for the analytics copilot pipeline.

use std::time::Duration;
use thiserror::Error;

/// Data engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to open database {path}: {message}")]
    Open { path: String, message: String },

    #[error("Disallowed operation: {0}")]
    Disallowed(String),

    #[error("{0}")]
    Sql(String),

    #[error("Query exceeded execution timeout of {0:?}")]
    Timeout(Duration),

    #[error("Engine I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Sql(err.to_string())
    }
}

/// Pipeline-level errors
#[derive(Debug, Error)]
pub enum CopilotError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Could not classify question: {0}")]
    Classification(String),

    #[error("Ambiguous plan constraint: {0}")]
    PlanningAmbiguity(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Output format error: {0}")]
    OutputFormat(String),

    #[error("Few-shot artifact rejected: {0}")]
    ArtifactError(String),

    #[error("Corpus error: {0}")]
    CorpusError(String),

    #[error("Engine error: {0}")]
    EngineError(#[from] EngineError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CopilotError {
    /// Whether the repair loop may retry after this error.
    ///
    /// Timeouts on either backend and engine-reported failures are recoverable. Anything else
    /// raised while generating a query ends the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CopilotError::Timeout(_)
                | CopilotError::EngineError(EngineError::Sql(_))
                | CopilotError::EngineError(EngineError::Timeout(_))
                | CopilotError::EngineError(EngineError::Disallowed(_))
        )
    }
}

impl From<config::ConfigError> for CopilotError {
    fn from(err: config::ConfigError) -> Self {
        CopilotError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for CopilotError {
    fn from(err: serde_json::Error) -> Self {
        CopilotError::ArtifactError(err.to_string())
    }
}
