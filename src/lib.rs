//! Analytics Copilot: grounded answers over documents and a read-only SQLite database.
//!
//! A question is routed, matched against a markdown corpus, planned into concrete constraints,
//! turned into a query by a language model, run through a safety net and a bounded repair loop,
//! and finally synthesized into a typed answer with citations.

pub mod batch;
pub mod cli;
pub mod config;
pub mod diagnose;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fewshot;
pub mod generation;
pub mod logging;
pub mod pipeline;
pub mod planner;
pub mod provider;
pub mod repair;
pub mod retrieval;
pub mod router;
pub mod safety;
pub mod state;
pub mod synthesis;

pub use error::{CopilotError, EngineError};
pub use pipeline::{Pipeline, PipelineRun, PipelineSettings};
pub use state::{AnswerValue, FinalAnswer, Intent, RequestState};
