//! Integration tests for the analytics copilot pipeline

mod batch_runs;
mod end_to_end;
mod retrieval_determinism;
mod test_utils;
mod workspace_config;
