//! Executor: guard, rewrite, then run on the data engine under a deadline.

use crate::engine::DataEngine;
use crate::error::EngineError;
use crate::safety::{self, RewriteSettings};
use crate::state::ExecutionOutcome;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Extra wall-clock time allowed beyond the engine's own interrupt
const JOIN_GRACE: Duration = Duration::from_secs(1);

/// What the executor ran and what came back
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// The query after the safety net, as sent to the engine
    pub query: String,
    pub rewrites: Vec<&'static str>,
    pub outcome: ExecutionOutcome,
}

#[derive(Clone)]
pub struct Executor {
    engine: Arc<dyn DataEngine>,
    timeout: Duration,
    settings: RewriteSettings,
}

impl Executor {
    pub fn new(engine: Arc<dyn DataEngine>, timeout: Duration, settings: RewriteSettings) -> Self {
        Self {
            engine,
            timeout,
            settings,
        }
    }

    /// Execute one candidate. Failures are captured in the outcome, never raised.
    pub async fn execute(&self, candidate: &str) -> ExecutionReport {
        if let Err(err) = safety::guard(candidate) {
            warn!(error = %err, "Query rejected before execution");
            return ExecutionReport {
                query: candidate.to_string(),
                rewrites: Vec::new(),
                outcome: ExecutionOutcome::failed(err.to_string()),
            };
        }

        let rewritten = safety::rewrite(candidate, &self.settings);
        let engine = Arc::clone(&self.engine);
        let query = rewritten.query.clone();
        let timeout = self.timeout;
        let task = tokio::task::spawn_blocking(move || engine.run(&query, timeout));

        let result = match tokio::time::timeout(timeout + JOIN_GRACE, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(EngineError::Sql(format!(
                "query task failed: {}",
                join_err
            ))),
            Err(_) => Err(EngineError::Timeout(timeout)),
        };

        let outcome = match result {
            Ok(rows) => {
                debug!(rows = rows.len(), "Query succeeded");
                ExecutionOutcome::succeeded(rows)
            }
            Err(err) => {
                warn!(error = %err, "Query failed");
                ExecutionOutcome::failed(err.to_string())
            }
        };
        ExecutionReport {
            query: rewritten.query,
            rewrites: rewritten.applied,
            outcome,
        }
    }
}
