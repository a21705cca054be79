//! Repair Loop
//!
//! A small state machine over [`RequestState`]: generate a candidate, execute it, and on failure
//! feed the literal error back to the generator until the retry budget runs out.
//!
//! `attempt_count` counts repairs, so the executor runs at most `max_retries + 1` times and
//! `attempt_count` never exceeds `max_retries`.

use crate::executor::Executor;
use crate::fewshot::FewShotArtifact;
use crate::generation::{PriorAttempt, QueryGenerator};
use crate::state::{ExecutionOutcome, RequestState};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairPhase {
    Generating,
    Executing,
    Succeeded,
    Exhausted,
    /// Generation failed in a way retrying cannot fix
    Aborted,
}

impl RepairPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RepairPhase::Succeeded | RepairPhase::Exhausted | RepairPhase::Aborted
        )
    }
}

impl fmt::Display for RepairPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepairPhase::Generating => "generating",
            RepairPhase::Executing => "executing",
            RepairPhase::Succeeded => "succeeded",
            RepairPhase::Exhausted => "exhausted",
            RepairPhase::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairEvent {
    CandidateReady,
    /// Generation hit a recoverable error such as a timeout
    GenerationRetryable,
    GenerationFatal,
    ExecutionSucceeded,
    ExecutionFailed,
}

/// Next phase and attempt count.
///
/// Events that do not apply to the current phase leave it unchanged.
pub fn transition(
    phase: RepairPhase,
    event: RepairEvent,
    attempt_count: u32,
    max_retries: u32,
) -> (RepairPhase, u32) {
    let retry_or_exhaust = || {
        if attempt_count < max_retries {
            (RepairPhase::Generating, attempt_count + 1)
        } else {
            (RepairPhase::Exhausted, attempt_count)
        }
    };
    match (phase, event) {
        (RepairPhase::Generating, RepairEvent::CandidateReady) => {
            (RepairPhase::Executing, attempt_count)
        }
        (RepairPhase::Generating, RepairEvent::GenerationRetryable) => retry_or_exhaust(),
        (RepairPhase::Generating, RepairEvent::GenerationFatal) => {
            (RepairPhase::Aborted, attempt_count)
        }
        (RepairPhase::Executing, RepairEvent::ExecutionSucceeded) => {
            (RepairPhase::Succeeded, attempt_count)
        }
        (RepairPhase::Executing, RepairEvent::ExecutionFailed) => retry_or_exhaust(),
        (phase, _) => (phase, attempt_count),
    }
}

/// Everything one repair run needs besides the state
pub struct RepairLoop<'a> {
    pub generator: &'a QueryGenerator,
    pub executor: &'a Executor,
    pub schema: &'a str,
    pub artifact: Option<&'a FewShotArtifact>,
    pub max_retries: u32,
}

impl RepairLoop<'_> {
    /// Drive the state to a terminal phase.
    pub async fn run(&self, state: &mut RequestState) -> RepairPhase {
        let mut phase = RepairPhase::Generating;
        let mut prior: Option<PriorAttempt> = None;
        let mut candidate = String::new();

        while !phase.is_terminal() {
            let event = match phase {
                RepairPhase::Generating => {
                    let generated = self
                        .generator
                        .generate(
                            state.question(),
                            self.schema,
                            &state.plan_constraints,
                            prior.as_ref(),
                            self.artifact,
                        )
                        .await;
                    match generated {
                        Ok(query) => {
                            candidate = query;
                            RepairEvent::CandidateReady
                        }
                        Err(err) if err.is_recoverable() => {
                            warn!(error = %err, attempt = state.attempt_count, "Generation attempt failed");
                            state.record_attempt(None, ExecutionOutcome::failed(err.to_string()));
                            prior = Some(PriorAttempt {
                                query: None,
                                error: err.to_string(),
                            });
                            RepairEvent::GenerationRetryable
                        }
                        Err(err) => {
                            warn!(error = %err, "Generation aborted");
                            state.record_attempt(None, ExecutionOutcome::failed(err.to_string()));
                            RepairEvent::GenerationFatal
                        }
                    }
                }
                RepairPhase::Executing => {
                    let report = self.executor.execute(&candidate).await;
                    let event = if report.outcome.success {
                        RepairEvent::ExecutionSucceeded
                    } else {
                        prior = Some(PriorAttempt {
                            query: Some(report.query.clone()),
                            error: report.outcome.error_message.clone().unwrap_or_default(),
                        });
                        RepairEvent::ExecutionFailed
                    };
                    state.record_attempt(Some(report.query), report.outcome);
                    event
                }
                _ => break,
            };

            let (next, attempts) =
                transition(phase, event, state.attempt_count, self.max_retries);
            if next != phase {
                info!(from = %phase, to = %next, attempt = attempts, "Repair transition");
            }
            phase = next;
            state.attempt_count = attempts;
        }
        phase
    }
}
