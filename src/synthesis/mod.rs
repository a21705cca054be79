//! Answer Synthesis
//!
//! Produces the final typed answer. Database answers are formatted deterministically from the
//! result rows; document answers come from the model and pass through a fixed clean-up pass.

pub mod format;

use crate::error::CopilotError;
use crate::planner::constraint_sources;
use crate::provider::{ChatMessage, CompletionOptions, ModelProviderClient};
use crate::repair::RepairPhase;
use crate::state::{AnswerValue, FinalAnswer, Intent, RequestState, RetrievedChunk};
use format::{
    clean_reply, cited_sources, format_rows, is_count_question, record_fields, strict_number,
    FormatHint,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const RAG_SYSTEM_PROMPT: &str = "Answer the question using only the numbered context sections.
Reply with the answer alone, no preamble. Cite the section ids you used in square brackets.
If the context does not contain the answer, reply: unknown";

/// Order `ids` by their position in the retrieved context, dropping duplicates and unknown ids.
fn in_retrieval_order(ids: &[String], context: &[RetrievedChunk]) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::new();
    for chunk in context {
        if ids.contains(&chunk.source_id) && !ordered.contains(&chunk.source_id) {
            ordered.push(chunk.source_id.clone());
        }
    }
    ordered
}

/// Heuristic confidence in `[0, 1]` for batch output.
pub fn confidence(state: &RequestState) -> f64 {
    let score = match state.intent {
        Some(Intent::Hybrid) if state.succeeded() => {
            let empty = state
                .execution_outcome
                .as_ref()
                .map(|o| o.rows.is_empty())
                .unwrap_or(true);
            0.9 - 0.15 * f64::from(state.attempt_count) - if empty { 0.3 } else { 0.0 }
        }
        Some(Intent::Hybrid) | None => 0.1,
        Some(Intent::RagOnly) => match state.retrieved_context.first() {
            Some(top) => 0.5 + 0.4 * (top.score / (top.score + 1.0)).clamp(0.0, 1.0),
            None => 0.2,
        },
    };
    let score = match &state.final_answer {
        Some(answer) if answer.value == AnswerValue::Null => score.min(0.1),
        _ => score,
    };
    format::round2(score.clamp(0.0, 1.0))
}

pub struct Synthesizer {
    model: Arc<dyn ModelProviderClient>,
    options: CompletionOptions,
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn ModelProviderClient>, options: CompletionOptions, timeout: Duration) -> Self {
        Self {
            model,
            options,
            timeout,
        }
    }

    /// Build the final answer. Never fails: problems end up in the explanation.
    pub async fn synthesize(&self, state: &RequestState, phase: Option<RepairPhase>) -> FinalAnswer {
        match state.intent {
            Some(Intent::RagOnly) => self.answer_from_documents(state).await,
            _ => answer_from_rows(state, phase),
        }
    }

    async fn answer_from_documents(&self, state: &RequestState) -> FinalAnswer {
        let hint = FormatHint::parse(state.format_hint.as_deref());
        let context = &state.retrieved_context;
        if context.is_empty() {
            return FinalAnswer {
                value: AnswerValue::Null,
                citations: Vec::new(),
                explanation: "No document section matched the question.".to_string(),
            };
        }

        let reply = match self.ask(state).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "Document answer failed");
                return FinalAnswer {
                    value: AnswerValue::Null,
                    citations: Vec::new(),
                    explanation: format!("Could not answer from documents: {}", err),
                };
            }
        };

        let mut citations = in_retrieval_order(&cited_sources(&reply), context);
        if citations.is_empty() {
            citations.push(context[0].source_id.clone());
        }
        let text = clean_reply(&reply);
        let count = is_count_question(state.question());

        let (value, explanation) = if hint.is_numeric() || count {
            match strict_number(&text, hint, count) {
                Ok(value) => (value, "Extracted from the cited documents.".to_string()),
                Err(err) => {
                    debug!(error = %err, "Falling back to raw text");
                    (
                        AnswerValue::Text(text.clone()),
                        format!("Answered from documents; {}", err),
                    )
                }
            }
        } else if hint.is_structured() {
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(json) => (AnswerValue::Json(json), "Answered from documents.".to_string()),
                Err(err) => (
                    AnswerValue::Text(text.clone()),
                    format!("Answered from documents; reply was not JSON: {}", err),
                ),
            }
        } else {
            (AnswerValue::Text(text), "Answered from documents.".to_string())
        };

        FinalAnswer {
            value,
            citations,
            explanation,
        }
    }

    async fn ask(&self, state: &RequestState) -> Result<String, CopilotError> {
        let sections = state
            .retrieved_context
            .iter()
            .map(|chunk| format!("[{}]\n{}", chunk.source_id, chunk.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut request = format!("Context:\n{}\n\nQuestion: {}", sections, state.question());
        if let Some(hint) = &state.format_hint {
            request.push_str(&format!("\nAnswer format: {}", hint));
        }
        let messages = vec![ChatMessage::system(RAG_SYSTEM_PROMPT), ChatMessage::user(request)];

        let response = tokio::time::timeout(
            self.timeout,
            self.model.complete(messages, self.options.clone()),
        )
        .await
        .map_err(|_| CopilotError::Timeout(format!("document answer exceeded {:?}", self.timeout)))??;
        let reply = response.content.trim().to_string();
        if reply.is_empty() {
            return Err(CopilotError::OutputFormat("empty model reply".to_string()));
        }
        Ok(reply)
    }
}

/// Deterministic answer for database questions.
pub fn answer_from_rows(state: &RequestState, phase: Option<RepairPhase>) -> FinalAnswer {
    let citations = in_retrieval_order(
        &constraint_sources(&state.plan_constraints),
        &state.retrieved_context,
    );

    let outcome = match &state.execution_outcome {
        Some(outcome) if outcome.success => outcome,
        other => {
            let error = other
                .as_ref()
                .and_then(|o| o.error_message.clone())
                .unwrap_or_else(|| "no query was run".to_string());
            let explanation = match phase {
                Some(RepairPhase::Aborted) => format!("Query generation failed: {}", error),
                _ => format!(
                    "Query still failing after {} repair attempt(s): {}",
                    state.attempt_count, error
                ),
            };
            return FinalAnswer {
                value: AnswerValue::Null,
                citations,
                explanation,
            };
        }
    };

    let hint = FormatHint::parse(state.format_hint.as_deref());
    let fields = state
        .format_hint
        .as_deref()
        .map(record_fields)
        .unwrap_or_default();
    let value = format_rows(state.question(), &outcome.rows, hint, &fields);
    let mut explanation = match &value {
        Some(_) => format!("Computed from {} row(s) returned by the query", outcome.rows.len()),
        None => "The query returned no rows".to_string(),
    };
    if !state.plan_constraints.is_empty() {
        let names: Vec<&str> = state.plan_constraints.keys().map(String::as_str).collect();
        explanation.push_str(&format!(" with {}", names.join(", ")));
    }
    if state.attempt_count > 0 {
        explanation.push_str(&format!(" after {} repair(s)", state.attempt_count));
    }
    explanation.push('.');

    FinalAnswer {
        value: value.unwrap_or(AnswerValue::Null),
        citations,
        explanation,
    }
}
