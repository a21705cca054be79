//! Query Generation
//!
//! Builds the generator prompt, calls the model under a deadline and cleans the reply down to a
//! single query.

pub mod prompt;

pub use prompt::{PriorAttempt, PromptContext};

use crate::error::CopilotError;
use crate::fewshot::FewShotArtifact;
use crate::provider::{CompletionOptions, ModelProviderClient};
use crate::safety;
use crate::state::PlanConstraints;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, warn};

/// A markdown code block, closed or running to the end of the reply
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[^\n`]*\n(.*?)(?:```|\z)").expect("fence pattern is valid")
});

static SQL_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:sql|query)\s*:\s*").expect("label pattern is valid")
});

const QUERY_START: &str =
    r"(?:select\b|with\s+(?:recursive\s+)?[A-Za-z_][A-Za-z0-9_]*\s*(?:\([^)]*\)\s*)?as\s*\()";

/// A query opening a line
static LINE_QUERY_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?im)^[ \t]*{}", QUERY_START)).expect("query start pattern is valid")
});

/// A query opening anywhere, as in `Here it is: SELECT ...`
static QUERY_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b{}", QUERY_START)).expect("query start pattern is valid")
});

/// A line opening with a statement that writes. Kept so the executor guard can reject it.
static LINE_WRITE_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:insert|update|delete|replace|drop|alter|create|attach|detach|pragma|vacuum|reindex|truncate|merge|upsert)\b",
    )
    .expect("statement start pattern is valid")
});

/// Reduce a model reply to the query it contains.
///
/// A fenced code block holding a query wins over the surrounding prose. Otherwise the query starts
/// at the first line opening with `SELECT`/`WITH`, then the first `SELECT` anywhere, then the
/// first line opening with a writing statement. `SQL:` labels are dropped and the query ends at
/// its first `;` outside literals and comments. Returns `None` when no query is left.
pub fn extract_query(reply: &str) -> Option<String> {
    let fenced = FENCE_RE
        .captures_iter(reply)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|body| QUERY_START_RE.is_match(body) || LINE_WRITE_START_RE.is_match(body));
    let unlabeled = SQL_LABEL_RE.replace_all(fenced.unwrap_or(reply), "");

    let start = LINE_QUERY_START_RE
        .find(&unlabeled)
        .or_else(|| QUERY_START_RE.find(&unlabeled))
        .or_else(|| LINE_WRITE_START_RE.find(&unlabeled))?
        .start();
    let body = &unlabeled[start..];
    let query = match safety::first_statement(body) {
        Some(statement) => statement,
        None if fenced.is_some() => body.to_string(),
        None => body.split("\n\n").next().unwrap_or(body).to_string(),
    };
    let query = query.trim().trim_end_matches('`').trim_end();
    (!query.is_empty()).then(|| query.to_string())
}

/// Model-backed query generator
#[derive(Clone)]
pub struct QueryGenerator {
    model: Arc<dyn ModelProviderClient>,
    options: CompletionOptions,
    timeout: Duration,
    demonstrations: usize,
}

impl QueryGenerator {
    pub fn new(
        model: Arc<dyn ModelProviderClient>,
        options: CompletionOptions,
        timeout: Duration,
        demonstrations: usize,
    ) -> Self {
        Self {
            model,
            options,
            timeout,
            demonstrations,
        }
    }

    /// Generate one query candidate.
    ///
    /// A backend that does not answer within the deadline yields `Timeout`. Any other backend
    /// failure, or a reply without a query, yields `GenerationFailed`.
    pub async fn generate(
        &self,
        question: &str,
        schema: &str,
        constraints: &PlanConstraints,
        prior: Option<&PriorAttempt>,
        artifact: Option<&FewShotArtifact>,
    ) -> Result<String, CopilotError> {
        let context = PromptContext {
            question,
            schema,
            constraints,
            demonstrations: artifact
                .map(|a| a.select(question, self.demonstrations))
                .unwrap_or_default(),
            prior,
        };
        let messages = context.render();
        debug!(
            messages = messages.len(),
            repair = prior.is_some(),
            prompt = %messages.last().map(|m| m.content.as_str()).unwrap_or_default(),
            "Generating query"
        );

        let response = match tokio::time::timeout(
            self.timeout,
            self.model.complete(messages, self.options.clone()),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(CopilotError::Timeout(msg))) => return Err(CopilotError::Timeout(msg)),
            Ok(Err(err)) => {
                warn!(error = %err, provider = self.model.provider_name(), "Model call failed");
                return Err(CopilotError::GenerationFailed(err.to_string()));
            }
            Err(_) => {
                return Err(CopilotError::Timeout(format!(
                    "query generation exceeded {:?}",
                    self.timeout
                )))
            }
        };

        let query = extract_query(&response.content).ok_or_else(|| {
            CopilotError::GenerationFailed(format!(
                "model reply contained no query: '{}'",
                response.content.trim()
            ))
        })?;
        debug!(query = %query, "Generated query");
        Ok(query)
    }
}
