//! Request State
//!
//! The single record threaded through every pipeline stage. Stages read what earlier stages wrote
//! and replace only the fields they own.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Question intent decided by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Answerable from the document corpus alone
    RagOnly,
    /// Needs a database query, optionally grounded in documents
    Hybrid,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::RagOnly => write!(f, "rag_only"),
            Intent::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Ranked snippet from the document corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source_id: String,
    pub score: f64,
}

/// Resolved value of a plan constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintValue {
    /// Inclusive ISO date bounds
    DateRange { start: String, end: String },
    /// Named expression the query must use in place of a missing column or implicit metric
    Substitution { expression: String },
    /// Equality filter on a column
    Filter { column: String, value: String },
}

/// A named constraint with the retrieved sources it was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConstraint {
    pub value: ConstraintValue,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl PlanConstraint {
    /// Render the constraint as a query fragment the generator can copy.
    pub fn render(&self, name: &str) -> String {
        match &self.value {
            ConstraintValue::DateRange { start, end } => {
                format!("{name}: OrderDate BETWEEN '{start}' AND '{end}'")
            }
            ConstraintValue::Substitution { expression } => format!("{name}: {expression}"),
            ConstraintValue::Filter { column, value } => {
                format!("{name}: {column} = '{}'", value.replace('\'', "''"))
            }
        }
    }
}

/// Constraint name to resolved value, ordered by name for stable prompts
pub type PlanConstraints = BTreeMap<String, PlanConstraint>;

/// One result row, column order preserved
pub type Row = Map<String, Value>;

/// Result of the most recent executor invocation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub rows: Vec<Row>,
    pub error_message: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(rows: Vec<Row>) -> Self {
        Self {
            success: true,
            rows,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            rows: Vec::new(),
            error_message: Some(message.into()),
        }
    }
}

/// Typed answer value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Json(Value),
    Null,
}

impl AnswerValue {
    pub fn is_numeric(&self) -> bool {
        matches!(self, AnswerValue::Integer(_) | AnswerValue::Float(_))
    }

    pub fn to_json(&self) -> Value {
        match self {
            AnswerValue::Integer(v) => Value::from(*v),
            AnswerValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AnswerValue::Text(v) => Value::String(v.clone()),
            AnswerValue::Json(v) => v.clone(),
            AnswerValue::Null => Value::Null,
        }
    }
}

/// Terminal output of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub value: AnswerValue,
    pub citations: Vec<String>,
    pub explanation: String,
}

/// Canonical request/response record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestState {
    question: String,
    pub format_hint: Option<String>,
    pub intent: Option<Intent>,
    pub retrieved_context: Vec<RetrievedChunk>,
    pub plan_constraints: PlanConstraints,
    pub query_candidate: Option<String>,
    pub execution_outcome: Option<ExecutionOutcome>,
    pub attempt_count: u32,
    pub final_answer: Option<FinalAnswer>,
}

impl RequestState {
    pub fn new(question: impl Into<String>, format_hint: Option<String>) -> Self {
        Self {
            question: question.into(),
            format_hint,
            intent: None,
            retrieved_context: Vec::new(),
            plan_constraints: PlanConstraints::new(),
            query_candidate: None,
            execution_outcome: None,
            attempt_count: 0,
            final_answer: None,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    /// Record a candidate together with the outcome it produced.
    pub fn record_attempt(&mut self, candidate: Option<String>, outcome: ExecutionOutcome) {
        self.query_candidate = candidate;
        self.execution_outcome = Some(outcome);
    }

    /// Last error reported by the executor, if the last attempt failed.
    pub fn last_error(&self) -> Option<&str> {
        self.execution_outcome
            .as_ref()
            .filter(|outcome| !outcome.success)
            .and_then(|outcome| outcome.error_message.as_deref())
    }

    pub fn succeeded(&self) -> bool {
        self.execution_outcome
            .as_ref()
            .map(|outcome| outcome.success)
            .unwrap_or(false)
    }
}
