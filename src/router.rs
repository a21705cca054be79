//! Intent Router
//!
//! Decides whether a question needs a database lookup. The decision is a fixed cue table over the
//! question's terms, so the same question always routes the same way.

use crate::error::CopilotError;
use crate::retrieval::corpus::tokenize;
use crate::state::Intent;
use tracing::{debug, warn};

/// Aggregation, ranking and filtering vocabulary
const QUANTITATIVE_CUES: &[&str] = &[
    "how many",
    "how much",
    "count",
    "number of",
    "total",
    "sum",
    "average",
    "avg",
    "aov",
    "top",
    "highest",
    "lowest",
    "most",
    "least",
    "margin",
    "profit",
    "between",
];

/// Entities that live in the database
const DATA_CUES: &[&str] = &[
    "order",
    "orders",
    "customer",
    "customers",
    "product",
    "products",
    "category",
    "categories",
    "supplier",
    "suppliers",
    "employee",
    "employees",
    "revenue",
    "sales",
    "sold",
    "quantity",
    "shipped",
];

/// Wording that points at reference documents
const DOCUMENT_CUES: &[&str] = &[
    "policy",
    "return",
    "returns",
    "return window",
    "definition",
    "defined",
    "define",
    "according to",
    "how is",
    "calculated",
    "formula",
    "mean",
    "means",
];

fn matches_any(padded: &str, cues: &[&str]) -> bool {
    cues.iter().any(|cue| padded.contains(&format!(" {} ", cue)))
}

/// Classify a question, failing when no cue fires.
pub fn try_classify(question: &str) -> Result<Intent, CopilotError> {
    let tokens = tokenize(question);
    if tokens.is_empty() {
        return Err(CopilotError::Classification(
            "question has no terms".to_string(),
        ));
    }
    let padded = format!(" {} ", tokens.join(" "));

    let quantitative = matches_any(&padded, QUANTITATIVE_CUES);
    let data = matches_any(&padded, DATA_CUES);
    let document = matches_any(&padded, DOCUMENT_CUES);
    debug!(quantitative, data, document, "Router cues");

    if quantitative && data {
        Ok(Intent::Hybrid)
    } else if document {
        Ok(Intent::RagOnly)
    } else if quantitative || data {
        Ok(Intent::Hybrid)
    } else {
        Err(CopilotError::Classification(format!(
            "no routing cue in '{}'",
            question
        )))
    }
}

/// Classify a question; undecidable questions default to `Hybrid`.
pub fn classify(question: &str) -> Intent {
    match try_classify(question) {
        Ok(intent) => intent,
        Err(err) => {
            warn!(error = %err, "Defaulting to hybrid route");
            Intent::Hybrid
        }
    }
}
