//! Business rules the query must follow when the question touches a KPI.

use crate::state::{ConstraintValue, PlanConstraint, PlanConstraints, RetrievedChunk};

pub const COST_OF_GOODS: &str = "cost_of_goods";
pub const GROSS_MARGIN: &str = "gross_margin";
pub const REVENUE: &str = "revenue";
pub const AVERAGE_ORDER_VALUE: &str = "average_order_value";

/// Net line revenue used by every revenue-derived KPI
pub const LINE_REVENUE: &str = "UnitPrice * Quantity * (1 - Discount)";

struct BusinessRule {
    name: &'static str,
    /// Question phrases that activate the rule
    triggers: &'static [&'static str],
    /// Chunk phrases that count as the rule's definition
    evidence: &'static [&'static str],
    expression: fn(f64) -> String,
}

fn cost_of_goods(fraction: f64) -> String {
    format!("{fraction} * UnitPrice")
}

fn gross_margin(fraction: f64) -> String {
    format!("SUM((UnitPrice - {fraction} * UnitPrice) * Quantity * (1 - Discount))")
}

fn revenue(_: f64) -> String {
    format!("SUM({LINE_REVENUE})")
}

fn average_order_value(_: f64) -> String {
    format!("SUM({LINE_REVENUE}) / COUNT(DISTINCT OrderID)")
}

const RULES: &[BusinessRule] = &[
    BusinessRule {
        name: COST_OF_GOODS,
        triggers: &["margin", "profit", "cost of goods", "cogs", "costofgoods"],
        evidence: &["costofgoods", "cost of goods", "cogs"],
        expression: cost_of_goods,
    },
    BusinessRule {
        name: GROSS_MARGIN,
        triggers: &["margin", "profit"],
        evidence: &["gross margin", "margin"],
        expression: gross_margin,
    },
    BusinessRule {
        name: REVENUE,
        triggers: &["revenue", "sales"],
        evidence: &["revenue"],
        expression: revenue,
    },
    BusinessRule {
        name: AVERAGE_ORDER_VALUE,
        triggers: &["aov", "average order value"],
        evidence: &["aov", "average order value"],
        expression: average_order_value,
    },
];

fn mentions(text: &str, phrase: &str) -> bool {
    let padded = format!(" {} ", normalize(text));
    padded.contains(&format!(" {} ", phrase))
}

fn normalize(text: &str) -> String {
    crate::retrieval::corpus::tokenize(text).join(" ")
}

/// Add every business rule the question triggers.
pub fn apply(
    question: &str,
    context: &[RetrievedChunk],
    cost_fraction: f64,
    constraints: &mut PlanConstraints,
) {
    for rule in RULES {
        if !rule.triggers.iter().any(|t| mentions(question, t)) {
            continue;
        }
        let sources = context
            .iter()
            .filter(|chunk| rule.evidence.iter().any(|e| mentions(&chunk.text, e)))
            .map(|chunk| chunk.source_id.clone())
            .collect();
        constraints.insert(
            rule.name.to_string(),
            PlanConstraint {
                value: ConstraintValue::Substitution {
                    expression: (rule.expression)(cost_fraction),
                },
                sources,
            },
        );
    }
}
