//! Constraint Planner
//!
//! Turns the question and its retrieved context into named, resolved constraints: a concrete date
//! range, KPI substitutions, and a category filter. Every constraint records the chunks it was
//! derived from so citations can be traced back to documents.

pub mod dates;
pub mod rules;

use crate::config::{DatasetConfig, PipelineConfig};
use crate::error::CopilotError;
use crate::state::{ConstraintValue, PlanConstraint, PlanConstraints, RetrievedChunk};
use chrono::NaiveDate;
use tracing::{debug, warn};

pub const DATE_RANGE: &str = "date_range";
pub const CATEGORY: &str = "category";

/// Dataset facts the planner resolves against
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    pub valid_start: NaiveDate,
    pub valid_end: NaiveDate,
    pub cost_fraction: f64,
    pub categories: Vec<String>,
}

impl PlannerSettings {
    pub fn from_config(
        dataset: &DatasetConfig,
        pipeline: &PipelineConfig,
    ) -> Result<Self, CopilotError> {
        let parse = |value: &str| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
                CopilotError::ConfigError(format!("Invalid dataset date '{}': {}", value, e))
            })
        };
        Ok(Self {
            valid_start: parse(&dataset.valid_start)?,
            valid_end: parse(&dataset.valid_end)?,
            cost_fraction: pipeline.cost_fraction,
            categories: dataset.categories.clone(),
        })
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self::from_config(&DatasetConfig::default(), &PipelineConfig::default())
            .unwrap_or(Self {
                valid_start: NaiveDate::MIN,
                valid_end: NaiveDate::MAX,
                cost_fraction: 0.7,
                categories: Vec::new(),
            })
    }
}

/// Resolve the date range constraint.
///
/// Returns `PlanningAmbiguity` when the phrase falls entirely outside the dataset.
pub fn resolve_date_range(
    question: &str,
    context: &[RetrievedChunk],
    settings: &PlannerSettings,
) -> Result<Option<PlanConstraint>, CopilotError> {
    let Some(phrase) = dates::resolve(question, context) else {
        return Ok(None);
    };
    let (start, end) = dates::clamp(
        phrase.start,
        phrase.end,
        settings.valid_start,
        settings.valid_end,
    )
    .ok_or_else(|| {
        CopilotError::PlanningAmbiguity(format!(
            "'{}' resolves to {}..{}, outside the data ({}..{})",
            phrase.text, phrase.start, phrase.end, settings.valid_start, settings.valid_end
        ))
    })?;
    if (start, end) != (phrase.start, phrase.end) {
        debug!(phrase = %phrase.text, %start, %end, "Clamped date range to dataset bounds");
    }
    Ok(Some(PlanConstraint {
        value: ConstraintValue::DateRange {
            start: start.format("%Y-%m-%d").to_string(),
            end: end.format("%Y-%m-%d").to_string(),
        },
        sources: phrase.sources,
    }))
}

/// Earliest category named in the question, skipping text inside date phrases.
fn resolve_category(
    question: &str,
    context: &[RetrievedChunk],
    settings: &PlannerSettings,
) -> Option<PlanConstraint> {
    let lowered = question.to_ascii_lowercase();
    let date_spans: Vec<(usize, usize)> = dates::find_phrases(question, context)
        .into_iter()
        .map(|p| p.span)
        .collect();

    let (_, category) = settings
        .categories
        .iter()
        .filter_map(|category| {
            let needle = category.to_ascii_lowercase();
            lowered
                .match_indices(&needle)
                .map(|(pos, _)| pos)
                .find(|pos| {
                    !date_spans
                        .iter()
                        .any(|(start, end)| *pos >= *start && *pos < *end)
                })
                .map(|pos| (pos, category))
        })
        .min_by_key(|(pos, _)| *pos)?;

    let needle = category.to_lowercase();
    let sources = context
        .iter()
        .filter(|chunk| chunk.text.to_lowercase().contains(&needle))
        .map(|chunk| chunk.source_id.clone())
        .collect();
    Some(PlanConstraint {
        value: ConstraintValue::Filter {
            column: "CategoryName".to_string(),
            value: category.clone(),
        },
        sources,
    })
}

/// Build the constraint map for a question.
///
/// Constraints that cannot be resolved are left out; the generator then works without them.
pub fn plan(
    question: &str,
    context: &[RetrievedChunk],
    settings: &PlannerSettings,
) -> PlanConstraints {
    let mut constraints = PlanConstraints::new();

    match resolve_date_range(question, context, settings) {
        Ok(Some(range)) => {
            constraints.insert(DATE_RANGE.to_string(), range);
        }
        Ok(None) => {}
        Err(err) => warn!(error = %err, "Dropping date constraint"),
    }

    rules::apply(question, context, settings.cost_fraction, &mut constraints);

    if let Some(category) = resolve_category(question, context, settings) {
        constraints.insert(CATEGORY.to_string(), category);
    }

    debug!(
        constraints = ?constraints.keys().collect::<Vec<_>>(),
        "Planned constraints"
    );
    constraints
}

/// Sources behind every constraint, deduplicated in first-seen order.
pub fn constraint_sources(constraints: &PlanConstraints) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for constraint in constraints.values() {
        for source in &constraint.sources {
            if !sources.contains(source) {
                sources.push(source.clone());
            }
        }
    }
    sources
}
