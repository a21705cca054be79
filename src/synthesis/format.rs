//! Deterministic answer formatting: format hints, row shaping, reply clean-up and strict numbers.

use crate::error::CopilotError;
use crate::retrieval::corpus::tokenize;
use crate::state::{AnswerValue, Row};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Rows rendered in a plain-text answer
const TEXT_ROW_LIMIT: usize = 10;

/// Requested answer shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    Int,
    Float,
    Text,
    /// List of records
    List,
    /// Single record
    Object,
    Unspecified,
}

impl FormatHint {
    /// Read a free-form hint such as `int`, `float`, `list[{product:str}]` or `{category:str}`.
    pub fn parse(hint: Option<&str>) -> Self {
        let Some(hint) = hint else {
            return FormatHint::Unspecified;
        };
        let hint = hint.trim().to_ascii_lowercase();
        if hint.starts_with("list") || hint.starts_with('[') || hint.starts_with("array") {
            FormatHint::List
        } else if hint.starts_with('{') || hint.starts_with("dict") || hint.starts_with("object")
        {
            FormatHint::Object
        } else if hint.starts_with("int") {
            FormatHint::Int
        } else if hint.starts_with("float") || hint.starts_with("number") || hint.starts_with("decimal")
        {
            FormatHint::Float
        } else if hint.starts_with("str") || hint.starts_with("text") {
            FormatHint::Text
        } else {
            FormatHint::Unspecified
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FormatHint::Int | FormatHint::Float)
    }

    pub fn is_structured(self) -> bool {
        matches!(self, FormatHint::List | FormatHint::Object)
    }
}

/// Declared type of one field in a record hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    Text,
    Any,
}

/// One `name:type` entry of a record hint
#[derive(Debug, Clone, PartialEq)]
pub struct HintField {
    pub name: String,
    pub kind: FieldType,
}

/// Fields declared by a record hint such as `{customer:str, margin:float}` or
/// `list[{product:str, revenue:float}]`. Empty when the hint names no fields.
pub fn record_fields(hint: &str) -> Vec<HintField> {
    let (Some(open), Some(close)) = (hint.find('{'), hint.rfind('}')) else {
        return Vec::new();
    };
    if close <= open {
        return Vec::new();
    }
    hint[open + 1..close]
        .split(',')
        .filter_map(|entry| {
            let (name, kind) = entry.split_once(':').unwrap_or((entry, ""));
            let name = name.trim().trim_matches(|c| c == '"' || c == '\'');
            if name.is_empty() {
                return None;
            }
            let kind = kind.trim().to_ascii_lowercase();
            let kind = if kind.starts_with("int") {
                FieldType::Int
            } else if kind.starts_with("float") || kind.starts_with("number") || kind.starts_with("decimal") {
                FieldType::Float
            } else if kind.starts_with("str") || kind.starts_with("text") {
                FieldType::Text
            } else {
                FieldType::Any
            };
            Some(HintField {
                name: name.to_string(),
                kind,
            })
        })
        .collect()
}

fn coerce(value: &Value, kind: FieldType) -> Value {
    let number = || match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    };
    match kind {
        FieldType::Int => number()
            .map(|v| Value::from(v.round() as i64))
            .unwrap_or_else(|| value.clone()),
        FieldType::Float => number()
            .map(|v| Value::from(round2(v)))
            .unwrap_or_else(|| value.clone()),
        FieldType::Text => match value {
            Value::Null | Value::String(_) => value.clone(),
            other => Value::String(cell_text(other)),
        },
        FieldType::Any => value.clone(),
    }
}

/// Rename and coerce a row to the hinted fields by column position.
///
/// A row whose width differs from the hint is returned as is.
fn shape_record(row: &Row, fields: &[HintField]) -> Value {
    if fields.is_empty() || fields.len() != row.len() {
        return Value::Object(row.clone());
    }
    Value::Object(
        fields
            .iter()
            .zip(row.values())
            .map(|(field, value)| (field.name.clone(), coerce(value, field.kind)))
            .collect(),
    )
}

/// Whether the question asks for a count.
pub fn is_count_question(question: &str) -> bool {
    let padded = format!(" {} ", tokenize(question).join(" "));
    [" how many ", " count ", " number of "]
        .iter()
        .any(|cue| padded.contains(cue))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn integral(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15).then_some(value as i64)
}

/// Shape one numeric value per the hint and question.
pub fn shape_number(value: f64, hint: FormatHint, count: bool) -> AnswerValue {
    match hint {
        FormatHint::Float => AnswerValue::Float(round2(value)),
        FormatHint::Int => AnswerValue::Integer(value.round() as i64),
        _ => match integral(value) {
            Some(i) => AnswerValue::Integer(i),
            None if count => AnswerValue::Integer(value.round() as i64),
            None => AnswerValue::Float(round2(value)),
        },
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Turn result rows into an answer value. `None` means there is nothing to report.
///
/// Structured hints shape each row into the hinted `fields`, see [`record_fields`].
pub fn format_rows(
    question: &str,
    rows: &[Row],
    hint: FormatHint,
    fields: &[HintField],
) -> Option<AnswerValue> {
    match hint {
        FormatHint::List => {
            return Some(AnswerValue::Json(Value::Array(
                rows.iter().map(|row| shape_record(row, fields)).collect(),
            )))
        }
        FormatHint::Object => {
            return rows
                .first()
                .map(|row| AnswerValue::Json(shape_record(row, fields)))
        }
        _ => {}
    }

    let first = rows.first()?;
    if rows.len() == 1 && first.len() == 1 {
        let cell = first.values().next()?;
        let count = is_count_question(question);
        return match cell {
            Value::Number(n) => n.as_f64().map(|v| shape_number(v, hint, count)),
            Value::String(s) if hint.is_numeric() => {
                Some(strict_number(s, hint, count).unwrap_or_else(|_| AnswerValue::Text(s.clone())))
            }
            Value::String(s) => Some(AnswerValue::Text(s.clone())),
            Value::Null => Some(AnswerValue::Null),
            other => Some(AnswerValue::Json(other.clone())),
        };
    }

    let lines: Vec<String> = rows
        .iter()
        .take(TEXT_ROW_LIMIT)
        .map(|row| {
            if row.len() == 1 {
                row.values().map(cell_text).collect::<Vec<_>>().join("")
            } else {
                row.iter()
                    .map(|(k, v)| format!("{}: {}", k, cell_text(v)))
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        })
        .collect();
    let mut text = lines.join("; ");
    if rows.len() > TEXT_ROW_LIMIT {
        text.push_str(&format!("; ... ({} rows in total)", rows.len()));
    }
    Some(AnswerValue::Text(text))
}

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("number pattern is valid"));

/// First number in the text, shaped per the hint.
pub fn strict_number(text: &str, hint: FormatHint, count: bool) -> Result<AnswerValue, CopilotError> {
    let found = NUMBER_RE
        .find(text)
        .ok_or_else(|| CopilotError::OutputFormat(format!("no number in '{}'", text.trim())))?;
    let value: f64 = found
        .as_str()
        .replace(',', "")
        .parse()
        .map_err(|e| CopilotError::OutputFormat(format!("'{}': {}", found.as_str(), e)))?;
    Ok(shape_number(value, hint, count))
}

/// Conversational openers stripped from model replies
static WRAPPER_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^(?:sure|certainly|of course|okay|ok)[,!.]?\s*",
        r"(?i)^(?:here(?:'s| is) (?:the|your) answer)[:.,]?\s*",
        r"(?i)^(?:based on|according to) the (?:provided |given |retrieved )?(?:context|documents?|information)[^,:]*[,:]\s*",
        r"(?i)^(?:final\s+)?answer\s*:\s*",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[?\b[\w.-]+::chunk\d+\b\]?").expect("citation pattern is valid")
});

/// Source ids of the form `<stem>::chunk<i>` mentioned in the text.
pub fn cited_sources(text: &str) -> Vec<String> {
    CITATION_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_matches(|c| c == '[' || c == ']').to_string())
        .collect()
}

/// Strip conversational wrapping from a model reply.
pub fn clean_reply(reply: &str) -> String {
    let body: Vec<&str> = reply
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .filter(|line| {
            let lower = line.trim().to_ascii_lowercase();
            !(lower.starts_with("let me know") || lower.starts_with("i hope this"))
        })
        .collect();
    let mut text = body.join("\n").trim().to_string();

    // Wrappers can stack ("Sure! Answer: ...").
    loop {
        let before = text.len();
        for re in WRAPPER_RES.iter() {
            text = re.replace(&text, "").trim_start().to_string();
        }
        if text.len() == before {
            break;
        }
    }

    let text = CITATION_RE.replace_all(&text, "");
    let text = text
        .replace(" .", ".")
        .replace("( )", "")
        .replace("()", "");
    text.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}
