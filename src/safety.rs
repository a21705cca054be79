//! Safety Net
//!
//! Guard and rewrite pass applied to every generated query before it reaches the engine. The
//! guard rejects anything but a single read-only statement. The rewrite pass is an ordered table of
//! rules that translate other SQL dialects into SQLite and replace cost columns the schema does not
//! have. String literals, quoted identifiers and comments are never rewritten.
//!
//! Running the rewrite pass twice gives the same query as running it once.

use crate::error::EngineError;
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::debug;

/// Keywords that never appear in a read-only query
const MUTATING_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "attach", "detach", "pragma",
    "vacuum", "reindex", "truncate", "grant", "revoke", "merge", "upsert",
];

/// Column names that stand for a product cost the dataset does not record
const COST_COLUMNS: &str = "costofgoods|cost_of_goods|cogs|unitcost|unit_cost|standardcost|cost";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__s[nc](\d+)__").expect("placeholder pattern is valid"));

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__sc\d+__").expect("comment pattern is valid"));

static EXTRACT_ARGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(year|month|day)\s+from\s+(.+?)\s*$").expect("pattern is valid")
});

/// Trailing terminators, whitespace and comments after the last clause
static STATEMENT_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\s|;|__sc\d+__)*$").expect("tail pattern is valid"));

static LIMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blimit\b").expect("limit pattern is valid"));

static RULES: LazyLock<Vec<SafetyRule>> = LazyLock::new(build_rules);

/// Replace literals, quoted identifiers and comments with placeholders.
///
/// Comments get `__sc<i>__`, everything else `__sn<i>__`, sharing one index space.
fn protect(query: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(query.len());
    let mut saved = Vec::new();
    let chars: Vec<char> = query.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let (end, marker) = match c {
            '\'' | '"' => {
                let mut j = i + 1;
                let end = loop {
                    match chars.get(j) {
                        None => break j,
                        Some(&q) if q == c => {
                            if chars.get(j + 1) == Some(&c) {
                                j += 2;
                            } else {
                                break j + 1;
                            }
                        }
                        Some(_) => j += 1,
                    }
                };
                (end, 'n')
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let mut j = i + 2;
                while j < chars.len() && chars[j] != '\n' {
                    j += 1;
                }
                (j, 'c')
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let mut j = i + 2;
                while j < chars.len() && !(chars[j] == '*' && chars.get(j + 1) == Some(&'/')) {
                    j += 1;
                }
                ((j + 2).min(chars.len()), 'c')
            }
            _ => {
                out.push(c);
                i += 1;
                continue;
            }
        };
        out.push_str(&format!("__s{}{}__", marker, saved.len()));
        saved.push(chars[i..end].iter().collect());
        i = end;
    }
    (out, saved)
}

fn restore(text: &str, saved: &[String]) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| saved.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// The first statement of `text` up to and including its `;`.
///
/// Semicolons inside literals, quoted identifiers and comments do not end a statement. Returns
/// `None` when there is no terminator.
pub(crate) fn first_statement(text: &str) -> Option<String> {
    let (masked, saved) = protect(text);
    let end = masked.find(';')?;
    Some(restore(&masked[..=end], &saved))
}

/// Parenthesis depth at the end of an already protected `text`
fn depth(text: &str) -> i32 {
    text.chars().fold(0, |d, c| match c {
        '(' => d + 1,
        ')' => d - 1,
        _ => d,
    })
}

/// Reject anything other than one read-only `SELECT` or `WITH` statement.
pub fn guard(query: &str) -> Result<(), EngineError> {
    let (masked, _) = protect(query);
    let masked = COMMENT_RE.replace_all(&masked, " ");
    let body = masked.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if body.is_empty() {
        return Err(EngineError::Disallowed("empty query".to_string()));
    }
    if body.contains(';') {
        return Err(EngineError::Disallowed(
            "multiple statements are not allowed".to_string(),
        ));
    }

    let lowered = body.to_ascii_lowercase();
    let first = lowered
        .trim_start_matches('(')
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .find(|w| !w.is_empty())
        .unwrap_or_default();
    if first != "select" && first != "with" {
        return Err(EngineError::Disallowed(format!(
            "only SELECT or WITH statements may run, got '{}'",
            first
        )));
    }

    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .collect();
    if let Some(keyword) = MUTATING_KEYWORDS.iter().find(|k| words.contains(*k)) {
        return Err(EngineError::Disallowed(format!(
            "'{}' is not allowed in a read-only query",
            keyword.to_ascii_uppercase()
        )));
    }
    Ok(())
}

/// Settings rewrites depend on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewriteSettings {
    /// Share of `UnitPrice` used as the cost of goods
    pub cost_fraction: f64,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self { cost_fraction: 0.7 }
    }
}

/// One entry of the rewrite table
pub struct SafetyRule {
    pub rule_id: &'static str,
    pub matcher: Regex,
    rewrite: fn(&Regex, &str, &RewriteSettings) -> String,
}

impl SafetyRule {
    pub fn matches(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }

    /// Apply this rule alone to an already protected query.
    fn apply_protected(&self, text: &str, settings: &RewriteSettings) -> String {
        if self.matches(text) {
            (self.rewrite)(&self.matcher, text, settings)
        } else {
            text.to_string()
        }
    }

    /// Apply this rule alone to a raw query.
    pub fn apply(&self, query: &str, settings: &RewriteSettings) -> String {
        let (masked, saved) = protect(query);
        restore(&self.apply_protected(&masked, settings), &saved)
    }
}

impl std::fmt::Debug for SafetyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyRule")
            .field("rule_id", &self.rule_id)
            .field("matcher", &self.matcher.as_str())
            .finish()
    }
}

/// Rewrite every call matched by `re`, handing the balanced argument text to `build`.
///
/// `build` returns `None` to leave a call untouched.
fn rewrite_calls(
    re: &Regex,
    text: &str,
    build: impl Fn(&Captures, &str) -> Option<String>,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() < cursor {
            continue;
        }
        // The match ends just past the opening parenthesis.
        let mut depth = 1;
        let mut close = None;
        for (offset, c) in text[whole.end()..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(whole.end() + offset);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(close) = close else { continue };
        if let Some(replacement) = build(&caps, &text[whole.end()..close]) {
            out.push_str(&text[cursor..whole.start()]);
            out.push_str(&replacement);
            cursor = close + 1;
        }
    }
    out.push_str(&text[cursor..]);
    out
}

fn strftime_format(part: &str) -> Option<&'static str> {
    match part.to_ascii_lowercase().as_str() {
        "year" => Some("%Y"),
        "month" => Some("%m"),
        "day" => Some("%d"),
        _ => None,
    }
}

fn rewrite_extract(re: &Regex, text: &str, _: &RewriteSettings) -> String {
    rewrite_calls(re, text, |_, args| {
        let caps = EXTRACT_ARGS_RE.captures(args)?;
        let format = strftime_format(&caps[1])?;
        Some(format!(
            "CAST(strftime('{}', {}) AS INTEGER)",
            format, &caps[2]
        ))
    })
}

fn rewrite_date_part(re: &Regex, text: &str, _: &RewriteSettings) -> String {
    rewrite_calls(re, text, |caps, args| {
        let format = strftime_format(&caps[1])?;
        Some(format!(
            "CAST(strftime('{}', {}) AS INTEGER)",
            format,
            args.trim()
        ))
    })
}

fn rewrite_current_date(re: &Regex, text: &str, _: &RewriteSettings) -> String {
    re.replace_all(text, "date('now')").into_owned()
}

/// Move `TOP n` of the outermost `SELECT` to a trailing `LIMIT n`.
///
/// `SELECT`s nested in parentheses, such as CTE bodies and subqueries, keep their `TOP`. When the
/// statement already ends in a `LIMIT` the `TOP` is dropped without adding another one.
fn rewrite_top(re: &Regex, text: &str, _: &RewriteSettings) -> String {
    let Some(caps) = re
        .captures_iter(text)
        .find(|caps| caps.get(1).is_some_and(|m| depth(&text[..m.start()]) == 0))
    else {
        return text.to_string();
    };
    let (Some(whole), Some(prefix)) = (caps.get(0), caps.get(1)) else {
        return text.to_string();
    };
    let limit = &caps[2];
    let rest = &text[whole.end()..];
    let has_limit = LIMIT_RE
        .find_iter(rest)
        .any(|m| depth(&rest[..m.start()]) == 0);
    if has_limit {
        return format!("{}{}{}", &text[..prefix.start()], prefix.as_str(), rest);
    }

    let tail_start = STATEMENT_TAIL_RE
        .find(rest)
        .map(|m| m.start())
        .unwrap_or(rest.len());
    let (body, tail) = rest.split_at(tail_start);
    let tail = tail.trim_start();
    let gap = if tail.is_empty() || tail.starts_with(';') { "" } else { " " };
    format!(
        "{}{}{} LIMIT {}{}{}",
        &text[..prefix.start()],
        prefix.as_str(),
        body,
        limit,
        gap,
        tail
    )
}

fn rewrite_fetch_first(re: &Regex, text: &str, _: &RewriteSettings) -> String {
    re.replace_all(text, "LIMIT $1").into_owned()
}

fn rewrite_cost_column(re: &Regex, text: &str, settings: &RewriteSettings) -> String {
    re.replace_all(text, |caps: &Captures| {
        let whole = &caps[0];
        let start = caps.get(0).map(|m| m.start()).unwrap_or_default();
        let before = text[..start].trim_end().to_ascii_lowercase();
        // An alias name is a label, not a column reference.
        if before.ends_with(" as") || before == "as" {
            return whole.to_string();
        }
        match caps.get(1) {
            Some(alias) => format!(
                "({} * {}.UnitPrice)",
                settings.cost_fraction,
                alias.as_str()
            ),
            None => format!("({} * UnitPrice)", settings.cost_fraction),
        }
    })
    .into_owned()
}

fn build_rules() -> Vec<SafetyRule> {
    let table: [(&'static str, String, fn(&Regex, &str, &RewriteSettings) -> String); 6] = [
        (
            "extract_date_part",
            r"(?i)\bextract\s*\(".to_string(),
            rewrite_extract,
        ),
        (
            "date_part_function",
            r"(?i)\b(year|month|day)\s*\(".to_string(),
            rewrite_date_part,
        ),
        (
            "current_date_function",
            r"(?i)\b(?:now|getdate|curdate|current_date|sysdate)\s*\(\s*\)".to_string(),
            rewrite_current_date,
        ),
        (
            "fetch_first",
            r"(?i)\bfetch\s+(?:first|next)\s+(\d+)\s+rows?\s+only\b".to_string(),
            rewrite_fetch_first,
        ),
        (
            "select_top",
            r"(?is)(?:^|[^a-z0-9_]|__)(select\s+(?:distinct\s+)?)top\s*\(?\s*(\d+)\s*\)?\s+".to_string(),
            rewrite_top,
        ),
        (
            "cost_column",
            format!(
                r"(?i)\b(?:([A-Za-z_][A-Za-z0-9_]*)\s*\.\s*)?(?:{})\b",
                COST_COLUMNS
            ),
            rewrite_cost_column,
        ),
    ];
    table
        .into_iter()
        .map(|(rule_id, pattern, rewrite)| SafetyRule {
            rule_id,
            matcher: Regex::new(&pattern).expect("safety rule pattern is valid"),
            rewrite,
        })
        .collect()
}

/// The rewrite table, in application order.
pub fn rules() -> &'static [SafetyRule] {
    &RULES
}

/// Result of the rewrite pass
#[derive(Debug, Clone, PartialEq)]
pub struct Rewritten {
    pub query: String,
    /// Ids of the rules that changed the query
    pub applied: Vec<&'static str>,
}

/// Run every rule in order.
pub fn rewrite(query: &str, settings: &RewriteSettings) -> Rewritten {
    let (mut masked, saved) = protect(query);
    let mut applied = Vec::new();
    for rule in rules() {
        let next = rule.apply_protected(&masked, settings);
        if next != masked {
            applied.push(rule.rule_id);
            masked = next;
        }
    }
    let query = restore(&masked, &saved);
    if !applied.is_empty() {
        debug!(rules = ?applied, query = %query, "Safety net rewrote query");
    }
    Rewritten { query, applied }
}
