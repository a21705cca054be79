//! Presentation: answer, batch summary and diagnostic formatters.

use crate::batch::{preview, BatchRecord, BatchSummary};
use crate::diagnose::DiagnosticReport;
use crate::error::CopilotError;
use crate::pipeline::PipelineRun;
use crate::synthesis::confidence;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

fn to_json_string(value: &impl serde::Serialize) -> Result<String, CopilotError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CopilotError::ConfigError(format!("Failed to render JSON: {}", e)))
}

pub fn format_answer_json(id: &str, run: &PipelineRun) -> Result<String, CopilotError> {
    to_json_string(&BatchRecord::from_run(id.to_string(), run))
}

pub fn format_answer_text(run: &PipelineRun) -> String {
    let state = &run.state;
    let Some(answer) = &state.final_answer else {
        return "No answer.".to_string();
    };
    let value = preview(&answer.value.to_json());
    let mut lines = vec![format!("{} {}", "Answer:".bold(), value)];
    if let Some(intent) = state.intent {
        lines.push(format!("Route: {}", intent));
    }
    if let Some(sql) = &state.query_candidate {
        lines.push(format!("SQL: {}", sql));
    }
    if let Some(phase) = run.phase {
        lines.push(format!("Repairs: {} ({})", state.attempt_count, phase));
    }
    lines.push(format!("Confidence: {:.2}", confidence(state)));
    if answer.citations.is_empty() {
        lines.push("Citations: none".to_string());
    } else {
        lines.push(format!("Citations: {}", answer.citations.join(", ")));
    }
    lines.push(format!("Explanation: {}", answer.explanation));
    lines.join("\n")
}

pub fn format_batch_summary(summary: &BatchSummary, out: &std::path::Path) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Questions", "Answered", "Failed", "Skipped"]);
    table.add_row(vec![
        summary.total.to_string(),
        summary.answered.to_string(),
        summary.failed.to_string(),
        summary.skipped.to_string(),
    ]);
    let status = if summary.interrupted {
        format!("{}", "Interrupted: output holds the completed prefix".yellow())
    } else if summary.failed > 0 {
        format!("{}", "Completed with unanswered questions".yellow())
    } else {
        format!("{}", "Completed".green())
    };
    format!("{}\n{}\nWrote {}", table, status, out.display())
}

pub fn format_diagnostic_report(
    report: &DiagnosticReport,
    format: &str,
) -> Result<String, CopilotError> {
    if format == "json" {
        return to_json_string(report);
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Check", "Status", "Detail"]);
    for check in &report.checks {
        let status = if check.passed {
            format!("{}", "ok".green())
        } else {
            format!("{}", "FAIL".red())
        };
        table.add_row(vec![check.name.clone(), status, check.detail.clone()]);
    }
    Ok(table.to_string())
}
