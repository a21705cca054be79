//! Batch runs over a JSONL question file.
//!
//! Questions run through independent pipelines with bounded concurrency. Records are emitted in
//! input order. Once a stop is requested no new question is dispatched; questions already running
//! finish and their records are still written.

use crate::error::CopilotError;
use crate::pipeline::{Pipeline, PipelineRun};
use crate::synthesis::confidence;
use futures::{future, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// One input line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchQuestion {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub format_hint: Option<String>,
}

/// One output line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: String,
    pub final_answer: Value,
    pub sql: String,
    pub confidence: f64,
    pub explanation: String,
    pub citations: Vec<String>,
}

impl BatchRecord {
    pub fn from_run(id: String, run: &PipelineRun) -> Self {
        let state = &run.state;
        let (final_answer, explanation, citations) = match &state.final_answer {
            Some(answer) => (
                answer.value.to_json(),
                answer.explanation.clone(),
                answer.citations.clone(),
            ),
            None => (Value::Null, "No answer was produced.".to_string(), Vec::new()),
        };
        Self {
            id,
            final_answer,
            sql: state.query_candidate.clone().unwrap_or_default(),
            confidence: confidence(state),
            explanation,
            citations,
        }
    }

    pub fn answered(&self) -> bool {
        !self.final_answer.is_null()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub answered: usize,
    pub failed: usize,
    /// Questions never dispatched because of a stop request
    pub skipped: usize,
    pub interrupted: bool,
}

/// Read a JSONL question file. Blank lines are skipped; a malformed line is an error.
pub fn read_questions(path: &Path) -> Result<Vec<BatchQuestion>, CopilotError> {
    let file = std::fs::File::open(path).map_err(|e| {
        CopilotError::ConfigError(format!("Cannot open batch file {}: {}", path.display(), e))
    })?;
    let mut questions = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let question: BatchQuestion = serde_json::from_str(&line).map_err(|e| {
            CopilotError::ConfigError(format!(
                "{}:{}: invalid batch line: {}",
                path.display(),
                number + 1,
                e
            ))
        })?;
        questions.push(question);
    }
    Ok(questions)
}

/// Flag set on the first Ctrl-C.
pub fn stop_on_ctrl_c() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing questions already running");
            flag.store(true, Ordering::SeqCst);
        }
    });
    stop
}

/// Run every question, handing records to `sink` in input order.
pub async fn run_batch<F>(
    pipeline: Arc<Pipeline>,
    questions: Vec<BatchQuestion>,
    concurrency: usize,
    stop: Arc<AtomicBool>,
    mut sink: F,
) -> Result<BatchSummary, CopilotError>
where
    F: FnMut(&BatchRecord) -> Result<(), CopilotError>,
{
    let mut summary = BatchSummary {
        total: questions.len(),
        ..BatchSummary::default()
    };
    info!(questions = summary.total, concurrency, "Starting batch");

    let gate = Arc::clone(&stop);
    let mut records = futures::stream::iter(questions)
        .take_while(move |_| future::ready(!gate.load(Ordering::SeqCst)))
        .map(|item| {
            let pipeline = Arc::clone(&pipeline);
            async move {
                let run = pipeline.answer(&item.question, item.format_hint).await;
                BatchRecord::from_run(item.id, &run)
            }
        })
        .buffered(concurrency.max(1));

    while let Some(record) = records.next().await {
        if record.answered() {
            summary.answered += 1;
        } else {
            summary.failed += 1;
        }
        sink(&record)?;
    }

    summary.skipped = summary.total - summary.answered - summary.failed;
    summary.interrupted = stop.load(Ordering::SeqCst) && summary.skipped > 0;
    info!(
        answered = summary.answered,
        failed = summary.failed,
        skipped = summary.skipped,
        interrupted = summary.interrupted,
        "Batch finished"
    );
    Ok(summary)
}

/// Run a batch and write JSONL records to `out`, flushing after every record.
pub async fn run_batch_to_file(
    pipeline: Arc<Pipeline>,
    questions: Vec<BatchQuestion>,
    concurrency: usize,
    stop: Arc<AtomicBool>,
    out: &Path,
) -> Result<BatchSummary, CopilotError> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = std::io::BufWriter::new(std::fs::File::create(out)?);
    let summary = run_batch(pipeline, questions, concurrency, stop, |record| {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    })
    .await?;
    Ok(summary)
}

/// Short text for a record's answer in tables.
pub fn preview(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > 60 {
        format!("{}...", text.chars().take(57).collect::<String>())
    } else {
        text
    }
}
