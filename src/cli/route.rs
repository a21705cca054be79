//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::batch::{read_questions, run_batch_to_file, stop_on_ctrl_c};
use crate::config::{ConfigLoader, CopilotConfig};
use crate::diagnose::diagnose;
use crate::engine::{DataEngine, SqliteEngine};
use crate::error::CopilotError;
use crate::pipeline::Pipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing::info;

use crate::cli::command_name;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_answer_json, format_answer_text, format_batch_summary, format_diagnostic_report,
};

/// Runtime context for CLI execution: workspace, effective config and the async runtime.
/// Built from workspace path and optional config path using ConfigLoader only.
pub struct RunContext {
    config: CopilotConfig,
    workspace_root: PathBuf,
    runtime: Runtime,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, CopilotError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        let runtime = Runtime::new()
            .map_err(|e| CopilotError::ConfigError(format!("Failed to create runtime: {}", e)))?;
        Ok(Self {
            config,
            workspace_root,
            runtime,
        })
    }

    pub fn config(&self) -> &CopilotConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, CopilotError> {
        let started = Instant::now();
        let result = self.execute_inner(command);
        info!(
            command = command_name(command),
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, CopilotError> {
        match command {
            Commands::Run {
                batch,
                out,
                concurrency,
            } => self.handle_run(batch, out, *concurrency),
            Commands::Ask {
                question,
                format_hint,
                format,
            } => self.handle_ask(question, format_hint.clone(), format),
            Commands::Diagnose { format } => {
                let report = self
                    .runtime
                    .block_on(diagnose(&self.config, &self.workspace_root));
                format_diagnostic_report(&report, format)
            }
            Commands::Schema => {
                let paths = self.config.paths.resolved(&self.workspace_root);
                let engine = SqliteEngine::new(
                    paths.database,
                    self.config.pipeline.max_rows,
                    self.config.dataset.tables.clone(),
                );
                Ok(engine.describe_schema()?)
            }
            Commands::Config => self.config.to_toml(),
        }
    }

    fn validated_pipeline(&self) -> Result<Pipeline, CopilotError> {
        if let Err(errors) = self.config.validate() {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CopilotError::ConfigError(joined));
        }
        // Provider clients build their HTTP stack inside the runtime.
        let _guard = self.runtime.enter();
        Pipeline::from_config(&self.config, &self.workspace_root)
    }

    fn handle_ask(
        &self,
        question: &str,
        format_hint: Option<String>,
        format: &str,
    ) -> Result<String, CopilotError> {
        let pipeline = self.validated_pipeline()?;
        let run = self.runtime.block_on(pipeline.answer(question, format_hint));
        if format == "json" {
            format_answer_json("ask", &run)
        } else {
            Ok(format_answer_text(&run))
        }
    }

    fn handle_run(
        &self,
        batch: &Path,
        out: &Path,
        concurrency: Option<usize>,
    ) -> Result<String, CopilotError> {
        let questions = read_questions(batch)?;
        let pipeline = Arc::new(self.validated_pipeline()?);
        let concurrency = concurrency.unwrap_or(self.config.batch.concurrency);
        let summary = self.runtime.block_on(async {
            let stop = stop_on_ctrl_c();
            run_batch_to_file(pipeline, questions, concurrency, stop, out).await
        })?;
        Ok(format_batch_summary(&summary, out))
    }
}
