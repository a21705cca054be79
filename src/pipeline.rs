//! Pipeline
//!
//! Runs one question through router, retriever, planner, the generate/execute repair loop and the
//! synthesizer. All shared parts are read-only, so one pipeline serves many questions at once.

use crate::config::CopilotConfig;
use crate::engine::{DataEngine, SqliteEngine};
use crate::error::CopilotError;
use crate::executor::Executor;
use crate::fewshot::FewShotArtifact;
use crate::generation::QueryGenerator;
use crate::planner::{self, PlannerSettings};
use crate::provider::{CompletionOptions, ModelProviderClient, ProviderFactory};
use crate::repair::{RepairLoop, RepairPhase};
use crate::retrieval::{self, CorpusIndex};
use crate::router;
use crate::safety::RewriteSettings;
use crate::state::{Intent, RequestState};
use crate::synthesis::Synthesizer;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Per-request knobs
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub min_score: f64,
    pub max_retries: u32,
    pub demonstrations: usize,
    pub generation_timeout: Duration,
    pub execution_timeout: Duration,
    pub planner: PlannerSettings,
}

impl PipelineSettings {
    pub fn from_config(config: &CopilotConfig) -> Result<Self, CopilotError> {
        Ok(Self {
            top_k: config.pipeline.top_k,
            min_score: config.pipeline.min_score,
            max_retries: config.pipeline.max_retries,
            demonstrations: config.pipeline.demonstrations,
            generation_timeout: config.pipeline.generation_timeout(),
            execution_timeout: config.pipeline.execution_timeout(),
            planner: PlannerSettings::from_config(&config.dataset, &config.pipeline)?,
        })
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: 0.0,
            max_retries: 2,
            demonstrations: 3,
            generation_timeout: Duration::from_secs(120),
            execution_timeout: Duration::from_millis(5_000),
            planner: PlannerSettings::default(),
        }
    }
}

/// Outcome of one question
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub state: RequestState,
    /// Terminal repair phase; `None` for document-only questions
    pub phase: Option<RepairPhase>,
}

pub struct Pipeline {
    index: Arc<CorpusIndex>,
    artifact: Option<Arc<FewShotArtifact>>,
    schema: String,
    generator: QueryGenerator,
    executor: Executor,
    synthesizer: Synthesizer,
    settings: PipelineSettings,
}

impl Pipeline {
    /// Assemble a pipeline from already-built parts.
    ///
    /// The schema description is read from the engine once, here.
    pub fn new(
        model: Arc<dyn ModelProviderClient>,
        options: CompletionOptions,
        engine: Arc<dyn DataEngine>,
        index: Arc<CorpusIndex>,
        artifact: Option<Arc<FewShotArtifact>>,
        settings: PipelineSettings,
    ) -> Result<Self, CopilotError> {
        let schema = engine.describe_schema()?;
        if artifact.is_none() {
            warn!("No few-shot artifact loaded; generating without demonstrations");
        }
        Ok(Self {
            generator: QueryGenerator::new(
                Arc::clone(&model),
                options.clone(),
                settings.generation_timeout,
                settings.demonstrations,
            ),
            executor: Executor::new(
                engine,
                settings.execution_timeout,
                RewriteSettings {
                    cost_fraction: settings.planner.cost_fraction,
                },
            ),
            synthesizer: Synthesizer::new(model, options, settings.generation_timeout),
            index,
            artifact,
            schema,
            settings,
        })
    }

    /// Build every part from configuration. Paths are resolved against `workspace_root`.
    pub fn from_config(config: &CopilotConfig, workspace_root: &Path) -> Result<Self, CopilotError> {
        let paths = config.paths.resolved(workspace_root);
        let provider = config.provider.to_model_provider()?;
        let model: Arc<dyn ModelProviderClient> = Arc::from(
            ProviderFactory::create_client_with_timeout(&provider, config.provider.request_timeout())?,
        );
        let engine: Arc<dyn DataEngine> = Arc::new(SqliteEngine::new(
            &paths.database,
            config.pipeline.max_rows,
            config.dataset.tables.clone(),
        ));
        let index = Arc::new(CorpusIndex::from_dir(&paths.docs_dir)?);
        let artifact = paths
            .few_shot_artifact
            .as_deref()
            .map(FewShotArtifact::load)
            .transpose()?
            .map(Arc::new);

        Self::new(
            model,
            config.provider.default_options.clone(),
            engine,
            index,
            artifact,
            PipelineSettings::from_config(config)?,
        )
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn index(&self) -> &CorpusIndex {
        &self.index
    }

    /// Answer one question. Never fails: every error is recorded in the returned state.
    #[instrument(skip(self, format_hint), fields(question = %question))]
    pub async fn answer(&self, question: &str, format_hint: Option<String>) -> PipelineRun {
        let mut state = RequestState::new(question, format_hint);

        let intent = router::classify(question);
        state.intent = Some(intent);
        info!(intent = %intent, "Routed question");

        state.retrieved_context = retrieval::retrieve(
            question,
            intent,
            &self.index,
            self.settings.top_k,
            self.settings.min_score,
        );
        info!(chunks = state.retrieved_context.len(), "Retrieved context");

        let phase = if intent == Intent::Hybrid {
            state.plan_constraints =
                planner::plan(question, &state.retrieved_context, &self.settings.planner);
            info!(constraints = state.plan_constraints.len(), "Planned constraints");

            let repair = RepairLoop {
                generator: &self.generator,
                executor: &self.executor,
                schema: &self.schema,
                artifact: self.artifact.as_deref(),
                max_retries: self.settings.max_retries,
            };
            let phase = repair.run(&mut state).await;
            info!(phase = %phase, attempts = state.attempt_count, "Query phase finished");
            Some(phase)
        } else {
            None
        };

        let answer = self.synthesizer.synthesize(&state, phase).await;
        info!(value = ?answer.value, citations = answer.citations.len(), "Synthesized answer");
        state.final_answer = Some(answer);
        PipelineRun { state, phase }
    }
}
