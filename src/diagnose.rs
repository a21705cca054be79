//! Environment diagnostics: database objects, corpus, few-shot artifact and model provider.

use crate::config::CopilotConfig;
use crate::engine::{DataEngine, SqliteEngine};
use crate::fewshot::FewShotArtifact;
use crate::provider::ProviderFactory;
use crate::retrieval::CorpusIndex;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl Check {
    fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub checks: Vec<Check>,
}

impl DiagnosticReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

fn check_config(config: &CopilotConfig) -> Check {
    match config.validate() {
        Ok(()) => Check::pass("config", "valid"),
        Err(errors) => Check::fail(
            "config",
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        ),
    }
}

fn check_database(config: &CopilotConfig, database: &Path) -> Vec<Check> {
    let engine = SqliteEngine::new(database, config.pipeline.max_rows, Vec::new());
    let objects = match engine.list_objects() {
        Ok(objects) => objects,
        Err(err) => return vec![Check::fail("database", err.to_string())],
    };
    let views = objects.iter().filter(|o| o.kind == "view").count();
    let tables = objects.len() - views;
    let mut checks = vec![Check::pass(
        "database",
        format!("{} ({} tables, {} views)", database.display(), tables, views),
    )];

    let missing: Vec<&str> = config
        .dataset
        .tables
        .iter()
        .filter(|t| !objects.iter().any(|o| o.name.eq_ignore_ascii_case(t)))
        .map(String::as_str)
        .collect();
    checks.push(if missing.is_empty() {
        Check::pass("schema", format!("{} configured tables present", config.dataset.tables.len()))
    } else {
        Check::fail("schema", format!("missing tables or views: {}", missing.join(", ")))
    });
    checks
}

fn check_corpus(docs_dir: &Path) -> Check {
    match CorpusIndex::from_dir(docs_dir) {
        Ok(index) if index.is_empty() => {
            Check::fail("corpus", format!("no sections under {}", docs_dir.display()))
        }
        Ok(index) => Check::pass("corpus", format!("{} sections indexed", index.len())),
        Err(err) => Check::fail("corpus", err.to_string()),
    }
}

fn check_artifact(path: Option<&Path>) -> Check {
    match path {
        None => Check::pass("few-shot artifact", "not configured; generating zero-shot"),
        Some(path) => match FewShotArtifact::load(path) {
            Ok(artifact) => Check::pass(
                "few-shot artifact",
                format!(
                    "'{}' with {} demonstrations",
                    artifact.name,
                    artifact.demonstrations.len()
                ),
            ),
            Err(err) => Check::fail("few-shot artifact", err.to_string()),
        },
    }
}

async fn check_provider(config: &CopilotConfig) -> Check {
    let client = match config
        .provider
        .to_model_provider()
        .and_then(|p| ProviderFactory::create_client_with_timeout(&p, config.provider.request_timeout()))
    {
        Ok(client) => client,
        Err(err) => return Check::fail("provider", err.to_string()),
    };
    match client.list_models().await {
        Ok(models) => {
            let wanted = &config.provider.model;
            let listed = models
                .iter()
                .any(|m| m == wanted || m.split(':').next() == Some(wanted.as_str()));
            debug!(models = models.len(), listed, "Provider models");
            if listed {
                Check::pass("provider", format!("{} serves {}", client.provider_name(), wanted))
            } else {
                Check::fail(
                    "provider",
                    format!("{} is reachable but does not list '{}'", client.provider_name(), wanted),
                )
            }
        }
        Err(err) => Check::fail("provider", err.to_string()),
    }
}

/// Run every check. Paths are resolved against `workspace_root`.
pub async fn diagnose(config: &CopilotConfig, workspace_root: &Path) -> DiagnosticReport {
    let paths = config.paths.resolved(workspace_root);
    let mut checks = vec![check_config(config)];
    checks.extend(check_database(config, &paths.database));
    checks.push(check_corpus(&paths.docs_dir));
    checks.push(check_artifact(paths.few_shot_artifact.as_deref()));
    checks.push(check_provider(config).await);
    DiagnosticReport { checks }
}
