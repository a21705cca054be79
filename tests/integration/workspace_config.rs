//! Building a pipeline from workspace configuration, few-shot artifacts and diagnostics

use crate::integration::test_utils::{Fixture, ScriptedModel};
use analytics_copilot::config::{ConfigLoader, CopilotConfig};
use analytics_copilot::diagnose::diagnose;
use analytics_copilot::fewshot::{Demonstration, DemonstrationInput, FewShotArtifact};
use analytics_copilot::provider::MessageRole;
use analytics_copilot::{AnswerValue, CopilotError, Pipeline, PipelineSettings};
use std::path::PathBuf;
use std::sync::Arc;

fn demonstrations() -> Vec<Demonstration> {
    vec![
        Demonstration {
            input: DemonstrationInput {
                question: "How many orders were shipped in 2017?".to_string(),
                context: String::new(),
            },
            expected_query: "SELECT COUNT(*) FROM Orders WHERE strftime('%Y', OrderDate) = '2017';"
                .to_string(),
        },
        Demonstration {
            input: DemonstrationInput {
                question: "List every category name.".to_string(),
                context: String::new(),
            },
            expected_query: "SELECT CategoryName FROM Categories;".to_string(),
        },
    ]
}

fn fixture_config(fixture: &Fixture) -> CopilotConfig {
    let mut config = CopilotConfig::default();
    config.provider.endpoint = Some("http://127.0.0.1:9".to_string());
    config.provider.request_timeout_secs = 2;
    config.dataset.tables = vec![
        "orders".to_string(),
        "order_items".to_string(),
        "products".to_string(),
    ];
    config.paths.docs_dir = PathBuf::from("docs");
    config.paths.database = PathBuf::from("data/northwind.sqlite");
    assert!(fixture.database().exists());
    config
}

#[test]
fn test_pipeline_builds_from_workspace_config() {
    let fixture = Fixture::new();
    let config_dir = fixture.root().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        r#"
[provider]
provider_type = "ollama"
model = "llama3"
endpoint = "http://127.0.0.1:11434"

[pipeline]
max_retries = 1
top_k = 2

[paths]
docs_dir = "docs"
database = "data/northwind.sqlite"

[dataset]
tables = ["orders", "order_items", "products"]
"#,
    )
    .unwrap();

    let config = ConfigLoader::load(fixture.root()).unwrap();
    assert_eq!(config.pipeline.max_retries, 1);
    assert_eq!(config.pipeline.top_k, 2);

    let pipeline = Pipeline::from_config(&config, fixture.root()).unwrap();
    let schema = pipeline.schema();
    assert!(schema.contains("Orders(OrderID INTEGER"));
    assert!(schema.contains("order_items("));
    assert!(schema.contains("Products("));
    assert!(!schema.contains("Customers("));
    assert_eq!(pipeline.index().len(), 10);
}

#[test]
fn test_missing_docs_dir_is_a_corpus_error() {
    let fixture = Fixture::new();
    let mut config = fixture_config(&fixture);
    config.paths.docs_dir = PathBuf::from("nowhere");

    match Pipeline::from_config(&config, fixture.root()) {
        Err(CopilotError::CorpusError(msg)) => assert!(msg.contains("nowhere")),
        Err(other) => panic!("expected corpus error, got {}", other),
        Ok(_) => panic!("expected corpus error"),
    }
}

#[test]
fn test_tampered_artifact_is_rejected_at_startup() {
    let fixture = Fixture::new();
    let mut artifact = FewShotArtifact::new("northwind-sql", demonstrations())
        .seal()
        .unwrap();
    artifact.demonstrations[1].expected_query = "SELECT 1;".to_string();
    let path = fixture.root().join("fewshot.json");
    std::fs::write(&path, serde_json::to_string_pretty(&artifact).unwrap()).unwrap();

    let mut config = fixture_config(&fixture);
    config.paths.few_shot_artifact = Some(path);

    match Pipeline::from_config(&config, fixture.root()) {
        Err(CopilotError::ArtifactError(msg)) => assert!(msg.contains("checksum mismatch")),
        Err(other) => panic!("expected artifact error, got {}", other),
        Ok(_) => panic!("expected artifact error"),
    }
}

#[tokio::test]
async fn test_artifact_demonstrations_precede_the_request() {
    let fixture = Fixture::new();
    let path = fixture.root().join("fewshot.json");
    let sealed = FewShotArtifact::new("northwind-sql", demonstrations())
        .seal()
        .unwrap();
    std::fs::write(&path, serde_json::to_string(&sealed).unwrap()).unwrap();
    let artifact = Arc::new(FewShotArtifact::load(&path).unwrap());

    let model = ScriptedModel::sequence(&[
        "SELECT COUNT(*) FROM Orders WHERE OrderDate BETWEEN '2016-06-01' AND '2016-08-31';",
    ]);
    let settings = PipelineSettings {
        demonstrations: 1,
        ..PipelineSettings::default()
    };
    let pipeline =
        fixture.pipeline_with(Arc::clone(&model), fixture.index(), Some(artifact), settings);

    let run = pipeline
        .answer("How many orders were placed in the summer of 2016?", None)
        .await;
    assert_eq!(
        run.state.final_answer.as_ref().unwrap().value,
        AnswerValue::Integer(3)
    );

    let prompt = &model.prompts()[0];
    let roles: Vec<MessageRole> = prompt.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::System,
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::User
        ]
    );
    assert!(prompt[1].content.contains("How many orders were shipped in 2017?"));
    assert!(prompt[3].content.contains("Question: How many orders were placed in the summer of 2016?"));
}

#[tokio::test]
async fn test_diagnostics_report_each_dependency() {
    let fixture = Fixture::new();
    let config = fixture_config(&fixture);

    let report = diagnose(&config, fixture.root()).await;
    let status = |name: &str| {
        report
            .checks
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.passed)
    };

    assert_eq!(status("config"), Some(true));
    assert_eq!(status("database"), Some(true));
    assert_eq!(status("schema"), Some(true));
    assert_eq!(status("corpus"), Some(true));
    assert_eq!(status("few-shot artifact"), Some(true));
    // Nothing listens on the discard port
    assert_eq!(status("provider"), Some(false));
    assert!(!report.all_passed());
}
