//! Batch runs: ordering, interruption and JSONL output

use crate::integration::test_utils::{Fixture, ScriptedModel};
use analytics_copilot::batch::{read_questions, run_batch, run_batch_to_file, BatchQuestion, BatchRecord};
use serde_json::json;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn routed_model() -> Arc<ScriptedModel> {
    ScriptedModel::by_question(&[
        (
            "summer of 2016",
            "SELECT COUNT(*) FROM Orders WHERE OrderDate BETWEEN '2016-06-01' AND '2016-08-31';",
        ),
        (
            "highest unit price",
            "SELECT ProductName FROM Products ORDER BY UnitPrice DESC LIMIT 1;",
        ),
        ("return window", "14 days [product_policy::chunk1]"),
    ])
}

fn questions() -> Vec<BatchQuestion> {
    vec![
        BatchQuestion {
            id: "rag_policy_beverages_return_days".to_string(),
            question: "According to the product policy, what is the return window (days) for unopened Beverages? Return an integer.".to_string(),
            format_hint: Some("int".to_string()),
        },
        BatchQuestion {
            id: "summer_orders".to_string(),
            question: "How many orders were placed in the summer of 2016?".to_string(),
            format_hint: Some("int".to_string()),
        },
        BatchQuestion {
            id: "supplier_speed".to_string(),
            question: "Which supplier ships fastest?".to_string(),
            format_hint: None,
        },
        BatchQuestion {
            id: "priciest_product".to_string(),
            question: "Which product has the highest unit price?".to_string(),
            format_hint: Some("str".to_string()),
        },
    ]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_records_follow_input_order() {
    let fixture = Fixture::new();
    let pipeline = Arc::new(fixture.pipeline(routed_model()));

    let mut records: Vec<BatchRecord> = Vec::new();
    let summary = run_batch(
        pipeline,
        questions(),
        3,
        Arc::new(AtomicBool::new(false)),
        |record| {
            records.push(record.clone());
            Ok(())
        },
    )
    .await
    .unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "rag_policy_beverages_return_days",
            "summer_orders",
            "supplier_speed",
            "priciest_product"
        ]
    );
    assert_eq!(summary.total, 4);
    assert_eq!(summary.answered, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);
    assert!(!summary.interrupted);

    assert_eq!(records[0].final_answer, json!(14));
    assert!(records[0].sql.is_empty());
    assert_eq!(records[1].final_answer, json!(3));
    assert!(records[1].sql.starts_with("SELECT COUNT(*)"));
    assert!(records[2].final_answer.is_null());
    assert!(records[2].confidence <= 0.1);
    assert_eq!(records[3].final_answer, json!("Côte de Blaye"));
}

#[tokio::test]
async fn test_stop_request_skips_remaining_questions() {
    let fixture = Fixture::new();
    let model = routed_model();
    let pipeline = Arc::new(fixture.pipeline(Arc::clone(&model)));

    let mut written = 0;
    let summary = run_batch(
        pipeline,
        questions(),
        2,
        Arc::new(AtomicBool::new(true)),
        |_| {
            written += 1;
            Ok(())
        },
    )
    .await
    .unwrap();

    assert_eq!(written, 0);
    assert_eq!(model.calls(), 0);
    assert_eq!(summary.skipped, 4);
    assert!(summary.interrupted);
}

#[tokio::test]
async fn test_batch_writes_jsonl_file() {
    let fixture = Fixture::new();
    let pipeline = Arc::new(fixture.pipeline(routed_model()));
    let out = fixture.root().join("out").join("answers.jsonl");

    let summary = run_batch_to_file(
        pipeline,
        questions(),
        2,
        Arc::new(AtomicBool::new(false)),
        &out,
    )
    .await
    .unwrap();
    assert_eq!(summary.answered, 3);

    let text = std::fs::read_to_string(&out).unwrap();
    let records: Vec<BatchRecord> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 4);
    assert_eq!(records[1].id, "summer_orders");
    assert_eq!(
        records[1].citations,
        vec!["marketing_calendar::chunk1".to_string()]
    );
    assert_eq!(
        records[0].citations,
        vec!["product_policy::chunk1".to_string()]
    );
}

#[test]
fn test_question_file_round_trip_and_errors() {
    let fixture = Fixture::new();
    let path = fixture.root().join("questions.jsonl");
    std::fs::write(
        &path,
        "{\"id\":\"a\",\"question\":\"How many orders?\",\"format_hint\":\"int\"}\n\n{\"id\":\"b\",\"question\":\"Top products?\"}\n",
    )
    .unwrap();
    let parsed = read_questions(&path).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].format_hint.as_deref(), Some("int"));
    assert!(parsed[1].format_hint.is_none());

    std::fs::write(&path, "{\"id\":\"a\",\"question\":\"ok\"}\nnot json\n").unwrap();
    let err = read_questions(&path).unwrap_err().to_string();
    assert!(err.contains(":2:"), "unexpected error: {}", err);
}
