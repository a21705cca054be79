//! Full pipeline runs against the fixture database and corpus

use crate::integration::test_utils::{Fixture, ScriptedModel};
use analytics_copilot::engine::DataEngine;
use analytics_copilot::repair::RepairPhase;
use analytics_copilot::retrieval::CorpusIndex;
use analytics_copilot::state::ConstraintValue;
use analytics_copilot::{AnswerValue, Intent, PipelineSettings};
use std::sync::Arc;
use std::time::Duration;

const SUMMER_QUESTION: &str = "How many orders were placed in the summer of 2016?";

#[tokio::test]
async fn test_seasonal_count_is_grounded_in_calendar() {
    let fixture = Fixture::new();
    let model = ScriptedModel::sequence(&[
        "SELECT COUNT(*) FROM Orders WHERE OrderDate BETWEEN '2016-06-01' AND '2016-08-31';",
    ]);
    let pipeline = fixture.pipeline(Arc::clone(&model));

    let run = pipeline.answer(SUMMER_QUESTION, None).await;
    let state = &run.state;

    assert_eq!(state.intent, Some(Intent::Hybrid));
    assert_eq!(run.phase, Some(RepairPhase::Succeeded));
    assert_eq!(state.attempt_count, 0);

    let range = state.plan_constraints.get("date_range").unwrap();
    assert_eq!(
        range.value,
        ConstraintValue::DateRange {
            start: "2016-06-01".to_string(),
            end: "2016-08-31".to_string(),
        }
    );
    assert!(model
        .request(0)
        .contains("OrderDate BETWEEN '2016-06-01' AND '2016-08-31'"));

    let answer = state.final_answer.as_ref().unwrap();
    assert_eq!(answer.value, AnswerValue::Integer(3));
    assert_eq!(answer.citations, vec!["marketing_calendar::chunk1".to_string()]);
}

#[tokio::test]
async fn test_bad_alias_is_repaired_once() {
    let fixture = Fixture::new();
    let model = ScriptedModel::sequence(&[
        "SELECT c.CustomerID, COUNT(*) AS n FROM Orders o GROUP BY c.CustomerID ORDER BY n DESC LIMIT 1;",
        "SELECT o.CustomerID FROM Orders o GROUP BY o.CustomerID ORDER BY COUNT(*) DESC LIMIT 1;",
    ]);
    let pipeline = fixture.pipeline(Arc::clone(&model));

    let run = pipeline
        .answer("Which customer placed the most orders?", None)
        .await;
    let state = &run.state;

    assert_eq!(run.phase, Some(RepairPhase::Succeeded));
    assert_eq!(state.attempt_count, 1);
    assert_eq!(model.calls(), 2);

    let repair_request = model.request(1);
    assert!(repair_request.contains("no such column: c.CustomerID"));
    assert!(repair_request.contains("GROUP BY c.CustomerID"));

    assert!(state.query_candidate.as_deref().unwrap().contains("o.CustomerID"));
    let answer = state.final_answer.as_ref().unwrap();
    assert_eq!(answer.value, AnswerValue::Text("ALFKI".to_string()));
}

#[tokio::test]
async fn test_mutating_candidate_is_rejected_and_repaired() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let count_orders = || {
        engine
            .run("SELECT COUNT(*) AS n FROM Orders", Duration::from_secs(5))
            .unwrap()
    };
    let before = count_orders();

    let model = ScriptedModel::sequence(&[
        "DELETE FROM Orders;",
        "SELECT COUNT(*) FROM Orders WHERE OrderDate BETWEEN '2016-06-01' AND '2016-08-31';",
    ]);
    let pipeline = fixture.pipeline(Arc::clone(&model));

    let run = pipeline.answer(SUMMER_QUESTION, None).await;
    let state = &run.state;

    assert_eq!(run.phase, Some(RepairPhase::Succeeded));
    assert_eq!(state.attempt_count, 1);
    assert_eq!(model.calls(), 2);

    let repair_request = model.request(1);
    assert!(repair_request.contains("Disallowed operation"), "{}", repair_request);
    assert!(repair_request.contains("DELETE FROM Orders"));

    assert_eq!(
        state.final_answer.as_ref().unwrap().value,
        AnswerValue::Integer(3)
    );
    assert_eq!(count_orders(), before);
}

#[tokio::test]
async fn test_no_date_and_no_matching_sections_cites_nothing() {
    let fixture = Fixture::new();
    let model = ScriptedModel::sequence(&[
        "SELECT ProductName FROM Products ORDER BY UnitPrice DESC LIMIT 1;",
    ]);
    let index = Arc::new(CorpusIndex::from_documents(vec![(
        "glossary.md",
        "# Glossary\n\n## Terms\n- Nothing relevant lives here.\n",
    )]));
    let pipeline = fixture.pipeline_with(
        Arc::clone(&model),
        index,
        None,
        PipelineSettings::default(),
    );

    let run = pipeline
        .answer("Which product has the highest unit price?", None)
        .await;
    let state = &run.state;

    assert!(state.retrieved_context.is_empty());
    assert!(state.plan_constraints.is_empty());
    assert_eq!(run.phase, Some(RepairPhase::Succeeded));

    let answer = state.final_answer.as_ref().unwrap();
    assert_eq!(answer.value, AnswerValue::Text("Côte de Blaye".to_string()));
    assert!(answer.citations.is_empty());
}

#[tokio::test]
async fn test_margin_query_never_runs_cost_column() {
    let fixture = Fixture::new();
    let model = ScriptedModel::sequence(&[
        "SELECT o.CustomerID, ROUND(SUM((od.UnitPrice - od.CostOfGoods) * od.Quantity * (1 - od.Discount)), 2) AS margin \
         FROM Orders o JOIN \"Order Details\" od ON od.OrderID = o.OrderID \
         WHERE o.OrderDate BETWEEN '2016-01-01' AND '2016-12-31' \
         GROUP BY o.CustomerID ORDER BY margin DESC LIMIT 1;",
    ]);
    let pipeline = fixture.pipeline(Arc::clone(&model));

    let run = pipeline
        .answer("Which customer had the highest gross margin in 2016?", None)
        .await;
    let state = &run.state;

    assert_eq!(run.phase, Some(RepairPhase::Succeeded));
    assert!(state.plan_constraints.contains_key("cost_of_goods"));
    assert!(state.plan_constraints.contains_key("gross_margin"));
    assert!(model.request(0).contains("cost_of_goods"));

    let executed = state.query_candidate.as_deref().unwrap();
    assert!(!executed.to_ascii_lowercase().contains("costofgoods"));
    assert!(executed.contains("(0.7 * od.UnitPrice)"));

    // QUICK: 263.5 * 0.3 * 4 * 0.95
    let answer = state.final_answer.as_ref().unwrap();
    match &answer.value {
        AnswerValue::Text(text) => assert!(text.contains("QUICK"), "unexpected answer {}", text),
        other => panic!("expected text answer, got {:?}", other),
    }
}

#[tokio::test]
async fn test_persistent_failure_is_bounded_by_retry_budget() {
    let fixture = Fixture::new();
    let bad = "SELECT Missing FROM Orders;";
    let model = ScriptedModel::sequence(&[bad, bad, bad, bad, bad]);
    let pipeline = fixture.pipeline(Arc::clone(&model));

    let run = pipeline.answer(SUMMER_QUESTION, None).await;
    let state = &run.state;

    assert_eq!(run.phase, Some(RepairPhase::Exhausted));
    assert_eq!(state.attempt_count, 2);
    // One generation per execution, never more than max_retries + 1
    assert_eq!(model.calls(), 3);
    assert!(!state.succeeded());

    let answer = state.final_answer.as_ref().unwrap();
    assert_eq!(answer.value, AnswerValue::Null);
    assert!(answer.explanation.contains("no such column"));
}

#[tokio::test]
async fn test_reply_without_query_aborts() {
    let fixture = Fixture::new();
    let model = ScriptedModel::sequence(&["I am not able to help with that."]);
    let pipeline = fixture.pipeline(Arc::clone(&model));

    let run = pipeline.answer(SUMMER_QUESTION, None).await;

    assert_eq!(run.phase, Some(RepairPhase::Aborted));
    assert_eq!(run.state.attempt_count, 0);
    assert_eq!(model.calls(), 1);
    assert_eq!(
        run.state.final_answer.as_ref().unwrap().value,
        AnswerValue::Null
    );
}

#[tokio::test]
async fn test_generation_timeouts_use_the_retry_budget() {
    let fixture = Fixture::new();
    let model = ScriptedModel::slow("SELECT 1;", Duration::from_millis(300));
    let settings = PipelineSettings {
        generation_timeout: Duration::from_millis(30),
        ..PipelineSettings::default()
    };
    let pipeline = fixture.pipeline_with(Arc::clone(&model), fixture.index(), None, settings);

    let run = pipeline.answer(SUMMER_QUESTION, None).await;

    assert_eq!(run.phase, Some(RepairPhase::Exhausted));
    assert_eq!(run.state.attempt_count, 2);
    assert_eq!(model.calls(), 3);
    assert!(run.state.query_candidate.is_none());
}

#[tokio::test]
async fn test_policy_question_answers_from_documents() {
    let fixture = Fixture::new();
    let model = ScriptedModel::sequence(&["14 days [product_policy::chunk1]"]);
    let pipeline = fixture.pipeline(Arc::clone(&model));

    let run = pipeline
        .answer(
            "According to the product policy, what is the return window (days) for unopened Beverages? Return an integer.",
            Some("int".to_string()),
        )
        .await;
    let state = &run.state;

    assert_eq!(state.intent, Some(Intent::RagOnly));
    assert!(run.phase.is_none());
    assert!(state.query_candidate.is_none());
    assert_eq!(state.retrieved_context[0].source_id, "product_policy::chunk1");

    let answer = state.final_answer.as_ref().unwrap();
    assert_eq!(answer.value, AnswerValue::Integer(14));
    assert_eq!(answer.citations, vec!["product_policy::chunk1".to_string()]);
}

#[tokio::test]
async fn test_dialect_rewrites_reach_the_engine_as_sqlite() {
    let fixture = Fixture::new();
    let model = ScriptedModel::sequence(&[
        "SELECT TOP 1 ProductName FROM Products WHERE YEAR('2016-05-01') = 2016 ORDER BY UnitPrice ASC;",
    ]);
    let pipeline = fixture.pipeline(Arc::clone(&model));

    let run = pipeline
        .answer("Which product has the lowest unit price?", None)
        .await;
    let state = &run.state;

    assert_eq!(run.phase, Some(RepairPhase::Succeeded));
    let executed = state.query_candidate.as_deref().unwrap();
    assert!(executed.contains("LIMIT 1"));
    assert!(executed.contains("strftime('%Y', '2016-05-01')"));
    assert_eq!(
        state.final_answer.as_ref().unwrap().value,
        AnswerValue::Text("Aniseed Syrup".to_string())
    );
}
