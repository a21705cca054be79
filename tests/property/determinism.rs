//! Property-based tests for determinism and boundedness guarantees

use analytics_copilot::planner::dates::{clamp, season_bounds};
use analytics_copilot::repair::{transition, RepairEvent, RepairPhase};
use analytics_copilot::retrieval::{retrieve, CorpusIndex};
use analytics_copilot::safety::{guard, rewrite, RewriteSettings};
use analytics_copilot::synthesis::format::{strict_number, FormatHint};
use analytics_copilot::{AnswerValue, Intent};
use chrono::{Datelike, NaiveDate};
use proptest::prelude::*;

const PROJECTIONS: &[&str] = &[
    "o.CustomerID",
    "COUNT(*) AS n",
    "SUM((od.UnitPrice - od.CostOfGoods) * od.Quantity) AS margin",
    "YEAR(o.OrderDate) AS y",
    "EXTRACT(MONTH FROM o.OrderDate) AS m",
    "NOW() AS today",
    "od.cogs AS cogs",
    "'CostOfGoods' AS label",
    "\"Order Details\".Quantity",
];

const FILTERS: &[&str] = &[
    "",
    " WHERE o.OrderDate BETWEEN '2016-06-01' AND '2016-08-31'",
    " WHERE YEAR(o.OrderDate) = 2016",
    " WHERE o.ShipName = 'TOP 5 FETCH FIRST 1 ROWS ONLY'",
    " WHERE o.OrderDate < CURRENT_DATE()",
];

const ENDINGS: &[&str] = &["", ";", " ORDER BY 1 DESC", " FETCH FIRST 3 ROWS ONLY", " -- year(x)"];

fn generated_query() -> impl Strategy<Value = String> {
    (
        prop::option::of(1u32..50),
        prop::collection::vec(prop::sample::select(PROJECTIONS), 1..4),
        prop::sample::select(FILTERS),
        prop::sample::select(ENDINGS),
    )
        .prop_map(|(top, projections, filter, ending)| {
            let top = top.map(|n| format!("TOP {} ", n)).unwrap_or_default();
            format!(
                "SELECT {}{} FROM Orders o JOIN \"Order Details\" od ON od.OrderID = o.OrderID{}{}",
                top,
                projections.join(", "),
                filter,
                ending
            )
        })
}

proptest! {
    #[test]
    fn rewrite_pass_is_idempotent(query in generated_query()) {
        let settings = RewriteSettings::default();
        let once = rewrite(&query, &settings);
        let twice = rewrite(&once.query, &settings);
        prop_assert_eq!(&twice.query, &once.query);
        prop_assert!(twice.applied.is_empty());
    }

    #[test]
    fn rewritten_queries_stay_read_only(query in generated_query()) {
        prop_assert!(guard(&query).is_ok());
        let rewritten = rewrite(&query, &RewriteSettings::default());
        prop_assert!(guard(&rewritten.query).is_ok());
    }

    #[test]
    fn string_literals_survive_rewriting(query in generated_query()) {
        let rewritten = rewrite(&query, &RewriteSettings::default());
        for literal in ["'2016-06-01'", "'TOP 5 FETCH FIRST 1 ROWS ONLY'", "'CostOfGoods'"] {
            if query.contains(literal) {
                prop_assert!(rewritten.query.contains(literal));
            }
        }
    }

    #[test]
    fn strict_number_reads_the_first_integer(n in -1_000_000i64..1_000_000, suffix in "[a-z ]{0,12}") {
        let text = format!("About {} units{}", n, suffix);
        prop_assert_eq!(
            strict_number(&text, FormatHint::Int, false).unwrap(),
            AnswerValue::Integer(n)
        );
    }
}

/// Season ranges are well formed and clamping never leaves the valid window
#[test]
fn test_season_bounds_property() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let valid_start = NaiveDate::from_ymd_opt(2012, 7, 4).unwrap();
    let valid_end = NaiveDate::from_ymd_opt(2023, 10, 28).unwrap();

    runner
        .run(
            &(
                prop::sample::select(vec!["spring", "summer", "fall", "autumn", "winter"]),
                2005i32..2030,
            ),
            |(season, year)| {
                let (start, end) = season_bounds(season, year).unwrap();
                assert!(start < end);
                assert_eq!(start.day(), 1);
                assert_eq!(start.year(), year);
                assert!(end.year() == year || (season == "winter" && end.year() == year + 1));

                match clamp(start, end, valid_start, valid_end) {
                    Some((s, e)) => {
                        assert!(s >= valid_start && e <= valid_end && s <= e);
                        assert!(s >= start && e <= end);
                    }
                    None => assert!(end < valid_start || start > valid_end),
                }
                Ok(())
            },
        )
        .unwrap();
}

/// The repair machine terminates and never runs more than `max_retries + 1` executions
#[test]
fn test_repair_transitions_are_bounded() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(0u32..5, prop::collection::vec(0u8..4, 0..16)),
            |(max_retries, outcomes)| {
                let mut phase = RepairPhase::Generating;
                let mut attempts = 0;
                let mut executions = 0;
                let mut outcomes = outcomes.into_iter();

                for _ in 0..64 {
                    if phase.is_terminal() {
                        break;
                    }
                    let roll = outcomes.next().unwrap_or(1);
                    let event = match phase {
                        RepairPhase::Generating => match roll {
                            0 => RepairEvent::GenerationRetryable,
                            _ => RepairEvent::CandidateReady,
                        },
                        _ => {
                            executions += 1;
                            match roll {
                                3 => RepairEvent::ExecutionSucceeded,
                                _ => RepairEvent::ExecutionFailed,
                            }
                        }
                    };
                    let (next, count) = transition(phase, event, attempts, max_retries);
                    assert!(count >= attempts);
                    assert!(count <= max_retries);
                    phase = next;
                    attempts = count;
                }

                assert!(phase.is_terminal());
                assert!(executions <= max_retries + 1);
                Ok(())
            },
        )
        .unwrap();
}

/// Retrieval returns the same ranking for the same question
#[test]
fn test_retrieval_determinism_property() {
    let index = CorpusIndex::from_documents(vec![
        (
            "marketing_calendar.md",
            "# Marketing Calendar\n## Summer Beverages 2016\n- Dates: 2016-06-01 to 2016-08-31\n## Winter Classics 2016\n- Dates: 2016-12-01 to 2016-12-31",
        ),
        (
            "kpi_definitions.md",
            "# KPI Definitions\n## Average Order Value (AOV)\n- AOV = SUM(UnitPrice * Quantity * (1 - Discount)) / COUNT(DISTINCT OrderID)\n## Gross Margin\n- GM = SUM((UnitPrice - CostOfGoods) * Quantity * (1 - Discount))",
        ),
        (
            "product_policy.md",
            "# Returns\n## Returns Window\n- Unopened Beverages: 14 days\n- Perishables: 3 to 7 days",
        ),
    ]);
    let words = vec![
        "summer", "winter", "beverages", "2016", "margin", "aov", "returns", "days", "orders",
        "customer", "classics", "gross", "value", "unopened",
    ];
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                prop::collection::vec(prop::sample::select(words), 0..6),
                1usize..5,
                any::<bool>(),
            ),
            |(terms, top_k, rag)| {
                let question = terms.join(" ");
                let intent = if rag { Intent::RagOnly } else { Intent::Hybrid };
                let first = retrieve(&question, intent, &index, top_k, 0.0);
                let second = retrieve(&question, intent, &index, top_k, 0.0);

                assert_eq!(first, second);
                assert!(first.len() <= top_k);
                assert!(first.iter().all(|c| c.score > 0.0));
                assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
                Ok(())
            },
        )
        .unwrap();
}
