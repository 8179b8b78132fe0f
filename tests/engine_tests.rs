//! End-to-end engine tests: the full pipeline against stub controllers.

mod common;

use common::{engine, engine_with, n, row, s, wait_for_terminal, StubBrowser, StubProxy};
use std::sync::Arc;
use std::time::Duration;
use webql::engine::{QueryOptions, QueryState};
use webql::{ErrorKind, Value};

#[tokio::test]
async fn literal_pipeline_produces_folded_row() {
    // SELECT 2 + 3 AS n FROM 'about:blank' executes as
    // NAVIGATE -> DOM_QUERY and yields [{n: 5}].
    let (engine, browser, _) = engine();
    let result = engine
        .execute("SELECT 2 + 3 AS n FROM 'about:blank'", QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(result.data, Value::Array(vec![row(&[("n", n(5.0))])]));
    assert_eq!(browser.navigation_count(), 1);
    assert!(result
        .metadata
        .applied_passes
        .iter()
        .any(|p| p == "constant-folding"));
    assert_eq!(result.metadata.step_count, 2);
}

#[tokio::test]
async fn projection_filters_and_sorts_rows() {
    let browser = Arc::new(StubBrowser::with_rows(vec![
        row(&[("name", s("ada")), ("age", n(36.0))]),
        row(&[("name", s("bob")), ("age", n(17.0))]),
        row(&[("name", s("cy")), ("age", n(52.0))]),
    ]));
    let engine = engine_with(browser, Arc::new(StubProxy::new()));
    let result = engine
        .execute(
            "SELECT name, age FROM 'https://people.example' WHERE age > 18 ORDER BY age DESC",
            QueryOptions::default(),
        )
        .await
        .unwrap();

    let Value::Array(rows) = result.data else {
        panic!("expected rows");
    };
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], row(&[("age", n(52.0)), ("name", s("cy"))]));
}

#[tokio::test]
async fn predicate_pushdown_filters_inside_subquery() {
    // The inner SELECT carries the WHERE after optimization; one
    // FILTER runs, in the inner chain.
    let browser = Arc::new(StubBrowser::with_rows(vec![
        row(&[("name", s("ada")), ("age", n(36.0))]),
        row(&[("name", s("bob")), ("age", n(17.0))]),
    ]));
    let engine = engine_with(browser, Arc::new(StubProxy::new()));
    let result = engine
        .execute(
            "SELECT name FROM (SELECT name, age FROM 'https://people.example') WHERE age > 18",
            QueryOptions::default(),
        )
        .await
        .unwrap();

    let Value::Array(rows) = result.data else {
        panic!("expected rows");
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], row(&[("name", s("ada"))]));
    assert!(result
        .metadata
        .applied_passes
        .iter()
        .any(|p| p == "predicate-pushdown"));
}

#[tokio::test]
async fn dead_code_leaves_single_show() {
    // IF false THEN SHOW CACHE ELSE SHOW METRICS optimizes to a
    // single READ_VARIABLE.
    let (engine, _, _) = engine();
    let err = engine
        .execute(
            "IF FALSE THEN SHOW CACHE ELSE SHOW METRICS",
            QueryOptions::default(),
        )
        .await
        .unwrap_err();
    // METRICS is not a bound variable in this harness; the single
    // remaining READ_VARIABLE step fails, proving the branch collapsed.
    assert!(err.message.contains("METRICS"), "{err}");

    let (engine, _, _) = common::engine();
    let result = engine
        .execute(
            "SET METRICS = 'collected'\nIF FALSE THEN SHOW CACHE ELSE SHOW METRICS",
            QueryOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result.data, s("collected"));
}

#[tokio::test]
async fn parallel_loop_fans_out_and_aggregates() {
    // FOR EACH over two URLs fans out; both navigations happen
    // and the aggregated result has length 2.
    let (engine, browser, _) = engine();
    let result = engine
        .execute(
            "FOR EACH u IN ['https://a.example', 'https://b.example'] { NAVIGATE TO u }",
            QueryOptions::default(),
        )
        .await
        .unwrap();

    let Value::Array(outputs) = result.data else {
        panic!("expected aggregated outputs");
    };
    assert_eq!(outputs.len(), 2);
    assert_eq!(browser.navigation_count(), 2);
    let navigated: Vec<String> = browser.navigations.lock().clone();
    assert!(navigated.contains(&"https://a.example".to_string()));
    assert!(navigated.contains(&"https://b.example".to_string()));
}

#[tokio::test]
async fn repeated_query_hits_runtime_cache() {
    // The second run of the same SELECT skips its NAVIGATE via
    // the cache key nav:<url> and records a cache hit.
    let browser = Arc::new(
        StubBrowser::with_rows(vec![row(&[("title", s("hi"))])])
            .with_navigate_delay(Duration::from_millis(40)),
    );
    let engine = engine_with(browser.clone(), Arc::new(StubProxy::new()));

    let first = engine
        .execute("SELECT title FROM 'https://x.example'", QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(first.metadata.cache_hits, 0);
    assert_eq!(browser.navigation_count(), 1);

    let second = engine
        .execute("SELECT title FROM 'https://x.example'", QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(second.metadata.cache_hits, 1);
    assert_eq!(browser.navigation_count(), 1, "navigate was skipped");
    assert!(
        second.timing.execute_ms < first.timing.execute_ms,
        "cached run should be faster: {} vs {}",
        second.timing.execute_ms,
        first.timing.execute_ms
    );

    let metrics = engine.metrics();
    assert_eq!(metrics.queries_executed, 2);
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.navigations, 1);
}

#[tokio::test]
async fn cancellation_ends_in_cancelled_state() {
    // Cancel an async query during its first NAVIGATE; the final
    // state is CANCELLED and no further step runs.
    let browser = Arc::new(StubBrowser::new().with_navigate_delay(Duration::from_millis(150)));
    let engine = engine_with(browser.clone(), Arc::new(StubProxy::new()));

    let query_id = engine
        .execute_async(
            "SELECT title FROM 'https://slow.example'",
            QueryOptions::default(),
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    engine.cancel_query(&query_id).unwrap();

    let state = wait_for_terminal(&engine, &query_id).await;
    assert_eq!(state, QueryState::Cancelled);
    // The DOM query after the navigation never ran.
    assert_eq!(browser.query_count(), 0);

    // Cancelling a finished query errors.
    assert!(engine.cancel_query(&query_id).is_err());
}

#[tokio::test]
async fn timeout_surfaces_timeout_error() {
    let browser = Arc::new(StubBrowser::new().with_navigate_delay(Duration::from_millis(200)));
    let engine = engine_with(browser, Arc::new(StubProxy::new()));

    let err = engine
        .execute(
            "SELECT title FROM 'https://slow.example'",
            QueryOptions {
                timeout_ms: Some(30),
                ..QueryOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(err.recoverable);
}

#[tokio::test]
async fn async_execution_reports_progress_and_completion() {
    let (engine, _, _) = engine();
    let query_id = engine
        .execute_async(
            "SELECT title FROM 'https://x.example' LIMIT 2",
            QueryOptions::default(),
        )
        .unwrap();

    let state = wait_for_terminal(&engine, &query_id).await;
    assert_eq!(state, QueryState::Completed);
    let status = engine.query_status(&query_id).unwrap();
    assert!((status.progress - 1.0).abs() < f64::EPSILON);
    assert_eq!(status.steps_completed, status.steps_total);
}

#[tokio::test]
async fn compile_errors_fail_fast_with_kind() {
    let (engine, browser, _) = engine();
    let err = engine
        .execute("SELECT t FROM 'ftp://nope'", QueryOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(browser.navigation_count(), 0, "nothing executed");

    let err = engine
        .execute("SELECT FROM x", QueryOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parser);

    let err = engine
        .execute("SELECT 'open FROM x", QueryOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lexer);
}

#[tokio::test]
async fn runtime_failure_marks_query_failed() {
    let browser = Arc::new(StubBrowser::new().failing_on("broken"));
    let engine = engine_with(browser, Arc::new(StubProxy::new()));

    let query_id = engine
        .execute_async(
            "SELECT title FROM 'https://broken.example'",
            QueryOptions::default(),
        )
        .unwrap();
    let state = wait_for_terminal(&engine, &query_id).await;
    assert_eq!(state, QueryState::Failed);
    let status = engine.query_status(&query_id).unwrap();
    assert!(status.error.is_some());
}

#[tokio::test]
async fn uninitialized_engine_rejects_queries() {
    let engine = webql::QueryEngine::new(
        webql::EngineConfig::default(),
        Arc::new(StubBrowser::new()),
        Arc::new(StubProxy::new()),
    );
    let err = engine
        .execute("SHOW METRICS", QueryOptions::default())
        .await
        .unwrap_err();
    assert!(err.message.contains("not initialized"));
}

#[tokio::test]
async fn shutdown_cancels_running_queries() {
    let browser = Arc::new(StubBrowser::new().with_navigate_delay(Duration::from_millis(150)));
    let engine = engine_with(browser, Arc::new(StubProxy::new()));
    let query_id = engine
        .execute_async(
            "SELECT title FROM 'https://slow.example'",
            QueryOptions::default(),
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    engine.shutdown();
    let state = wait_for_terminal(&engine, &query_id).await;
    assert_eq!(state, QueryState::Cancelled);
}

#[tokio::test]
async fn with_cte_feeds_body_query() {
    let browser = Arc::new(StubBrowser::with_rows(vec![
        row(&[("title", s("a"))]),
        row(&[("title", s("b"))]),
    ]));
    let engine = engine_with(browser, Arc::new(StubProxy::new()));
    let result = engine
        .execute(
            "WITH pages AS (SELECT title FROM 'https://x.example') SELECT title FROM pages",
            QueryOptions::default(),
        )
        .await
        .unwrap();
    let Value::Array(rows) = result.data else {
        panic!("expected rows");
    };
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn timing_breakdown_is_populated() {
    let (engine, _, _) = engine();
    let result = engine
        .execute("SELECT title FROM 'https://x.example'", QueryOptions::default())
        .await
        .unwrap();
    let timing = result.timing;
    assert!(timing.total_ms > 0.0);
    assert!(timing.execute_ms >= 0.0);
    assert!(
        timing.total_ms + 1e-6
            >= timing.lexer_ms + timing.parser_ms + timing.semantic_ms + timing.execute_ms
    );
}
