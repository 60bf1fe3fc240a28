//! End-to-end collection tests against an in-memory SQLite database.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sql_exporter::engine::CycleStatus;
use sql_exporter::metrics::SampleValue;
use sql_exporter::server::{AppState, create_router};
use sql_exporter::{AppConfig, CollectionEngine, QueryExecutor};
use tokio::net::TcpListener;

// =============================================================================
// Test Helpers
// =============================================================================

const CONFIG: &str = r#"
exporter:
  port: 9399
databases:
  main:
    driver: sqlite
    database: ":memory:"
queries:
  - name: constant
    database: main
    sql: "SELECT 42 AS value"
    interval: 60
    metrics:
      - name: test_metric
        help: A constant value
        type: gauge
  - name: users
    database: main
    sql: |
      SELECT 'eu' AS region, 'active' AS status, 10 AS count
      UNION ALL
      SELECT 'us', 'active', 25
    interval: 30s
    metrics:
      - name: app_users
        help: Users per region and status
        type: gauge
        labels: [region, status]
        value_column: count
"#;

fn engine_from(yaml: &str) -> (CollectionEngine, Arc<QueryExecutor>) {
    let config = AppConfig::from_yaml(yaml).expect("Failed to parse config");
    let executor = Arc::new(
        QueryExecutor::from_config(&config.databases).expect("Failed to build executor"),
    );
    let engine = CollectionEngine::new(config.queries, executor.clone())
        .expect("Failed to build engine");
    (engine, executor)
}

/// Start a server for the engine and return its base URL.
async fn start_test_server(engine: &CollectionEngine) -> String {
    let router = create_router(AppState {
        registry: Arc::clone(engine.registry()),
        jobs: engine.jobs().clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

// =============================================================================
// Collection Tests
// =============================================================================

#[tokio::test]
async fn test_single_value_query() {
    let (engine, executor) = engine_from(CONFIG);

    let outcomes = engine.collect_once(Some("constant")).await.unwrap();
    assert_eq!(outcomes[0].1.status(), CycleStatus::Success);

    let samples = engine.registry().samples("test_metric");
    assert_eq!(samples.len(), 1);
    assert!(samples[0].labels.is_empty());
    assert_eq!(samples[0].value, SampleValue::Gauge(42.0));

    executor.close().await;
}

#[tokio::test]
async fn test_labelled_rows() {
    let (engine, executor) = engine_from(CONFIG);

    engine.collect_once(Some("users")).await.unwrap();

    let samples = engine.registry().samples("app_users");
    assert_eq!(samples.len(), 2);
    let us = samples
        .iter()
        .find(|s| s.labels["region"] == "us")
        .expect("missing us sample");
    assert_eq!(us.labels["status"], "active");
    assert_eq!(us.value, SampleValue::Gauge(25.0));

    executor.close().await;
}

#[tokio::test]
async fn test_failing_query_keeps_other_metrics() {
    let yaml = r#"
databases:
  main:
    driver: sqlite
    database: ":memory:"
queries:
  - name: good
    database: main
    sql: "SELECT 1 AS value"
    metrics:
      - { name: good_metric, help: ok, type: gauge }
  - name: bad
    database: main
    sql: "SELECT * FROM no_such_table"
    metrics:
      - { name: bad_metric, help: broken, type: gauge }
"#;
    let (engine, executor) = engine_from(yaml);

    let outcomes = engine.collect_once(None).await.unwrap();
    assert_eq!(outcomes[0].1.status(), CycleStatus::Success);
    assert_eq!(outcomes[1].1.status(), CycleStatus::QueryFailure);

    assert_eq!(engine.registry().samples("good_metric").len(), 1);
    assert!(engine.registry().samples("bad_metric").is_empty());

    let text = engine.registry().render().unwrap();
    assert!(text.contains("good_metric 1"));
    assert!(!text.lines().any(|line| line.starts_with("bad_metric")));

    executor.close().await;
}

#[tokio::test]
async fn test_scheduled_collection_and_stop() {
    let (mut engine, executor) = engine_from(CONFIG);

    engine.start().unwrap();
    for _ in 0..100 {
        if engine.jobs().all_collected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let report = engine.stop(Duration::from_secs(5)).await;

    assert!(report.is_clean());
    assert_eq!(report.stopped.len(), 2);
    assert!(engine.jobs().all_collected());
    assert_eq!(
        engine.registry().samples("test_metric")[0].value,
        SampleValue::Gauge(42.0)
    );

    executor.close().await;
}

// =============================================================================
// HTTP Tests
// =============================================================================

#[tokio::test]
async fn test_metrics_over_http() {
    let (engine, executor) = engine_from(CONFIG);
    let base_url = start_test_server(&engine).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/readyz", base_url))
        .send()
        .await
        .expect("Failed to send readyz request");
    assert_eq!(resp.status(), 503);

    engine.collect_once(None).await.unwrap();

    let resp = client
        .get(format!("{}/readyz", base_url))
        .send()
        .await
        .expect("Failed to send readyz request");
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/metrics", base_url))
        .send()
        .await
        .expect("Failed to send metrics request");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"],
        "text/plain; version=0.0.4"
    );
    let body = resp.text().await.unwrap();
    assert!(body.contains("# TYPE test_metric gauge"));
    assert!(body.contains("test_metric 42"));
    assert!(body.contains("app_users{region=\"eu\",status=\"active\"} 10"));
    assert!(body.contains("sql_exporter_collections_total{query=\"constant\",status=\"success\"} 1"));

    let resp = client
        .get(format!("{}/api/jobs", base_url))
        .send()
        .await
        .expect("Failed to send jobs request");
    let jobs: Value = resp.json().await.expect("Failed to parse jobs response");
    assert_eq!(jobs.as_array().map(Vec::len), Some(2));
    assert_eq!(jobs[0]["name"], "constant");
    assert_eq!(jobs[0]["cycles"], 1);
    assert_eq!(jobs[0]["last_status"], "success");

    executor.close().await;
}
