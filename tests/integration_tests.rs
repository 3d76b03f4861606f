// Integration tests: HTTP endpoints over a temp SQLite store and a failing in-memory store

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::{MS_PER_MINUTE, MemoryStore, temp_minute, temp_store};
use std::sync::Arc;
use tempfile::TempDir;
use tempmon::config::AppConfig;
use tempmon::history_fetcher::HistoryFetcher;
use tempmon::models::{AlertRecord, AlertState, LatestSnapshot};
use tempmon::routes;
use tempmon::sample_store::{SampleStore, SqliteStore};

const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[store]
path = "data/test.db"
max_pool_size = 2

[history]
query_timeout_secs = 5
"#;

fn test_app_config() -> AppConfig {
    AppConfig::load_from_str(TEST_CONFIG).unwrap()
}

fn server_for<S: SampleStore + 'static>(store: Arc<S>) -> TestServer {
    let config = test_app_config();
    let fetcher = Arc::new(HistoryFetcher::new(
        store.clone(),
        config.history.tier_policy(),
        config.history.query_timeout(),
    ));
    TestServer::new(routes::app(store, fetcher))
}

async fn sqlite_server() -> (TempDir, Arc<SqliteStore>, TestServer) {
    let (dir, store) = temp_store().await;
    let store = Arc::new(store);
    let server = server_for(store.clone());
    (dir, store, server)
}

#[tokio::test]
async fn test_version_endpoint() {
    let (_dir, _store, server) = sqlite_server().await;
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json.get("name").and_then(|v| v.as_str()), Some("tempmon"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_devices_endpoint() {
    let (_dir, store, server) = sqlite_server().await;
    store
        .save_minute("tank-a", "m1", &temp_minute(common::BASE_MS, 1.0))
        .await
        .unwrap();
    let json: serde_json::Value = server.get("/api/devices").await.json();
    assert_eq!(json["ok"], true);
    assert_eq!(json["devices"], serde_json::json!(["tank-a"]));
}

#[tokio::test]
async fn test_history_endpoint_recent_minutes() {
    let (_dir, store, server) = sqlite_server().await;
    let now_ms = chrono::Utc::now().timestamp_millis();
    for i in 1..=10 {
        store
            .save_minute(
                "tank-a",
                &format!("m{}", i),
                &temp_minute(now_ms - i * MS_PER_MINUTE, 20.0 + i as f64),
            )
            .await
            .unwrap();
    }

    let response = server
        .get("/api/devices/tank-a/history?metric=temp&hours=1")
        .await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["ok"], true);
    assert_eq!(json["status"], "online");
    assert_eq!(json["deviceId"], "tank-a");
    assert_eq!(json["metric"], "temp");
    assert_eq!(json["maxPoints"], 300);
    assert_eq!(json["records"], 10);
    let values = json["values"].as_array().unwrap();
    assert_eq!(values.len(), 10);
    // Oldest first.
    assert_eq!(values[0], 30.0);
    assert_eq!(values[9], 21.0);
}

#[tokio::test]
async fn test_history_defaults_to_temperature_over_a_day() {
    let (_dir, _store, server) = sqlite_server().await;
    let json: serde_json::Value = server.get("/api/devices/tank-a/history").await.json();
    assert_eq!(json["ok"], true);
    assert_eq!(json["metric"], "temp");
    assert_eq!(json["hours"], 24);
    assert_eq!(json["maxPoints"], 500);
    assert_eq!(json["values"], serde_json::json!([]));
    assert!(json["startMs"].is_null());
}

#[tokio::test]
async fn test_history_rejects_unknown_metric() {
    let (_dir, _store, server) = sqlite_server().await;
    let response = server
        .get("/api/devices/tank-a/history?metric=humidity")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let json: serde_json::Value = response.json();
    assert_eq!(json["ok"], false);
}

#[tokio::test]
async fn test_history_offline_store() {
    let store = Arc::new(MemoryStore::default());
    store.set_unavailable(true);
    let server = server_for(store);

    let response = server.get("/api/devices/tank-a/history?hours=6").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["ok"], false);
    assert_eq!(json["status"], "offline");
    assert_eq!(json["values"], serde_json::json!([]));
}

#[tokio::test]
async fn test_latest_endpoint() {
    let (_dir, store, server) = sqlite_server().await;
    server
        .get("/api/devices/tank-a/latest")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    store
        .save_latest(&LatestSnapshot {
            device_id: "tank-a".into(),
            ts_ms: Some(common::BASE_MS),
            temp: Some(26.0),
            ..LatestSnapshot::default()
        })
        .await
        .unwrap();
    let response = server.get("/api/devices/tank-a/latest").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["latest"]["deviceId"], "tank-a");
    assert_eq!(json["latest"]["temp"], 26.0);
    assert!(json["latest"]["level"].is_null());
}

#[tokio::test]
async fn test_alerts_endpoint() {
    let (_dir, store, server) = sqlite_server().await;
    for i in 0..3 {
        store
            .save_alert(
                "tank-a",
                &AlertRecord {
                    ts: common::BASE_MS + i * MS_PER_MINUTE,
                    metric: "level".into(),
                    value: 10.0,
                    threshold: Some(15.0),
                    severity: "warning".into(),
                    state: AlertState::Open,
                },
            )
            .await
            .unwrap();
    }

    let json: serde_json::Value = server
        .get("/api/devices/tank-a/alerts?limit=2")
        .await
        .json();
    assert_eq!(json["ok"], true);
    let rows = json["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["ts"], common::BASE_MS + 2 * MS_PER_MINUTE);
    assert_eq!(rows[0]["state"], "open");
}

#[tokio::test]
async fn test_alerts_offline_store() {
    let store = Arc::new(MemoryStore::default());
    store.set_unavailable(true);
    let server = server_for(store);
    server
        .get("/api/devices/tank-a/alerts")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}
