// GET handlers: version, devices, history, latest, alerts

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::history_fetcher::FetchStatus;
use crate::models::Metric;
use crate::sample_store::SampleStore;

const DEFAULT_HOURS: u32 = 24;
const DEFAULT_ALERT_LIMIT: u32 = 10;
const MAX_ALERT_LIMIT: u32 = 500;

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn unavailable(e: impl std::fmt::Display) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "ok": false, "status": "offline", "error": e.to_string() })),
    )
        .into_response()
}

pub(super) async fn devices_handler<S: SampleStore>(State(state): State<AppState<S>>) -> Response {
    match state.store.list_devices().await {
        Ok(devices) => Json(json!({ "ok": true, "devices": devices })).into_response(),
        Err(e) => unavailable(e),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryQuery {
    metric: Option<String>,
    hours: Option<u32>,
}

/// GET /api/devices/{device}/history: downsampled chart series. Offline when the store is
/// unreachable; the body still carries an (empty) series so clients can render the state.
pub(super) async fn history_handler<S: SampleStore>(
    State(state): State<AppState<S>>,
    Path(device): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Response {
    let metric = match q.metric.as_deref().unwrap_or("temp").parse::<Metric>() {
        Ok(m) => m,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
                .into_response();
        }
    };
    let hours = q.hours.unwrap_or(DEFAULT_HOURS);
    let result = state.fetcher.fetch(&device, metric, hours).await;
    Json(json!({
        "ok": result.status == FetchStatus::Online,
        "status": result.status,
        "deviceId": result.device_id,
        "metric": result.metric,
        "hours": result.hours_back,
        "maxPoints": result.max_points,
        "records": result.records_used,
        "unresolved": result.unresolved,
        "malformed": result.malformed,
        "values": result.series.values,
        "startMs": result.series.start_ms,
        "endMs": result.series.end_ms,
    }))
    .into_response()
}

/// GET /api/devices/{device}/latest: latest snapshot passthrough.
pub(super) async fn latest_handler<S: SampleStore>(
    State(state): State<AppState<S>>,
    Path(device): Path<String>,
) -> Response {
    match state.store.latest(&device).await {
        Ok(Some(snapshot)) => Json(json!({ "ok": true, "latest": snapshot })).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "error": "no snapshot for device" })),
        )
            .into_response(),
        Err(e) => unavailable(e),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct AlertsQuery {
    limit: Option<u32>,
}

/// GET /api/devices/{device}/alerts: newest alerts first.
pub(super) async fn alerts_handler<S: SampleStore>(
    State(state): State<AppState<S>>,
    Path(device): Path<String>,
    Query(q): Query<AlertsQuery>,
) -> Response {
    let limit = q.limit.unwrap_or(DEFAULT_ALERT_LIMIT).min(MAX_ALERT_LIMIT);
    match state.store.recent_alerts(&device, limit).await {
        Ok(rows) => Json(json!({ "ok": true, "rows": rows })).into_response(),
        Err(e) => unavailable(e),
    }
}
