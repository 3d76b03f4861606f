// HTTP routes: the read path display layers poll (history, latest, alerts).

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::history_fetcher::HistoryFetcher;
use crate::sample_store::SampleStore;

pub(crate) struct AppState<S> {
    pub(crate) store: Arc<S>,
    pub(crate) fetcher: Arc<HistoryFetcher<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            fetcher: self.fetcher.clone(),
        }
    }
}

pub fn app<S>(store: Arc<S>, fetcher: Arc<HistoryFetcher<S>>) -> Router
where
    S: SampleStore + 'static,
{
    let state = AppState { store, fetcher };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/devices", get(http::devices_handler::<S>)) // GET /api/devices
        .route(
            "/api/devices/{device}/history",
            get(http::history_handler::<S>),
        ) // GET /api/devices/{device}/history?metric=temp&hours=24
        .route(
            "/api/devices/{device}/latest",
            get(http::latest_handler::<S>),
        ) // GET /api/devices/{device}/latest
        .route(
            "/api/devices/{device}/alerts",
            get(http::alerts_handler::<S>),
        ) // GET /api/devices/{device}/alerts?limit=10
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
