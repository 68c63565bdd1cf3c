use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::transport::http_server::KeepAliveState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// GET /
pub async fn alive() -> &'static str {
    "alive"
}

/// GET /health
pub async fn health(State(state): State<Arc<KeepAliveState>>) -> Json<Health> {
    tracing::debug!("GET /health");
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}
