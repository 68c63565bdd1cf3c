use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{Router, middleware, routing::get};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    common::types::AnyResult,
    configs::ServerConfig,
    transport::{middleware::add_response_headers, routes},
};

pub struct KeepAliveState {
    pub started: Instant,
}

pub fn router(state: Arc<KeepAliveState>) -> Router {
    Router::new()
        .route("/", get(routes::alive))
        .route("/health", get(routes::health))
        .layer(middleware::from_fn(add_response_headers))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the keep-alive endpoint until `cancel` fires.
pub async fn serve(config: &ServerConfig, cancel: CancellationToken) -> AnyResult<()> {
    let address: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(KeepAliveState {
        started: Instant::now(),
    });

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Keep-alive server listening on {}", address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}
