//! Route handlers for the debug HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::engine::TrackerHandle;
use crate::telemetry;

pub(crate) struct DebugHttpState {
    handle: Arc<TrackerHandle>,
    token: String,
}

impl DebugHttpState {
    pub(crate) fn new(handle: Arc<TrackerHandle>, token: String) -> Self {
        Self { handle, token }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|presented| presented == self.token)
            .unwrap_or(false)
    }
}

pub(crate) async fn run_http_server(
    state: DebugHttpState,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<Arc<DebugHttpState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let body = serde_json::json!({
        "metrics": state.handle.metrics_report(),
        "telemetry": telemetry::hub().snapshot(),
    });
    Json(body).into_response()
}
