//! HTTP ingress: one endpoint per hook event, plus `/status`.
//!
//! The pipelines never surface errors; the only 500s here are malformed
//! request bodies. Unknown routes and unknown hook events get the same
//! `{"error": "Not found"}` envelope.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use claudecube_core::session::SessionRegistry;

use crate::hooks::{LifecycleEvent, PreToolUseEvent, StopEvent};
use crate::pipeline::{LifecyclePipeline, PreToolPipeline, StopPipeline};

#[derive(Clone)]
pub struct AppState {
    pub pre_tool: Arc<PreToolPipeline>,
    pub stop: Arc<StopPipeline>,
    pub lifecycle: Arc<LifecyclePipeline>,
    pub registry: Arc<SessionRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/hooks/{event}", post(hook_handler))
        .route("/status", get(status_handler))
        .fallback(not_found)
        .with_state(state)
}

/// Bind to loopback and serve until the process exits.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn hook_handler(
    State(state): State<AppState>,
    Path(event): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    match event.as_str() {
        "PreToolUse" => match serde_json::from_value::<PreToolUseEvent>(body) {
            Ok(ev) => Json(state.pre_tool.handle(ev).await).into_response(),
            Err(e) => internal_error(e),
        },
        "Stop" => match serde_json::from_value::<StopEvent>(body) {
            Ok(ev) => Json(state.stop.handle(ev).await).into_response(),
            Err(e) => internal_error(e),
        },
        "SessionStart" => match serde_json::from_value::<LifecycleEvent>(body) {
            Ok(ev) => Json(state.lifecycle.session_start(ev).await).into_response(),
            Err(e) => internal_error(e),
        },
        "SessionEnd" => match serde_json::from_value::<LifecycleEvent>(body) {
            Ok(ev) => Json(state.lifecycle.session_end(ev).await).into_response(),
            Err(e) => internal_error(e),
        },
        "Notification" => match serde_json::from_value::<LifecycleEvent>(body) {
            Ok(ev) => Json(state.lifecycle.notification(ev).await).into_response(),
            Err(e) => internal_error(e),
        },
        _ => not_found().await.into_response(),
    }
}

async fn status_handler(State(state): State<AppState>) -> Response {
    let sessions = state.registry.get_all();
    Json(json!({
        "sessions": sessions,
        "count": sessions.len(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})))
}

fn internal_error(e: serde_json::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": e.to_string()})),
    )
        .into_response()
}
