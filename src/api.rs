// src/api.rs
//! Request layer glue: every page/API request gives the daily ingestion a chance to
//! start, then proceeds without waiting for it.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::ingest::scheduler::IngestScheduler;
use crate::scoring::{check_and_log, Scorer};
use crate::store::CorpusStore;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: IngestScheduler,
    pub scorer: Arc<dyn Scorer>,
    pub store: Arc<dyn CorpusStore>,
}

pub fn router(state: AppState) -> Router {
    let triggering = Router::new()
        .route("/api/check", post(check))
        .route("/api/ingest/status", get(ingest_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), trigger_ingest));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(triggering)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn trigger_ingest(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let outcome = state.scheduler.trigger_if_needed().await;
    tracing::trace!(target: "api", ?outcome, "ingest trigger");
    next.run(req).await
}

#[derive(serde::Deserialize)]
struct CheckReq {
    #[serde(default)]
    content: String,
}

#[derive(serde::Serialize)]
struct CheckResp {
    authentic: String,
    /// score as a percentage
    accuracy: f32,
    searchfor: String,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(json!({ "status": false, "error": msg.into() })))
}

async fn check(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CheckReq>,
) -> Result<Json<CheckResp>, ApiError> {
    let query = body.content.trim();
    if query.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No content provided"));
    }

    let identity = requester_identity(&headers);
    let verdict = check_and_log(state.scorer.as_ref(), state.store.as_ref(), &identity, query)
        .await
        .map_err(|e| {
            tracing::warn!(target: "api", error = ?e, "authenticity check failed");
            api_error(StatusCode::SERVICE_UNAVAILABLE, "scoring unavailable")
        })?;

    Ok(Json(CheckResp {
        authentic: verdict.label,
        accuracy: verdict.score * 100.0,
        searchfor: query.to_string(),
    }))
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, else `anonymous`. Only ever hashed.
fn requester_identity(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

#[derive(serde::Serialize)]
struct IngestStatus {
    date: NaiveDate,
    ran_today: bool,
    running: bool,
}

async fn ingest_status(State(state): State<AppState>) -> Result<Json<IngestStatus>, ApiError> {
    let date = Local::now().date_naive();
    let ran_today = state.scheduler.ran_on(date).await.map_err(|e| {
        tracing::warn!(target: "api", error = ?e, "run marker lookup failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "store unavailable")
    })?;
    Ok(Json(IngestStatus {
        date,
        ran_today,
        running: state.scheduler.is_running(),
    }))
}
