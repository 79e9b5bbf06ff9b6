use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use domains::DomainError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const OPENMETRICS: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics(State(state): State<AppState>) -> ApiResult<Response> {
    let body = state
        .metrics
        .render()
        .map_err(|err| ApiError::from(DomainError::internal(format!("metrics encoding: {err}"))))?;
    Ok(([(CONTENT_TYPE, OPENMETRICS)], body).into_response())
}
