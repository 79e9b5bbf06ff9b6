//! Listing endpoints.
//!
//! The two read endpoints fail soft: a storage failure (or a read exceeding
//! the configured time budget) answers 500 with the empty result shape plus
//! an `error` field, so clients can render "no results" unconditionally.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use domains::{DomainError, ListingId, ListingPage, ListingPatch, NewListing};
use services::ReadOutcome;

use crate::dto::{ListingParams, SearchParams};
use crate::error::ApiResult;
use crate::extract::AuthUser;
use crate::state::AppState;

/// `GET /api/listings`
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListingParams>,
) -> ApiResult<Response> {
    let (query, page) = params.into_query(&state.limits)?;
    state.metrics.listing_queries.inc();

    let read = state.listings.query_listings(query, page);
    let outcome = match tokio::time::timeout(state.limits.query_timeout, read).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::error!(
                timeout_ms = state.limits.query_timeout.as_millis() as u64,
                "listing query timed out"
            );
            ReadOutcome::failed(
                ListingPage::default(),
                DomainError::internal("listing query timed out"),
            )
        }
    };

    if outcome.is_ok() {
        return Ok(Json(outcome.data).into_response());
    }
    state.metrics.listing_query_failures.inc();
    Ok((
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "listings": [],
            "totalCount": 0,
            "error": "failed to fetch listings",
        })),
    )
        .into_response())
}

/// `GET /api/listings/search`
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Response> {
    let (term, category) = params.into_parts()?;
    state.metrics.searches.inc();

    let outcome = state.listings.search_listings(&term, category).await;
    if outcome.is_ok() {
        return Ok(Json(outcome.data).into_response());
    }
    Ok((
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "listings": [],
            "hasMore": false,
            "error": "search failed",
        })),
    )
        .into_response())
}

/// `GET /api/listings/{id}`
pub async fn get(State(state): State<AppState>, Path(id): Path<ListingId>) -> ApiResult<Response> {
    Ok(Json(state.listings.get_listing(id).await?).into_response())
}

/// `POST /api/listings`
pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(new): Json<NewListing>,
) -> ApiResult<Response> {
    let listing = state.listings.create_listing(&user, new).await?;
    Ok((StatusCode::CREATED, Json(listing)).into_response())
}

/// `PATCH /api/listings/{id}`
pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<ListingId>,
    Json(patch): Json<ListingPatch>,
) -> ApiResult<Response> {
    Ok(Json(state.listings.update_listing(&user, id, patch).await?).into_response())
}

/// `DELETE /api/listings/{id}`
///
/// Answers as soon as the row is gone. Image cleanup keeps running in the
/// background; its failures only show up in logs and metrics.
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<ListingId>,
) -> ApiResult<StatusCode> {
    let deleted = state.listings.delete_listing(&user, id).await?;
    state.metrics.listings_deleted.inc();

    let metrics = state.metrics.clone();
    tokio::spawn(async move {
        match deleted.cleanup.await {
            Ok(report) if report.failed > 0 => {
                metrics.image_cleanup_failures.inc_by(report.failed as u64);
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(listing_id = id, error = %err, "image cleanup task aborted"),
        }
    });

    Ok(StatusCode::NO_CONTENT)
}
