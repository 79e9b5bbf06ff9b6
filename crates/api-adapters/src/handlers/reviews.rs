use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use domains::{ListingId, ReviewId, ReviewPage, ReviewWithReplies};
use services::CreateReview;

use crate::dto::CursorParams;
use crate::error::ApiResult;
use crate::extract::AuthUser;
use crate::state::AppState;

/// `GET /api/listings/{id}/reviews`
pub async fn list(
    State(state): State<AppState>,
    Path(listing_id): Path<ListingId>,
    Query(params): Query<CursorParams>,
) -> ApiResult<Json<ReviewPage>> {
    let (cursor, limit) = params.into_parts()?;
    Ok(Json(state.reviews.list_reviews(listing_id, cursor, limit).await?))
}

/// `POST /api/listings/{id}/reviews`
pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(listing_id): Path<ListingId>,
    Json(input): Json<CreateReview>,
) -> ApiResult<(StatusCode, Json<ReviewWithReplies>)> {
    let review = state.reviews.create_review(&user, listing_id, input).await?;
    state.metrics.reviews_created.inc();
    Ok((StatusCode::CREATED, Json(review)))
}

/// `GET /api/reviews/{id}/replies`
pub async fn replies(
    State(state): State<AppState>,
    Path(review_id): Path<ReviewId>,
    Query(params): Query<CursorParams>,
) -> ApiResult<Json<ReviewPage>> {
    let (cursor, limit) = params.into_parts()?;
    Ok(Json(state.reviews.list_replies(review_id, cursor, limit).await?))
}
